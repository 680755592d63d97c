//! # MPD client through `mpc`
//!
//! [`MpcClient`] implements [`MusicPlayer`] by running the `mpc` command-line
//! client. There is no protocol code of our own, and mpc's error messages
//! come through unchanged.
//!
//! ## Limitations
//!
//! - mpc has no result window, so paging is applied here. The first page of
//!   a scan runs a full `listall` (or `playlist`) and keeps the listing;
//!   later pages are cut from it until a short page ends the scan. Each
//!   clone of a client keeps its own listing.
//! - Only the default MPD partition is addressed. Extra partitions are
//!   configured as separate `--host`/`--port` targets.
//!
//! ## Output formats
//!
//! Songs are listed with a tab separated format (see [`SONG_FORMAT`]). Status
//! comes from `mpc status`:
//!
//! ```text
//! artist/album/song.mp3
//! [playing] #5/20   1:23/3:45 (37%)
//! volume: 80%   repeat: on    random: off   single: off   consume: off
//! ```
//!
//! When stopped only the `volume:` line is printed.

use crate::error::{Error, Result};
use crate::player::{DbStats, MusicPlayer, PlayState, PlayerStatus, Song};
use log::{debug, trace};
use parking_lot::Mutex;
use std::process::Command;

/// `mpc -f` format used for song listings, one tab separated song per line
pub const SONG_FORMAT: &str =
    "%file%\t[%title%]\t[%artist%]\t[%album%]\t[%albumartist%]\t[%genre%]\t[%date%]\t[%time%]";

/// Runs one mpc invocation and returns its stdout
pub trait CommandRunner {
    fn run(&self, args: &[&str]) -> Result<String>;
}

/// The `mpc` binary on `PATH`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MpcCommand {
    host: Option<String>,
    port: Option<u16>,
}

impl CommandRunner for MpcCommand {
    fn run(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new("mpc");
        if let Some(host) = &self.host {
            command.arg("--host").arg(host);
        }
        if let Some(port) = self.port {
            command.arg("--port").arg(port.to_string());
        }
        trace!("mpc {}", args.join(" "));

        let output = command.args(args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::protocol(args.join(" "), stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ListingSource {
    Database,
    Playlist(String),
}

#[derive(Debug, Default)]
pub struct MpcClient<R = MpcCommand> {
    runner: R,
    /// Listing of the scan in progress
    listing: Mutex<Option<(ListingSource, Vec<Song>)>>,
}

impl<R: CommandRunner + Clone> Clone for MpcClient<R> {
    fn clone(&self) -> Self {
        Self::with_runner(self.runner.clone())
    }
}

impl MpcClient {
    /// Client for mpc's defaults (`MPD_HOST` / `MPD_PORT` or localhost)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(host: Option<String>, port: Option<u16>) -> Self {
        Self::with_runner(MpcCommand { host, port })
    }
}

impl<R: CommandRunner> MpcClient<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            listing: Mutex::new(None),
        }
    }

    /// Verify that mpc is installed and MPD answers
    pub fn check(&self) -> Result<String> {
        self.run(&["version"]).map(|out| out.trim().to_string())
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        self.runner.run(args)
    }

    fn songs(&self, args: &[&str]) -> Result<Vec<Song>> {
        let mut full = vec!["-f", SONG_FORMAT];
        full.extend_from_slice(args);
        Ok(self.run(&full)?.lines().filter_map(parse_song_line).collect())
    }

    /// Cut one page out of the listing, fetching it at the start of a scan
    fn listing_page(&self, source: ListingSource, offset: usize, limit: usize) -> Result<Vec<Song>> {
        let mut listing = self.listing.lock();
        let cached = offset > 0 && listing.as_ref().is_some_and(|(s, _)| *s == source);
        if !cached {
            let songs = match &source {
                ListingSource::Database => self.songs(&["listall"])?,
                ListingSource::Playlist(name) => self.songs(&["playlist", name])?,
            };
            debug!("{source:?} listing has {} songs", songs.len());
            *listing = Some((source, songs));
        }

        let page: Vec<Song> = listing
            .as_ref()
            .map(|(_, songs)| songs.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default();
        if page.len() < limit {
            *listing = None;
        }
        Ok(page)
    }
}

impl<R: CommandRunner> MusicPlayer for MpcClient<R> {
    fn search_page(&self, offset: usize, limit: usize) -> Result<Vec<Song>> {
        self.listing_page(ListingSource::Database, offset, limit)
    }

    fn playlist_page(&self, playlist: &str, offset: usize, limit: usize) -> Result<Vec<Song>> {
        self.listing_page(ListingSource::Playlist(playlist.to_string()), offset, limit)
    }

    fn queue_uris(&self) -> Result<Vec<String>> {
        Ok(self
            .run(&["-f", "%file%", "playlist"])?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn add_track(&self, uri: &str) -> Result<()> {
        self.run(&["add", uri]).map(drop)
    }

    fn add_album(&self, album: &str, album_artist: &str) -> Result<()> {
        // Album keys fall back to the artist tag when album artist is missing.
        let by_album_artist = self.run(&["-f", "%file%", "find", "album", album, "albumartist", album_artist])?;
        let artist_tag = if by_album_artist.trim().is_empty() {
            "artist"
        } else {
            "albumartist"
        };
        self.run(&["findadd", "album", album, artist_tag, album_artist])
            .map(drop)
    }

    fn play(&self) -> Result<()> {
        self.run(&["play"]).map(drop)
    }

    fn status(&self) -> Result<PlayerStatus> {
        let output = self.run(&["-f", "%file%", "status"])?;
        match parse_status(&output)? {
            Some(status) => Ok(status),
            None => Ok(PlayerStatus {
                queue_length: self.queue_uris()?.len(),
                ..PlayerStatus::default()
            }),
        }
    }

    fn stats(&self) -> Result<DbStats> {
        Ok(parse_stats(&self.run(&["stats"])?))
    }
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Parse one line printed with [`SONG_FORMAT`]
pub fn parse_song_line(line: &str) -> Option<Song> {
    let mut fields = line.split('\t');
    let uri = non_empty(fields.next())?;
    let mut next = || non_empty(fields.next());
    let (title, artist, album, album_artist, genre, date) =
        (next(), next(), next(), next(), next(), next());
    let duration = next()
        .and_then(|time| parse_time(&time).ok())
        .map_or(0, |secs| secs as u32);

    Some(Song {
        uri,
        title,
        artist,
        album,
        album_artist,
        genre,
        date,
        duration,
    })
}

/// Parse `mpc -f %file% status`. `None` when mpc printed no position line,
/// which happens while stopped.
pub fn parse_status(output: &str) -> Result<Option<PlayerStatus>> {
    let lines: Vec<&str> = output.lines().collect();
    let Some(index) = lines.iter().position(|line| line.starts_with('[')) else {
        return Ok(None);
    };
    let line = lines[index];

    let state = if line.starts_with("[playing]") {
        PlayState::Play
    } else if line.starts_with("[paused]") {
        PlayState::Pause
    } else {
        return Err(Error::protocol("status", format!("unknown state line: {line}")));
    };

    let mut tokens = line.split_whitespace().skip(1);
    let queue_length = tokens
        .next()
        .and_then(|position| position.strip_prefix('#'))
        .and_then(|position| position.split_once('/'))
        .and_then(|(_, length)| length.parse().ok())
        .ok_or_else(|| Error::protocol("status", format!("no queue position in: {line}")))?;

    let (elapsed, duration) = match tokens.next().and_then(|time| time.split_once('/')) {
        Some((elapsed, total)) => (parse_time(elapsed).unwrap_or(0.0), parse_time(total).ok()),
        None => (0.0, None),
    };

    let current_uri = match index {
        0 => None,
        _ => non_empty(lines.first().copied()),
    };

    Ok(Some(PlayerStatus {
        state,
        queue_length,
        current_uri,
        elapsed,
        duration,
    }))
}

/// Parse `m:ss` or `h:mm:ss` into seconds
pub fn parse_time(time: &str) -> Result<f64> {
    let invalid = || Error::protocol("status", format!("invalid time: {time}"));
    let parts: Vec<&str> = time.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }
    parts.iter().try_fold(0.0, |total, part| {
        let value: f64 = part.parse().map_err(|_| invalid())?;
        Ok(total * 60.0 + value)
    })
}

/// Parse `mpc stats`; missing fields are left empty
pub fn parse_stats(output: &str) -> DbStats {
    let mut stats = DbStats::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Songs" => stats.songs = value.trim().parse().unwrap_or(0),
            "DB Updated" => stats.db_updated = value.trim().to_string(),
            _ => {}
        }
    }
    stats
}
