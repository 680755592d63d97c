//! Music player capability used by the cache builder and the jukebox.
//!
//! The wire protocol lives behind [`MusicPlayer`]; [`crate::mpd_client::MpcClient`]
//! is the shipped implementation.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Track as returned by player searches and playlist listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Song {
    pub uri: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub date: Option<String>,
    /// Duration in whole seconds, 0 when unknown
    pub duration: u32,
}

impl Song {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn tag(&self, tag: Tag) -> Option<&str> {
        match tag {
            Tag::Title => self.title.as_deref(),
            Tag::Artist => self.artist.as_deref(),
            Tag::Album => self.album.as_deref(),
            Tag::AlbumArtist => self.album_artist.as_deref(),
            Tag::Genre => self.genre.as_deref(),
            Tag::Date => self.date.as_deref(),
        }
    }
}

/// Tags the jukebox can group candidates by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Genre,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    Play,
    Pause,
    #[default]
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStatus {
    pub state: PlayState,
    /// Songs in the playback queue, including the current one
    pub queue_length: usize,
    pub current_uri: Option<String>,
    /// Seconds into the current song
    pub elapsed: f64,
    /// Length of the current song in seconds
    pub duration: Option<f64>,
}

impl PlayerStatus {
    /// Seconds until the current song ends, if something is playing
    pub fn remaining_secs(&self) -> Option<f64> {
        match (self.state, self.duration) {
            (PlayState::Play, Some(duration)) => Some((duration - self.elapsed).max(0.0)),
            _ => None,
        }
    }
}

/// Database statistics used for change detection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbStats {
    pub songs: u64,
    /// Opaque token that changes whenever the player's database is updated
    pub db_updated: String,
}

pub trait MusicPlayer {
    /// One page of the whole database, in a stable order
    fn search_page(&self, offset: usize, limit: usize) -> Result<Vec<Song>>;

    /// One page of a stored playlist
    fn playlist_page(&self, playlist: &str, offset: usize, limit: usize) -> Result<Vec<Song>>;

    /// URIs currently in the playback queue
    fn queue_uris(&self) -> Result<Vec<String>>;

    fn add_track(&self, uri: &str) -> Result<()>;

    /// Search for every track of the album and append them
    fn add_album(&self, album: &str, album_artist: &str) -> Result<()>;

    fn play(&self) -> Result<()>;

    fn status(&self) -> Result<PlayerStatus>;

    fn stats(&self) -> Result<DbStats>;
}

/// Walk a paged listing until a short page, feeding every song to `visit`.
///
/// `fetch` receives `(offset, limit)`. Returns the number of songs visited.
pub fn scan_pages<F, V>(page_size: usize, mut fetch: F, mut visit: V) -> Result<usize>
where
    F: FnMut(usize, usize) -> Result<Vec<Song>>,
    V: FnMut(Song),
{
    let page_size = page_size.max(1);
    let mut offset = 0;
    loop {
        let page = fetch(offset, page_size)?;
        let fetched = page.len();
        offset += fetched;
        page.into_iter().for_each(&mut visit);
        if fetched < page_size {
            return Ok(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_tag_lookup() {
        let song = Song {
            artist: Some("Nina Simone".to_string()),
            genre: Some("Jazz".to_string()),
            ..Song::new("jazz/nina/feeling_good.flac")
        };
        assert_eq!(song.tag(Tag::Artist), Some("Nina Simone"));
        assert_eq!(song.tag(Tag::Genre), Some("Jazz"));
        assert_eq!(song.tag(Tag::Album), None);
    }

    #[test]
    fn test_remaining_secs_only_while_playing() {
        let mut status = PlayerStatus {
            state: PlayState::Play,
            queue_length: 3,
            current_uri: Some("a.flac".to_string()),
            elapsed: 60.0,
            duration: Some(200.0),
        };
        assert_eq!(status.remaining_secs(), Some(140.0));

        status.state = PlayState::Pause;
        assert_eq!(status.remaining_secs(), None);
    }

    #[test]
    fn test_scan_pages_stops_on_short_page() -> Result<()> {
        let library: Vec<Song> = (0..7).map(|n| Song::new(format!("{n}.flac"))).collect();
        let mut calls = Vec::new();
        let mut seen = Vec::new();

        let total = scan_pages(
            3,
            |offset, limit| {
                calls.push(offset);
                Ok(library.iter().skip(offset).take(limit).cloned().collect())
            },
            |song| seen.push(song.uri),
        )?;

        assert_eq!(total, 7);
        assert_eq!(calls, vec![0, 3, 6]);
        assert_eq!(seen.first().map(String::as_str), Some("0.flac"));
        assert_eq!(seen.len(), 7);
        Ok(())
    }

    #[test]
    fn test_scan_pages_exact_multiple_needs_empty_page() -> Result<()> {
        let mut calls = 0;
        let total = scan_pages(
            2,
            |offset, _| {
                calls += 1;
                Ok(if offset < 4 {
                    vec![Song::new("x"), Song::new("y")]
                } else {
                    Vec::new()
                })
            },
            |_| {},
        )?;
        assert_eq!(total, 4);
        assert_eq!(calls, 3);
        Ok(())
    }

    #[test]
    fn test_scan_pages_propagates_errors() {
        let result = scan_pages(
            10,
            |_, _| Err(crate::error::Error::protocol("listall", "connection reset")),
            |_| {},
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tag_serde_names() {
        let tag: Tag = serde_json::from_str("\"album_artist\"").unwrap();
        assert_eq!(tag, Tag::AlbumArtist);
    }
}
