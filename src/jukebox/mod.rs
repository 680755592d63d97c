//! # Jukebox
//!
//! Keeps a partition's playback queue topped up with random tracks or albums.
//!
//! Every status poll runs [`Jukebox::run`]: a trigger check decides how many
//! items are missing, the persistent jukebox queue is refilled by reservoir
//! sampling when it cannot cover them, and the front of that queue is handed
//! to the player. Manual "add N now" requests go through a separate scratch
//! queue that is rebuilt for every request.
//!
//! With uniqueness enforced, candidates already queued, already sampled or
//! played within the recency window are rejected. When that leaves too few
//! candidates the jukebox relaxes uniqueness until it is reconfigured.

pub mod queue;
pub mod sampler;

use crate::cache::{CacheDependent, Caches};
use crate::error::{Error, Result};
use crate::events::{EventKind, Notifier};
use crate::history::PlayHistory;
use crate::player::{MusicPlayer, PlayerStatus, Tag};
use log::{debug, error, info, warn};
use queue::{Candidate, CandidateKind, JukeboxQueue};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sampler::{Exclusions, RecentlyPlayed};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Most items added by a single fill
pub const MAX_ADD: usize = 99;
/// Extra candidates kept in the persistent queue beyond what is needed now
pub const TRACK_BUFFER: usize = 50;
pub const ALBUM_BUFFER: usize = 10;
/// Refill the persistent queue during an apply pass below these lengths
pub const TRACK_LOW_WATER: usize = 25;
pub const ALBUM_LOW_WATER: usize = 5;
pub const ATTEMPTS: u32 = 2;

const RELAX_WARNING: &str = "Not enough unique songs or albums, relaxing uniqueness";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JukeboxMode {
    #[default]
    Off,
    AddTracks,
    AddAlbums,
}

/// Where track candidates come from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Database,
    Playlist(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JukeboxSettings {
    pub mode: JukeboxMode,
    /// Minimum playback queue length
    pub queue_length: usize,
    /// Recency window; 0 disables the history check
    pub last_played_hours: u32,
    pub enforce_unique: bool,
    /// Also keep this tag's values unique among queued tracks
    pub unique_tag: Option<Tag>,
    pub source: Source,
    pub crossfade_secs: u32,
    /// Skip tracks with a "hate" like sticker
    pub ignore_hated: bool,
}

impl Default for JukeboxSettings {
    fn default() -> Self {
        Self {
            mode: JukeboxMode::Off,
            queue_length: 1,
            last_played_hours: 24,
            enforce_unique: true,
            unique_tag: None,
            source: Source::Database,
            crossfade_secs: 0,
            ignore_hated: false,
        }
    }
}

/// What a fill may read, borrowed from the player service for one call
pub struct FillContext<'a, P: ?Sized> {
    pub player: &'a P,
    pub caches: &'a Caches,
    pub history: &'a PlayHistory,
    pub notifier: &'a dyn Notifier,
    pub page_size: usize,
    /// Unix time of this poll
    pub now: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Which {
    Persistent,
    Scratch,
}

pub struct Jukebox {
    partition: String,
    settings: JukeboxSettings,
    enforce: bool,
    queue: JukeboxQueue,
    scratch: JukeboxQueue,
    rng: StdRng,
}

impl Jukebox {
    pub fn new(partition: impl Into<String>, settings: JukeboxSettings) -> Self {
        Self::with_rng(partition, settings, StdRng::from_entropy())
    }

    pub fn with_rng(partition: impl Into<String>, settings: JukeboxSettings, rng: StdRng) -> Self {
        Self {
            partition: partition.into(),
            enforce: settings.enforce_unique,
            settings,
            queue: JukeboxQueue::default(),
            scratch: JukeboxQueue::default(),
            rng,
        }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn settings(&self) -> &JukeboxSettings {
        &self.settings
    }

    /// Reconfigure; restores uniqueness enforcement and drops queued candidates
    pub fn set_settings(&mut self, settings: JukeboxSettings) {
        self.enforce = settings.enforce_unique;
        self.settings = settings;
        self.queue.clear();
        self.scratch.clear();
    }

    /// Whether uniqueness is currently enforced
    pub fn is_enforcing(&self) -> bool {
        self.enforce
    }

    pub fn queue(&self) -> &JukeboxQueue {
        &self.queue
    }

    pub fn scratch(&self) -> &JukeboxQueue {
        &self.scratch
    }

    fn albums(&self) -> bool {
        self.settings.mode == JukeboxMode::AddAlbums
    }

    /// Items to add right now, `None` when the queue is long enough
    pub fn needed(&self, status: &PlayerStatus) -> Option<usize> {
        let target = self.settings.queue_length;
        let remaining = status.queue_length;
        // Unknown while not playing, which counts as already passed
        let add_time_passed = match status.remaining_secs() {
            Some(left) => left - f64::from(self.settings.crossfade_secs) <= 0.0,
            None => true,
        };

        if remaining >= target && !add_time_passed {
            return None;
        }
        let mut needed = target.saturating_sub(remaining);
        if add_time_passed && remaining <= target {
            needed += 1;
        }
        let needed = needed.min(MAX_ADD);
        (needed > 0).then_some(needed)
    }

    /// Trigger check and fill, retried once. Returns how many items were added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetriesExhausted`] wrapping the last failure when both
    /// attempts fail, after a `JukeboxError` event has been emitted.
    pub fn run<P: MusicPlayer + ?Sized>(&mut self, ctx: &FillContext<'_, P>) -> Result<usize> {
        if self.settings.mode == JukeboxMode::Off {
            return Ok(0);
        }

        let mut attempt = 1;
        let last = loop {
            match self.attempt(ctx) {
                Ok(added) => return Ok(added),
                Err(e) if attempt < ATTEMPTS => {
                    warn!("[{}] Jukebox attempt {attempt} failed: {e}", self.partition);
                    attempt += 1;
                }
                Err(e) => break e,
            }
        };

        error!(
            "[{}] Jukebox failed after {ATTEMPTS} attempts: {last}",
            self.partition
        );
        ctx.notifier
            .emit(EventKind::JukeboxError, &self.partition, Some(&last.to_string()));
        Err(Error::RetriesExhausted {
            attempts: ATTEMPTS,
            last: Box::new(last),
        })
    }

    fn attempt<P: MusicPlayer + ?Sized>(&mut self, ctx: &FillContext<'_, P>) -> Result<usize> {
        let status = ctx.player.status()?;
        let Some(needed) = self.needed(&status) else {
            return Ok(0);
        };
        debug!(
            "[{}] Queue has {} songs, adding {needed}",
            self.partition, status.queue_length
        );

        let albums = self.albums();
        let enforce = self.enforce;
        if self.queue.len() < needed {
            let target = needed + buffer(albums);
            self.refill(ctx, Which::Persistent, albums, enforce, needed, target)?;
        }
        self.apply(ctx, Which::Persistent, albums, enforce, needed)
    }

    /// Add exactly `count` random items right now, through the scratch queue
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AlbumCacheMissing`] for an album fill before the
    /// album cache exists, or with whatever the player reports while listing
    /// or adding.
    pub fn fill_manual<P: MusicPlayer + ?Sized>(
        &mut self,
        ctx: &FillContext<'_, P>,
        count: usize,
        albums: bool,
    ) -> Result<usize> {
        let count = count.min(MAX_ADD);
        if count == 0 {
            return Ok(0);
        }
        let enforce = self.enforce;
        self.scratch.clear();
        self.refill(ctx, Which::Scratch, albums, enforce, count, count)?;
        let added = self.apply(ctx, Which::Scratch, albums, enforce, count);
        self.scratch.clear();
        added
    }

    /// Sample until `which` holds `target` candidates.
    ///
    /// `enforce` is fixed for a whole fill, so relaxing only affects later ones.
    fn refill<P: MusicPlayer + ?Sized>(
        &mut self,
        ctx: &FillContext<'_, P>,
        which: Which,
        albums: bool,
        enforce: bool,
        needed: usize,
        target: usize,
    ) -> Result<()> {
        let hours = i64::from(self.settings.last_played_hours);
        let since = ctx.now - hours * 3600;

        let mut recent_uris: HashSet<String> = ctx.player.queue_uris()?.into_iter().collect();
        let stickers = ctx.caches.stickers();
        if hours > 0 {
            recent_uris.extend(ctx.history.recent_uris(since)?);
        }
        let recent = RecentlyPlayed::new(
            recent_uris,
            if hours > 0 { stickers } else { None },
            since,
        );

        let drawn = {
            let pending = match which {
                Which::Persistent => &self.queue,
                Which::Scratch => &self.scratch,
            };
            let exclusions = Exclusions {
                enforce,
                unique_tag: self.settings.unique_tag,
                ignore_hated: self.settings.ignore_hated,
                stickers,
                pending,
                recent: &recent,
            };
            let k = target.saturating_sub(pending.len());
            if albums {
                let index = ctx.caches.albums().ok_or(Error::AlbumCacheMissing)?;
                sampler::sample_albums(index, &exclusions, k, &mut self.rng)
            } else {
                sampler::sample_tracks(
                    ctx.player,
                    &self.settings.source,
                    ctx.page_size,
                    &exclusions,
                    k,
                    &mut self.rng,
                )?
            }
        };

        let partition = &self.partition;
        let queue = match which {
            Which::Persistent => &mut self.queue,
            Which::Scratch => &mut self.scratch,
        };
        let drew = drawn.len();
        queue.extend(drawn);
        debug!("[{partition}] Drew {drew} candidates, {} queued", queue.len());

        if queue.is_empty() {
            return Err(Error::NoCandidates);
        }
        if queue.len() < needed && enforce {
            let relaxing = match which {
                Which::Persistent => std::mem::replace(&mut self.enforce, false),
                Which::Scratch => true,
            };
            if relaxing {
                warn!("[{partition}] {RELAX_WARNING}");
                ctx.notifier
                    .emit(EventKind::JukeboxWarning, partition, Some(RELAX_WARNING));
            }
        }
        Ok(())
    }

    /// Hand up to `count` candidates from the front of `which` to the player
    fn apply<P: MusicPlayer + ?Sized>(
        &mut self,
        ctx: &FillContext<'_, P>,
        which: Which,
        albums: bool,
        enforce: bool,
        count: usize,
    ) -> Result<usize> {
        let low_water = if albums { ALBUM_LOW_WATER } else { TRACK_LOW_WATER };
        let mut added = 0;
        let mut last_error = None;
        let mut refilled = false;

        while added < count {
            let next = match which {
                Which::Persistent => self.queue.pop_front(),
                Which::Scratch => self.scratch.pop_front(),
            };
            let Some(candidate) = next else {
                break;
            };

            match add(ctx.player, &candidate) {
                Ok(()) => added += 1,
                Err(e) => {
                    warn!("[{}] Skipping candidate: {e}", self.partition);
                    last_error = Some(e);
                }
            }

            if which == Which::Persistent && !refilled && self.queue.len() < low_water {
                refilled = true;
                let still_needed = count - added;
                let target = still_needed + buffer(albums);
                if let Err(e) =
                    self.refill(ctx, Which::Persistent, albums, enforce, still_needed, target)
                {
                    warn!("[{}] Refill during apply failed: {e}", self.partition);
                }
            }
        }

        if added == 0 {
            return match last_error {
                Some(e) => Err(e),
                None => Ok(0),
            };
        }

        ctx.player.play()?;
        info!("[{}] Jukebox added {added}", self.partition);
        ctx.notifier
            .emit(EventKind::UpdateJukebox, &self.partition, None);
        Ok(added)
    }
}

impl CacheDependent for Jukebox {
    fn invalidate(&mut self) {
        self.queue.clear();
        self.scratch.clear();
    }
}

fn buffer(albums: bool) -> usize {
    if albums {
        ALBUM_BUFFER
    } else {
        TRACK_BUFFER
    }
}

fn add<P: MusicPlayer + ?Sized>(player: &P, candidate: &Candidate) -> Result<()> {
    match &candidate.item {
        CandidateKind::Track { uri, .. } => player.add_track(uri),
        CandidateKind::Album(key) => player.add_album(&key.album, &key.album_artist),
    }
}
