//! # Metadata caches
//!
//! Two read-optimized snapshots are rebuilt from the player's database:
//!
//! - [`AlbumIndex`]: one record per (album, album artist) pair.
//! - [`StickerIndex`]: one [`Sticker`] per track URI.
//!
//! A snapshot is never mutated once built. It has exactly one owner at a time:
//! the builder thread while it is being built ([`builder`]), the message that
//! carries it through the work queue, and finally [`Caches`] on the player
//! thread, where [`swap::install`] replaces the previous one.

pub mod builder;
pub mod swap;

pub use swap::{CacheDependent, Snapshot};

use crate::error::{Error, Result};
use crate::player::Song;
use crate::sticker::{Sticker, StickerStore};
use log::debug;
use std::collections::{btree_map, hash_map, BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Albums,
    Stickers,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Albums => f.write_str("album"),
            Self::Stickers => f.write_str("sticker"),
        }
    }
}

/// Which caches a build should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheKinds {
    pub albums: bool,
    pub stickers: bool,
}

impl CacheKinds {
    pub const ALL: Self = Self {
        albums: true,
        stickers: true,
    };

    pub fn only(kind: CacheKind) -> Self {
        match kind {
            CacheKind::Albums => Self {
                albums: true,
                stickers: false,
            },
            CacheKind::Stickers => Self {
                albums: false,
                stickers: true,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.albums && !self.stickers
    }

    pub fn iter(&self) -> impl Iterator<Item = CacheKind> {
        [
            (self.albums, CacheKind::Albums),
            (self.stickers, CacheKind::Stickers),
        ]
        .into_iter()
        .filter_map(|(wanted, kind)| wanted.then_some(kind))
    }
}

/// Dedup key of the album index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlbumKey {
    pub album: String,
    pub album_artist: String,
}

impl AlbumKey {
    pub fn new(album: impl Into<String>, album_artist: impl Into<String>) -> Self {
        Self {
            album: album.into(),
            album_artist: album_artist.into(),
        }
    }

    /// Key of the album a song belongs to. Album artist falls back to artist;
    /// songs without album and without any artist have no key.
    pub fn of(song: &Song) -> Option<Self> {
        let artist = song.album_artist.as_deref().or(song.artist.as_deref());
        match (song.album.as_deref(), artist) {
            (None, None) => None,
            (album, artist) => Some(Self::new(album.unwrap_or(""), artist.unwrap_or(""))),
        }
    }
}

impl fmt::Display for AlbumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.album_artist, self.album)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    /// First track seen for this album during the scan
    pub first_uri: String,
    pub uris: Vec<String>,
    /// Total length in seconds
    pub duration: u64,
    pub date: Option<String>,
    pub genre: Option<String>,
}

impl Album {
    fn from_song(song: &Song) -> Self {
        Self {
            first_uri: song.uri.clone(),
            uris: vec![song.uri.clone()],
            duration: u64::from(song.duration),
            date: song.date.clone(),
            genre: song.genre.clone(),
        }
    }

    pub fn track_count(&self) -> usize {
        self.uris.len()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AlbumIndex {
    albums: BTreeMap<AlbumKey, Album>,
    skipped: usize,
}

impl AlbumIndex {
    /// Add a song to its album. The first song of an album provides the
    /// album's metadata. Returns `false` when the song has no album key.
    pub fn insert_song(&mut self, song: &Song) -> bool {
        let Some(key) = AlbumKey::of(song) else {
            self.skipped += 1;
            return false;
        };
        match self.albums.entry(key) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(Album::from_song(song));
            }
            btree_map::Entry::Occupied(mut entry) => {
                let album = entry.get_mut();
                album.uris.push(song.uri.clone());
                album.duration += u64::from(song.duration);
            }
        }
        true
    }

    pub fn get(&self, key: &AlbumKey) -> Option<&Album> {
        self.albums.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AlbumKey, &Album)> {
        self.albums.iter()
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }

    /// Songs left out for lacking both album and artist tags
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StickerIndex {
    stickers: HashMap<String, Sticker>,
}

impl StickerIndex {
    /// Reserve a default record for `uri` unless one exists
    pub fn reserve(&mut self, uri: &str) {
        if let hash_map::Entry::Vacant(entry) = self.stickers.entry(uri.to_string()) {
            entry.insert(Sticker::default());
        }
    }

    /// Second pass: replace every reserved record with the stored values
    pub fn fill_from(&mut self, store: &dyn StickerStore) -> Result<usize> {
        let mut found = 0;
        for (uri, sticker) in self.stickers.iter_mut() {
            if let Some(stored) = store.stickers(uri)? {
                *sticker = stored;
                found += 1;
            }
        }
        debug!("Filled {found} of {} sticker records", self.stickers.len());
        Ok(found)
    }

    pub fn get(&self, uri: &str) -> Option<&Sticker> {
        self.stickers.get(uri)
    }

    pub fn len(&self) -> usize {
        self.stickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stickers.is_empty()
    }
}

/// Current snapshots, owned by the player thread
#[derive(Debug, Default)]
pub struct Caches {
    albums: Option<AlbumIndex>,
    stickers: Option<StickerIndex>,
}

impl Caches {
    pub fn albums(&self) -> Option<&AlbumIndex> {
        self.albums.as_ref()
    }

    pub fn stickers(&self) -> Option<&StickerIndex> {
        self.stickers.as_ref()
    }
}

/// Per-kind "build in flight" flags shared between threads
#[derive(Debug, Default)]
pub struct BuildFlags {
    albums: AtomicBool,
    stickers: AtomicBool,
}

impl BuildFlags {
    fn flag(&self, kind: CacheKind) -> &AtomicBool {
        match kind {
            CacheKind::Albums => &self.albums,
            CacheKind::Stickers => &self.stickers,
        }
    }

    /// Mark every requested kind as building, or none of them if any is
    /// already in flight.
    pub fn try_claim(&self, kinds: CacheKinds) -> Result<()> {
        let mut claimed = Vec::new();
        for kind in kinds.iter() {
            let won = self
                .flag(kind)
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if !won {
                for kind in claimed {
                    self.release(kind);
                }
                return Err(Error::Busy(kind));
            }
            claimed.push(kind);
        }
        Ok(())
    }

    pub fn release(&self, kind: CacheKind) {
        self.flag(kind).store(false, Ordering::Release);
    }

    pub fn is_building(&self, kind: CacheKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }
}
