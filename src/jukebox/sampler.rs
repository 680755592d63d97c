//! Reservoir sampling over a lazily paged candidate stream.
//!
//! Candidates are filtered first; the running position only counts the ones
//! that pass. The `i`-th passing candidate is kept with probability `k / i`,
//! which yields a uniform sample of `min(k, n)` items without buffering the
//! source.

use super::queue::{Candidate, CandidateKind, JukeboxQueue};
use super::Source;
use crate::cache::{Album, AlbumIndex, AlbumKey, StickerIndex};
use crate::error::Result;
use crate::player::{scan_pages, MusicPlayer, Tag};
use crate::sticker::Like;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    capacity: usize,
    seen: usize,
    items: Vec<T>,
}

impl<T> Reservoir<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: 0,
            items: Vec::with_capacity(capacity.min(1024)),
        }
    }

    /// Items offered so far
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Offer the next item of the stream. Returns whether it was kept.
    pub fn offer<R: Rng + ?Sized>(&mut self, item: T, rng: &mut R) -> bool {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return true;
        }
        let slot = rng.gen_range(0..self.seen);
        if slot < self.capacity {
            self.items[slot] = item;
            return true;
        }
        false
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_shuffled<R: Rng + ?Sized>(mut self, rng: &mut R) -> Vec<T> {
        self.items.shuffle(rng);
        self.items
    }
}

/// Songs to avoid: the live playback queue and the play-history log, plus
/// any song whose `lastPlayed` sticker falls inside the window.
#[derive(Debug, Default)]
pub struct RecentlyPlayed<'a> {
    uris: HashSet<String>,
    stickers: Option<&'a StickerIndex>,
    since: i64,
}

impl<'a> RecentlyPlayed<'a> {
    pub fn new(uris: HashSet<String>, stickers: Option<&'a StickerIndex>, since: i64) -> Self {
        Self {
            uris,
            stickers,
            since,
        }
    }

    pub fn contains(&self, uri: &str) -> bool {
        if self.uris.contains(uri) {
            return true;
        }
        self.stickers
            .and_then(|stickers| stickers.get(uri))
            .is_some_and(|sticker| sticker.last_played > 0 && sticker.last_played >= self.since)
    }
}

/// Rejection rules for one fill
pub struct Exclusions<'a> {
    /// Uniqueness and recency checks; relaxed once the source runs dry
    pub enforce: bool,
    pub unique_tag: Option<Tag>,
    pub ignore_hated: bool,
    pub stickers: Option<&'a StickerIndex>,
    pub pending: &'a JukeboxQueue,
    pub recent: &'a RecentlyPlayed<'a>,
}

impl Exclusions<'_> {
    fn is_hated(&self, uri: &str) -> bool {
        self.ignore_hated
            && self
                .stickers
                .and_then(|stickers| stickers.get(uri))
                .is_some_and(|sticker| sticker.like == Like::Hate)
    }

    pub fn rejects_track(&self, uri: &str, tag_value: Option<&str>, drawn: &[Candidate]) -> bool {
        if self.is_hated(uri) {
            return true;
        }
        if !self.enforce {
            return false;
        }
        if drawn.iter().any(|c| c.uri() == Some(uri))
            || self.pending.contains_uri(uri)
            || self.recent.contains(uri)
        {
            return true;
        }
        match tag_value {
            Some(value) => {
                self.pending.contains_tag(value)
                    || drawn.iter().any(|c| {
                        matches!(&c.item, CandidateKind::Track { tag_value: Some(v), .. } if v == value)
                    })
            }
            None => false,
        }
    }

    pub fn rejects_album(&self, key: &AlbumKey, album: &Album, drawn: &[Candidate]) -> bool {
        if !self.enforce {
            return false;
        }
        drawn
            .iter()
            .any(|c| matches!(&c.item, CandidateKind::Album(k) if k == key))
            || self.pending.contains_album(key)
            || album.uris.iter().any(|uri| self.recent.contains(uri))
    }
}

/// Draw up to `k` tracks from a playlist or the whole database
pub fn sample_tracks<P, R>(
    player: &P,
    source: &Source,
    page_size: usize,
    exclusions: &Exclusions<'_>,
    k: usize,
    rng: &mut R,
) -> Result<Vec<Candidate>>
where
    P: MusicPlayer + ?Sized,
    R: Rng + ?Sized,
{
    let mut reservoir = Reservoir::new(k);
    let mut rejected = 0usize;
    let visit = |song: crate::player::Song| {
        let tag_value = exclusions
            .unique_tag
            .and_then(|tag| song.tag(tag))
            .map(str::to_string);
        if exclusions.rejects_track(&song.uri, tag_value.as_deref(), reservoir.items()) {
            rejected += 1;
            return;
        }
        let drawn_at = reservoir.seen() + 1;
        reservoir.offer(Candidate::track(song.uri, tag_value, drawn_at), rng);
    };

    let scanned = match source {
        Source::Database => scan_pages(page_size, |o, l| player.search_page(o, l), visit)?,
        Source::Playlist(name) => {
            scan_pages(page_size, |o, l| player.playlist_page(name, o, l), visit)?
        }
    };
    debug!(
        "Sampled {} of {} tracks ({rejected} rejected)",
        reservoir.items().len(),
        scanned
    );
    Ok(reservoir.into_shuffled(rng))
}

/// Draw up to `k` albums from the album index
pub fn sample_albums<R: Rng + ?Sized>(
    index: &AlbumIndex,
    exclusions: &Exclusions<'_>,
    k: usize,
    rng: &mut R,
) -> Vec<Candidate> {
    let mut reservoir = Reservoir::new(k);
    for (key, album) in index.iter() {
        if exclusions.rejects_album(key, album, reservoir.items()) {
            continue;
        }
        let drawn_at = reservoir.seen() + 1;
        reservoir.offer(Candidate::album(key.clone(), drawn_at), rng);
    }
    debug!(
        "Sampled {} of {} albums",
        reservoir.items().len(),
        index.len()
    );
    reservoir.into_shuffled(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sticker::Sticker;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn exclusions<'a>(
        pending: &'a JukeboxQueue,
        recent: &'a RecentlyPlayed<'a>,
        enforce: bool,
    ) -> Exclusions<'a> {
        Exclusions {
            enforce,
            unique_tag: None,
            ignore_hated: false,
            stickers: None,
            pending,
            recent,
        }
    }

    #[test]
    fn test_reservoir_size_is_min_of_k_and_n() {
        let mut rng = StdRng::seed_from_u64(7);
        for (k, n) in [(0, 5), (3, 10), (10, 3), (5, 5)] {
            let mut reservoir = Reservoir::new(k);
            for item in 0..n {
                reservoir.offer(item, &mut rng);
            }
            assert_eq!(reservoir.into_shuffled(&mut rng).len(), k.min(n));
        }
    }

    #[test]
    fn test_reservoir_is_uniform() {
        let mut rng = StdRng::seed_from_u64(42);
        let (k, n, trials) = (3usize, 12usize, 20_000usize);
        let mut hits = vec![0usize; n];
        for _ in 0..trials {
            let mut reservoir = Reservoir::new(k);
            for item in 0..n {
                reservoir.offer(item, &mut rng);
            }
            for item in reservoir.items() {
                hits[*item] += 1;
            }
        }

        let expected = (trials * k) as f64 / n as f64;
        for (item, count) in hits.iter().enumerate() {
            let deviation = (*count as f64 - expected).abs() / expected;
            assert!(deviation < 0.08, "item {item} drawn {count} times, expected ~{expected}");
        }
    }

    #[test]
    fn test_recently_played_prefers_stickers() {
        let mut stickers = StickerIndex::default();
        stickers.reserve("old.flac");
        stickers.reserve("new.flac");
        stickers.reserve("never.flac");
        let mut store = std::collections::HashMap::new();
        store.insert("old.flac".to_string(), Sticker { last_played: 100, ..Sticker::default() });
        store.insert("new.flac".to_string(), Sticker { last_played: 900, ..Sticker::default() });
        stickers.fill_from(&store).unwrap();

        let queued: HashSet<String> = ["queued.flac".to_string()].into();
        let recent = RecentlyPlayed::new(queued, Some(&stickers), 500);
        assert!(recent.contains("new.flac"));
        assert!(recent.contains("queued.flac"));
        assert!(!recent.contains("old.flac"));
        assert!(!recent.contains("never.flac"));
    }

    #[test]
    fn test_track_rules() {
        let mut pending = JukeboxQueue::default();
        pending.push_back(Candidate::track("pending.flac", Some("Jazz".to_string()), 1));
        let recent = RecentlyPlayed::new(["played.flac".to_string()].into(), None, 0);
        let drawn = vec![Candidate::track("drawn.flac", None, 1)];

        let rules = exclusions(&pending, &recent, true);
        assert!(rules.rejects_track("pending.flac", None, &drawn));
        assert!(rules.rejects_track("played.flac", None, &drawn));
        assert!(rules.rejects_track("drawn.flac", None, &drawn));
        assert!(rules.rejects_track("fresh.flac", Some("Jazz"), &drawn));
        assert!(!rules.rejects_track("fresh.flac", Some("Rock"), &drawn));

        let relaxed = exclusions(&pending, &recent, false);
        assert!(!relaxed.rejects_track("played.flac", None, &drawn));
    }

    #[test]
    fn test_hated_tracks_skipped_even_when_relaxed() {
        let mut stickers = StickerIndex::default();
        stickers.reserve("hated.flac");
        let mut store = std::collections::HashMap::new();
        store.insert("hated.flac".to_string(), Sticker { like: Like::Hate, ..Sticker::default() });
        stickers.fill_from(&store).unwrap();

        let pending = JukeboxQueue::default();
        let recent = RecentlyPlayed::default();
        let rules = Exclusions {
            ignore_hated: true,
            stickers: Some(&stickers),
            ..exclusions(&pending, &recent, false)
        };
        assert!(rules.rejects_track("hated.flac", None, &[]));
        assert!(!rules.rejects_track("other.flac", None, &[]));
    }

    #[test]
    fn test_sample_albums_skips_recent_albums() {
        let mut index = AlbumIndex::default();
        for (uri, album) in [("a/1.flac", "A"), ("a/2.flac", "A"), ("b/1.flac", "B"), ("c/1.flac", "C")] {
            index.insert_song(&crate::player::Song {
                album: Some(album.to_string()),
                artist: Some("X".to_string()),
                ..crate::player::Song::new(uri)
            });
        }
        let pending = JukeboxQueue::default();
        let recent = RecentlyPlayed::new(["a/2.flac".to_string()].into(), None, 0);
        let mut rng = StdRng::seed_from_u64(1);

        let drawn = sample_albums(&index, &exclusions(&pending, &recent, true), 10, &mut rng);
        let mut names: Vec<String> = drawn
            .iter()
            .filter_map(|c| match &c.item {
                CandidateKind::Album(key) => Some(key.album.clone()),
                CandidateKind::Track { .. } => None,
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["B", "C"]);
    }
}
