//! # Integration Tests for jukeboxd
//!
//! End-to-end scenarios against the public API: a [`PlayerService`] driving a
//! scripted player, the cache build and swap cycle, manual fills through the
//! request queue, and the sampling guarantees the jukebox relies on.

use anyhow::Result;
use jukeboxd::cache::{AlbumIndex, AlbumKey, CacheKind, CacheKinds};
use jukeboxd::context::{Command, Context, Reply};
use jukeboxd::daemon::{unix_now, Partition, PlayerService, ServiceOptions};
use jukeboxd::events::{EventKind, MemoryNotifier};
use jukeboxd::history::PlayHistory;
use jukeboxd::jukebox::queue::{CandidateKind, JukeboxQueue};
use jukeboxd::jukebox::sampler::{self, Exclusions, RecentlyPlayed, Reservoir};
use jukeboxd::jukebox::{JukeboxMode, JukeboxSettings};
use jukeboxd::player::{DbStats, MusicPlayer, PlayState, PlayerStatus, Song, Tag};
use jukeboxd::work_queue::{Message, Timeout};
use jukeboxd::Error;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000;

#[derive(Default)]
struct PlayerState {
    library: Vec<Song>,
    queue: Vec<String>,
    current: Option<String>,
    fail_search: bool,
}

/// Scripted player shared between the service and its cache builders
#[derive(Clone, Default)]
struct FakePlayer(Arc<Mutex<PlayerState>>);

impl FakePlayer {
    fn with_library(library: Vec<Song>) -> Self {
        let player = Self::default();
        player.0.lock().library = library;
        player
    }

    fn queue(&self) -> Vec<String> {
        self.0.lock().queue.clone()
    }
}

impl MusicPlayer for FakePlayer {
    fn search_page(&self, offset: usize, limit: usize) -> jukeboxd::Result<Vec<Song>> {
        let state = self.0.lock();
        if state.fail_search {
            return Err(jukeboxd::Error::Protocol {
                command: "search".to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(state.library.iter().skip(offset).take(limit).cloned().collect())
    }

    fn playlist_page(&self, _: &str, _: usize, _: usize) -> jukeboxd::Result<Vec<Song>> {
        Ok(Vec::new())
    }

    fn queue_uris(&self) -> jukeboxd::Result<Vec<String>> {
        Ok(self.queue())
    }

    fn add_track(&self, uri: &str) -> jukeboxd::Result<()> {
        self.0.lock().queue.push(uri.to_string());
        Ok(())
    }

    fn add_album(&self, album: &str, _: &str) -> jukeboxd::Result<()> {
        let mut state = self.0.lock();
        let uris: Vec<String> = state
            .library
            .iter()
            .filter(|song| song.album.as_deref() == Some(album))
            .map(|song| song.uri.clone())
            .collect();
        state.queue.extend(uris);
        Ok(())
    }

    fn play(&self) -> jukeboxd::Result<()> {
        Ok(())
    }

    fn status(&self) -> jukeboxd::Result<PlayerStatus> {
        let state = self.0.lock();
        Ok(PlayerStatus {
            state: PlayState::Play,
            queue_length: state.queue.len(),
            current_uri: state.current.clone(),
            elapsed: 10.0,
            duration: Some(300.0),
        })
    }

    fn stats(&self) -> jukeboxd::Result<DbStats> {
        Ok(DbStats {
            songs: self.0.lock().library.len() as u64,
            db_updated: "1".to_string(),
        })
    }
}

/// `count` tracks spread over albums of three songs, one artist per album
fn library(count: usize) -> Vec<Song> {
    (0..count)
        .map(|n| Song {
            album: Some(format!("Album {}", n / 3)),
            artist: Some(format!("Artist {}", n / 3)),
            duration: 180,
            ..Song::new(format!("t{n:02}.flac"))
        })
        .collect()
}

fn tracks_mode(queue_length: usize) -> JukeboxSettings {
    JukeboxSettings {
        mode: JukeboxMode::AddTracks,
        queue_length,
        ..JukeboxSettings::default()
    }
}

fn service_with(
    player: &FakePlayer,
    settings: JukeboxSettings,
    history: PlayHistory,
) -> (PlayerService<FakePlayer>, Arc<MemoryNotifier>) {
    let notifier = Arc::new(MemoryNotifier::new());
    let service = PlayerService::new(
        Arc::new(Context::new()),
        vec![Partition::new("default", player.clone(), settings)],
        history,
        notifier.clone(),
        ServiceOptions {
            poll_interval: Duration::from_millis(20),
            page_size: 7,
            ..ServiceOptions::default()
        },
    );
    (service, notifier)
}

#[test]
fn test_autofill_relaxes_once_when_history_exhausts_library() -> Result<()> {
    let dir = TempDir::new()?;
    let player = FakePlayer::with_library(library(20));
    player.0.lock().queue = vec!["x.flac".to_string(), "y.flac".to_string()];

    let mut history = PlayHistory::new(dir.path().join("history"));
    for n in 3..20 {
        history.record(&format!("t{n:02}.flac"), NOW - 600)?;
    }
    let (mut service, notifier) = service_with(&player, tracks_mode(10), history);

    service.poll(NOW);

    let queue = player.queue();
    assert_eq!(queue.len(), 5);
    let added: HashSet<&str> = queue[2..].iter().map(String::as_str).collect();
    assert_eq!(added, HashSet::from(["t00.flac", "t01.flac", "t02.flac"]));
    assert_eq!(notifier.count(EventKind::JukeboxWarning), 1);
    assert_eq!(notifier.count(EventKind::JukeboxError), 0);
    assert_eq!(notifier.count(EventKind::UpdateJukebox), 1);
    assert!(!service.partitions()[0].jukebox().is_enforcing());
    Ok(())
}

#[test]
fn test_autofill_skips_history_once_caches_are_built() -> Result<()> {
    let dir = TempDir::new()?;
    let player = FakePlayer::with_library(library(12));

    let mut history = PlayHistory::new(dir.path().join("history"));
    for n in 0..10 {
        history.record(&format!("t{n:02}.flac"), NOW - 600)?;
    }
    let (mut service, notifier) = service_with(&player, tracks_mode(2), history);
    service.rebuild_now(CacheKinds::ALL)?;
    assert!(service.caches().stickers().is_some());

    service.poll(NOW);

    let added: HashSet<String> = player.queue().into_iter().collect();
    assert_eq!(
        added,
        HashSet::from(["t10.flac".to_string(), "t11.flac".to_string()])
    );
    assert_eq!(notifier.count(EventKind::JukeboxWarning), 0);
    assert!(service.partitions()[0].jukebox().is_enforcing());
    Ok(())
}

#[test]
fn test_concurrent_build_is_refused() -> Result<()> {
    let dir = TempDir::new()?;
    let player = FakePlayer::with_library(library(9));
    let (mut service, _) = service_with(
        &player,
        JukeboxSettings::default(),
        PlayHistory::new(dir.path().join("history")),
    );
    let ctx = Arc::clone(service.context());

    ctx.build_flags.try_claim(CacheKinds::only(CacheKind::Albums))?;
    assert!(matches!(
        ctx.build_flags.try_claim(CacheKinds::ALL),
        Err(Error::Busy(CacheKind::Albums))
    ));
    // All-or-nothing: the sticker flag was not taken by the failed claim.
    assert!(!ctx.build_flags.is_building(CacheKind::Stickers));
    assert!(matches!(
        service.rebuild_now(CacheKinds::ALL),
        Err(Error::Busy(CacheKind::Albums))
    ));

    ctx.build_flags.release(CacheKind::Albums);
    service.rebuild_now(CacheKinds::ALL)?;
    assert_eq!(service.caches().albums().map(AlbumIndex::len), Some(3));
    Ok(())
}

#[test]
fn test_cache_swap_clears_jukebox_queue() -> Result<()> {
    let dir = TempDir::new()?;
    let player = FakePlayer::with_library(library(80));
    let (mut service, notifier) = service_with(
        &player,
        tracks_mode(3),
        PlayHistory::new(dir.path().join("history")),
    );

    service.poll(NOW);
    assert_eq!(player.queue().len(), 3);
    assert!(!service.partitions()[0].jukebox().queue().is_empty());

    service.rebuild_now(CacheKinds::only(CacheKind::Stickers))?;
    assert!(service.partitions()[0].jukebox().queue().is_empty());
    assert!(service.partitions()[0].jukebox().scratch().is_empty());
    assert_eq!(notifier.count(EventKind::UpdateStickerCache), 1);
    assert_eq!(notifier.count(EventKind::UpdateAlbumCache), 0);
    Ok(())
}

#[test]
fn test_failed_build_keeps_current_snapshot() -> Result<()> {
    let dir = TempDir::new()?;
    let player = FakePlayer::with_library(library(12));
    let (mut service, notifier) = service_with(
        &player,
        JukeboxSettings::default(),
        PlayHistory::new(dir.path().join("history")),
    );
    service.rebuild_now(CacheKinds::ALL)?;
    let before = service.caches().albums().cloned();
    assert_eq!(before.as_ref().map(AlbumIndex::len), Some(4));

    player.0.lock().fail_search = true;
    assert!(service.rebuild_now(CacheKinds::ALL).is_err());
    assert_eq!(service.caches().albums().cloned(), before);
    assert_eq!(notifier.count(EventKind::CacheError), 1);
    assert!(!service.context().build_flags.is_building(CacheKind::Albums));
    assert!(!service.context().build_flags.is_building(CacheKind::Stickers));

    // An empty result delivered through the inbox is rejected the same way.
    service
        .context()
        .inbox
        .push(Message::broadcast(Command::AlbumsBuilt(None)));
    service.drain(Timeout::NoWait);
    assert_eq!(service.caches().albums().cloned(), before);
    assert_eq!(notifier.count(EventKind::CacheError), 2);
    assert_eq!(notifier.count(EventKind::UpdateAlbumCache), 1);
    Ok(())
}

#[test]
fn test_manual_fill_is_unique_and_skips_history() -> Result<()> {
    let dir = TempDir::new()?;
    let player = FakePlayer::with_library(library(30));
    // Manual fills run against the wall clock.
    let mut history = PlayHistory::new(dir.path().join("history"));
    for n in 0..10 {
        history.record(&format!("t{n:02}.flac"), unix_now() - 60)?;
    }
    let settings = JukeboxSettings {
        unique_tag: Some(Tag::Artist),
        ..JukeboxSettings::default()
    };
    let (mut service, notifier) = service_with(&player, settings, history);
    let ctx = Arc::clone(service.context());

    ctx.request(
        9,
        Command::FillJukebox {
            partition: "default".to_string(),
            count: 5,
            albums: false,
        },
    );
    service.drain(Timeout::NoWait);
    assert_eq!(
        ctx.wait_reply(9, Timeout::NoWait),
        Some(Reply::Filled {
            partition: "default".to_string(),
            added: 5
        })
    );

    let queue = player.queue();
    let unique: HashSet<&String> = queue.iter().collect();
    assert_eq!(unique.len(), 5);
    for uri in &queue {
        let n: usize = uri[1..3].parse()?;
        assert!(n >= 10, "{uri} was played recently");
    }
    // One artist per three-track album, so five distinct albums.
    let artists: HashSet<usize> = queue
        .iter()
        .map(|uri| uri[1..3].parse::<usize>().map(|n| n / 3))
        .collect::<std::result::Result<_, _>>()?;
    assert_eq!(artists.len(), 5);
    assert_eq!(notifier.count(EventKind::JukeboxWarning), 0);
    assert!(service.partitions()[0].jukebox().scratch().is_empty());
    Ok(())
}

#[test]
fn test_album_fill_requires_album_cache() -> Result<()> {
    let dir = TempDir::new()?;
    let player = FakePlayer::with_library(library(15));
    let (mut service, _) = service_with(
        &player,
        JukeboxSettings::default(),
        PlayHistory::new(dir.path().join("history")),
    );

    assert!(matches!(
        service.fill("default", 2, true),
        Err(Error::AlbumCacheMissing)
    ));

    service.rebuild_now(CacheKinds::only(CacheKind::Albums))?;
    assert_eq!(service.fill("default", 2, true)?, 2);
    // Two whole albums of three tracks each.
    assert_eq!(player.queue().len(), 6);
    Ok(())
}

#[test]
fn test_reservoir_size_and_uniformity() {
    let mut rng = StdRng::seed_from_u64(42);
    for (n, k) in [(0, 5), (3, 5), (5, 5), (40, 5)] {
        let mut reservoir = Reservoir::new(k);
        for item in 0..n {
            reservoir.offer(item, &mut rng);
        }
        assert_eq!(reservoir.items().len(), n.min(k));
        assert_eq!(reservoir.seen(), n);
    }

    let trials = 8000;
    let mut hits = [0usize; 8];
    for _ in 0..trials {
        let mut reservoir = Reservoir::new(2);
        for item in 0..8 {
            reservoir.offer(item, &mut rng);
        }
        for &item in reservoir.items() {
            hits[item] += 1;
        }
    }
    let expected = trials * 2 / 8;
    for (item, &count) in hits.iter().enumerate() {
        let deviation = count.abs_diff(expected) as f64 / expected as f64;
        assert!(deviation < 0.1, "item {item} drawn {count} times, expected ~{expected}");
    }
}

#[test]
fn test_sample_albums_exact_and_distinct() {
    let mut index = AlbumIndex::default();
    for song in library(36) {
        index.insert_song(&song);
    }
    let pending = JukeboxQueue::default();
    let recent = RecentlyPlayed::default();
    let exclusions = Exclusions {
        enforce: true,
        unique_tag: None,
        ignore_hated: false,
        stickers: None,
        pending: &pending,
        recent: &recent,
    };
    let mut rng = StdRng::seed_from_u64(7);

    let drawn = sampler::sample_albums(&index, &exclusions, 4, &mut rng);
    assert_eq!(drawn.len(), 4);
    let distinct: HashSet<AlbumKey> = drawn
        .iter()
        .filter_map(|c| match &c.item {
            CandidateKind::Album(key) => Some(key.clone()),
            CandidateKind::Track { .. } => None,
        })
        .collect();
    assert_eq!(distinct.len(), 4);

    let everything = sampler::sample_albums(&index, &exclusions, 50, &mut rng);
    assert_eq!(everything.len(), 12);
}

#[test]
fn test_service_runs_until_shutdown() -> Result<()> {
    let dir = TempDir::new()?;
    let player = FakePlayer::with_library(library(40));
    player.0.lock().current = Some("t05.flac".to_string());
    let history_path = dir.path().join("history");
    let (mut service, notifier) = service_with(
        &player,
        tracks_mode(4),
        PlayHistory::new(&history_path),
    );
    let ctx = Arc::clone(service.context());

    let client = thread::spawn(move || {
        ctx.request(
            42,
            Command::FillJukebox {
                partition: "default".to_string(),
                count: 2,
                albums: false,
            },
        );
        let reply = ctx.wait_reply(42, Timeout::WaitMs(5_000));
        thread::sleep(Duration::from_millis(100));
        ctx.shutdown();
        reply
    });

    service.run()?;
    let reply = client.join().expect("client thread panicked");

    assert!(matches!(reply, Some(Reply::Filled { added: 2, .. })));
    assert!(player.queue().len() >= 4);
    assert!(notifier.count(EventKind::UpdateJukebox) >= 1);

    let history = PlayHistory::new(&history_path);
    let entries = history.entries()?;
    assert_eq!(entries.first().map(|e| e.uri.as_str()), Some("t05.flac"));
    assert!(service.context().inbox.is_empty());
    Ok(())
}
