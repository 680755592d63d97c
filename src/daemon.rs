//! # Player Service
//!
//! The thread that owns the player connection. It polls every partition's
//! status, records play history when the current song changes, runs the
//! jukebox, and handles inbox requests: cache build requests, finished caches
//! and manual fills. Replies go to the response queue under the request's
//! correlation id.
//!
//! ## Loop
//!
//! 1. Compare the database update token with the last one seen and request a
//!    rebuild of every cache when it changed.
//! 2. Poll each partition and run its jukebox.
//! 3. Wait up to the poll interval for inbox messages, then drain the rest
//!    without blocking.
//! 4. Expire responses nobody collected.
//!
//! On shutdown both queues are emptied and pending history is written out.
//! Builds still running are left to finish; their results are discarded.
//!
//! The PID file helpers at the bottom back the `daemon start|stop|status`
//! subcommands.

use crate::cache::builder::{self, BuildOptions, DEFAULT_PAGE_SIZE};
use crate::cache::{CacheKind, CacheKinds, Caches, Snapshot};
use crate::context::{Command, Context, Reply};
use crate::error::{Error, Result};
use crate::events::{EventKind, Notifier, ALL_PARTITIONS};
use crate::history::PlayHistory;
use crate::jukebox::{FillContext, Jukebox, JukeboxSettings};
use crate::player::MusicPlayer;
use crate::sticker::{SqliteStickerStore, StickerStore};
use crate::work_queue::{Message, Timeout};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unix time in whole seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

/// One playback partition: its player handle and its jukebox
pub struct Partition<P> {
    player: P,
    jukebox: Jukebox,
    last_song: Option<String>,
}

impl<P> Partition<P> {
    pub fn new(name: &str, player: P, settings: JukeboxSettings) -> Self {
        Self::with_jukebox(player, Jukebox::new(name, settings))
    }

    pub fn with_jukebox(player: P, jukebox: Jukebox) -> Self {
        Self {
            player,
            jukebox,
            last_song: None,
        }
    }

    pub fn name(&self) -> &str {
        self.jukebox.partition()
    }

    pub fn jukebox(&self) -> &Jukebox {
        &self.jukebox
    }

    pub fn jukebox_mut(&mut self) -> &mut Jukebox {
        &mut self.jukebox
    }

    pub fn player(&self) -> &P {
        &self.player
    }
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub poll_interval: Duration,
    pub page_size: usize,
    /// Responses older than this are dropped
    pub response_max_age: Duration,
    pub sticker_db: Option<PathBuf>,
    /// Caches built when the service starts
    pub cache_kinds: CacheKinds,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            page_size: DEFAULT_PAGE_SIZE,
            response_max_age: Duration::from_secs(60),
            sticker_db: None,
            cache_kinds: CacheKinds::ALL,
        }
    }
}

pub struct PlayerService<P> {
    ctx: Arc<Context>,
    partitions: Vec<Partition<P>>,
    caches: Caches,
    history: PlayHistory,
    notifier: Arc<dyn Notifier>,
    options: ServiceOptions,
    db_updated: Option<String>,
    builders: Vec<JoinHandle<()>>,
}

impl<P> PlayerService<P>
where
    P: MusicPlayer + Clone + Send + 'static,
{
    pub fn new(
        ctx: Arc<Context>,
        partitions: Vec<Partition<P>>,
        history: PlayHistory,
        notifier: Arc<dyn Notifier>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            ctx,
            partitions,
            caches: Caches::default(),
            history,
            notifier,
            options,
            db_updated: None,
            builders: Vec::new(),
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn history(&self) -> &PlayHistory {
        &self.history
    }

    pub fn partitions(&self) -> &[Partition<P>] {
        &self.partitions
    }

    pub fn partition_mut(&mut self, name: &str) -> Option<&mut Partition<P>> {
        self.partitions.iter_mut().find(|p| p.name() == name)
    }

    /// Serve until the context shuts down
    pub fn run(&mut self) -> Result<()> {
        info!(
            "Player service started with {} partition(s)",
            self.partitions.len()
        );
        if !self.options.cache_kinds.is_empty() {
            if let Err(e) = self.request_build(self.options.cache_kinds) {
                warn!("Initial cache build not started: {e}");
            }
        }

        while !self.ctx.is_shutting_down() {
            self.poll(unix_now());
            let wait = self.options.poll_interval.as_millis() as u64;
            self.drain(Timeout::WaitMs(wait));
            self.ctx.responses.expire(self.options.response_max_age);
        }
        self.finish()
    }

    /// Empty both queues and write pending history
    pub fn finish(&mut self) -> Result<()> {
        let dropped = self.ctx.inbox.expire(Duration::ZERO) + self.ctx.responses.expire(Duration::ZERO);
        let running = self.builders.iter().filter(|b| !b.is_finished()).count();
        if running > 0 {
            debug!("Leaving {running} cache build(s) to finish on their own");
        }
        self.builders.clear();
        self.history.flush()?;
        info!("Player service stopped ({dropped} queued messages dropped)");
        Ok(())
    }

    /// One status poll over every partition
    pub fn poll(&mut self, now: i64) {
        self.check_database();

        for partition in &mut self.partitions {
            let status = match partition.player.status() {
                Ok(status) => status,
                Err(e) => {
                    warn!("[{}] Status poll failed: {e}", partition.name());
                    continue;
                }
            };

            if status.current_uri != partition.last_song {
                if let Some(uri) = &status.current_uri {
                    debug!("[{}] Now playing {uri}", partition.name());
                    if let Err(e) = self.history.record(uri, now) {
                        warn!("Could not record play history: {e}");
                    }
                }
                partition.last_song = status.current_uri;
            }

            let ctx = FillContext {
                player: &partition.player,
                caches: &self.caches,
                history: &self.history,
                notifier: self.notifier.as_ref(),
                page_size: self.options.page_size,
                now,
            };
            // Failures are reported by the jukebox itself.
            if let Err(e) = partition.jukebox.run(&ctx) {
                debug!("[{}] {e}", partition.jukebox.partition());
            }
        }
    }

    fn check_database(&mut self) {
        let Some(first) = self.partitions.first() else {
            return;
        };
        let stats = match first.player.stats() {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Could not read database stats: {e}");
                return;
            }
        };
        let changed = self
            .db_updated
            .as_ref()
            .is_some_and(|seen| *seen != stats.db_updated);
        self.db_updated = Some(stats.db_updated);

        if changed {
            info!("Music database changed, rebuilding caches");
            if let Err(e) = self.request_build(CacheKinds::ALL) {
                info!("Rebuild postponed: {e}");
            }
        }
    }

    /// Block up to `timeout` for the first inbox message, then handle
    /// everything already queued. Returns how many messages were handled.
    pub fn drain(&mut self, timeout: Timeout) -> usize {
        let mut handled = 0;
        let mut next = self.ctx.inbox.pop(timeout, 0);
        while let Some(message) = next {
            self.handle(message);
            handled += 1;
            next = self.ctx.inbox.pop(Timeout::NoWait, 0);
        }
        handled
    }

    pub fn handle(&mut self, message: Message<Command>) {
        let id = message.id;
        let command = message.into_payload();
        debug!("Handling {} (id {id})", command.name());

        match command {
            Command::BuildCache { kinds } => {
                let reply = match self.request_build(kinds) {
                    Ok(()) => Reply::Accepted,
                    Err(Error::Busy(kind)) => Reply::Busy(kind),
                    Err(e) => Reply::Failed(e.to_string()),
                };
                self.reply(id, reply);
            }
            Command::AlbumsBuilt(index) => {
                self.install(CacheKind::Albums, index.map(Snapshot::Albums));
            }
            Command::StickersBuilt(index) => {
                self.install(CacheKind::Stickers, index.map(Snapshot::Stickers));
            }
            Command::FillJukebox {
                partition,
                count,
                albums,
            } => {
                let reply = match self.fill(&partition, count, albums) {
                    Ok(added) => Reply::Filled { partition, added },
                    Err(e) => {
                        warn!("[{partition}] Manual fill failed: {e}");
                        Reply::Failed(e.to_string())
                    }
                };
                self.reply(id, reply);
            }
        }
    }

    fn reply(&self, id: u64, reply: Reply) {
        if id != 0 {
            self.ctx.reply(id, reply);
        }
    }

    fn install(&mut self, kind: CacheKind, snapshot: Option<Snapshot>) {
        if self.ctx.is_shutting_down() {
            debug!("Not installing {kind} cache, shutting down");
        } else {
            crate::cache::swap::install(
                &mut self.caches,
                kind,
                snapshot,
                self.partitions.iter_mut().map(|p| &mut p.jukebox),
                self.notifier.as_ref(),
            );
        }
        self.ctx.build_flags.release(kind);
    }

    /// Start a background build of `kinds`, or fail with `Busy`
    pub fn request_build(&mut self, kinds: CacheKinds) -> Result<()> {
        let Some(player) = self.partitions.first().map(|p| p.player.clone()) else {
            return Ok(());
        };
        self.ctx.build_flags.try_claim(kinds)?;
        self.builders.retain(|b| !b.is_finished());
        self.builders.push(builder::spawn_build(
            Arc::clone(&self.ctx),
            player,
            self.options.sticker_db.clone(),
            self.build_options(kinds),
            Arc::clone(&self.notifier),
        ));
        Ok(())
    }

    /// Build `kinds` on this thread and install the result before returning
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] when one of `kinds` is already being
    /// built. A sticker database that cannot be opened or a failed library
    /// scan is returned after a `CacheError` event has been emitted.
    pub fn rebuild_now(&mut self, kinds: CacheKinds) -> Result<()> {
        let Some(player) = self.partitions.first().map(|p| p.player.clone()) else {
            return Ok(());
        };
        self.ctx.build_flags.try_claim(kinds)?;

        let store = match &self.options.sticker_db {
            Some(path) if kinds.stickers => match SqliteStickerStore::open(path) {
                Ok(store) => Some(store),
                Err(e) => {
                    self.build_failed(kinds, &e);
                    return Err(e);
                }
            },
            _ => None,
        };
        let built = builder::build(
            &player,
            store.as_ref().map(|s| s as &dyn StickerStore),
            self.build_options(kinds),
        );
        match built {
            Ok(built) => {
                builder::publish(&self.ctx, built);
                self.drain(Timeout::NoWait);
                Ok(())
            }
            Err(e) => {
                self.build_failed(kinds, &e);
                Err(e)
            }
        }
    }

    fn build_failed(&self, kinds: CacheKinds, e: &Error) {
        error!("Cache build failed: {e}");
        self.notifier
            .emit(EventKind::CacheError, ALL_PARTITIONS, Some(&e.to_string()));
        for kind in kinds.iter() {
            self.ctx.build_flags.release(kind);
        }
    }

    fn build_options(&self, kinds: CacheKinds) -> BuildOptions {
        BuildOptions {
            page_size: self.options.page_size,
            kinds,
        }
    }

    /// Manual "add `count` now" through the partition's scratch queue
    pub fn fill(&mut self, partition: &str, count: usize, albums: bool) -> Result<usize> {
        let target = self
            .partitions
            .iter_mut()
            .find(|p| p.name() == partition)
            .ok_or_else(|| Error::UnknownPartition(partition.to_string()))?;
        let ctx = FillContext {
            player: &target.player,
            caches: &self.caches,
            history: &self.history,
            notifier: self.notifier.as_ref(),
            page_size: self.options.page_size,
            now: unix_now(),
        };
        target.jukebox.fill_manual(&ctx, count, albums)
    }
}

/// Whether the process recorded in `pid_file` is alive
pub fn is_daemon_running(pid_file: &Path) -> Result<bool> {
    let Some(pid) = read_pid(pid_file)? else {
        return Ok(false);
    };
    let alive = process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    Ok(alive)
}

pub fn write_pid_file(pid_file: &Path) -> Result<()> {
    if let Some(parent) = pid_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(pid_file, process::id().to_string())?;
    Ok(())
}

/// Send SIGTERM to the recorded daemon. Returns `false` if none was recorded.
pub fn stop_daemon(pid_file: &Path) -> Result<bool> {
    let Some(pid) = read_pid(pid_file)? else {
        return Ok(false);
    };
    let status = process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()?;
    if !status.success() {
        warn!("kill -TERM {pid} exited with {status}");
    }
    fs::remove_file(pid_file)?;
    info!("Daemon stopped (PID: {pid})");
    Ok(true)
}

fn read_pid(pid_file: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(pid_file) {
        Ok(content) => Ok(content.trim().parse().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
