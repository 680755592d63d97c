//! Shared state created once at startup and handed around as `Arc<Context>`.

use crate::cache::{AlbumIndex, BuildFlags, CacheKind, CacheKinds, StickerIndex};
use crate::work_queue::{Message, Timeout, WorkQueue};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};

/// Requests handled by the player thread
#[derive(Debug)]
pub enum Command {
    /// Rebuild the given caches in the background
    BuildCache { kinds: CacheKinds },
    /// A finished album index, or `None` when the build failed
    AlbumsBuilt(Option<AlbumIndex>),
    /// A finished sticker index, or `None` when the build failed
    StickersBuilt(Option<StickerIndex>),
    /// Add `count` random tracks (or albums) to a partition right now
    FillJukebox {
        partition: String,
        count: usize,
        albums: bool,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildCache { .. } => "build_cache",
            Self::AlbumsBuilt(_) => "albums_built",
            Self::StickersBuilt(_) => "stickers_built",
            Self::FillJukebox { .. } => "fill_jukebox",
        }
    }
}

/// Answers posted on the response queue under the request's correlation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Accepted,
    Busy(CacheKind),
    Filled { partition: String, added: usize },
    Failed(String),
}

pub struct Context {
    pub inbox: WorkQueue<Command>,
    pub responses: WorkQueue<Reply>,
    pub build_flags: BuildFlags,
    shutdown: AtomicBool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            inbox: WorkQueue::new("inbox"),
            responses: WorkQueue::new("responses"),
            build_flags: BuildFlags::default(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Post a request for the player thread; `id` 0 means no reply is wanted
    pub fn request(&self, id: u64, command: Command) {
        self.inbox.push(Message::new(id, command));
    }

    pub fn reply(&self, id: u64, reply: Reply) {
        self.responses.push(Message::new(id, reply));
    }

    pub fn wait_reply(&self, id: u64, timeout: Timeout) -> Option<Reply> {
        self.responses.pop(timeout, id).map(Message::into_payload)
    }

    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            info!("Shutting down");
        }
        self.inbox.shutdown();
        self.responses.shutdown();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
