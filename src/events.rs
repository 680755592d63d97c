//! Client notifications.
//!
//! The core only picks an [`EventKind`], a partition and an optional message;
//! how a notification reaches web clients is up to the [`Notifier`].

use log::{error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::io::Write;

/// Partition name used for events that concern every partition (cache updates)
pub const ALL_PARTITIONS: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UpdateAlbumCache,
    UpdateStickerCache,
    UpdateJukebox,
    JukeboxWarning,
    JukeboxError,
    CacheError,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpdateAlbumCache => "update_album_cache",
            Self::UpdateStickerCache => "update_sticker_cache",
            Self::UpdateJukebox => "update_jukebox",
            Self::JukeboxWarning => "jukebox_warning",
            Self::JukeboxError => "jukebox_error",
            Self::CacheError => "cache_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: EventKind,
    pub partition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn emit(&self, kind: EventKind, partition: &str, message: Option<&str>);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn emit(&self, kind: EventKind, partition: &str, message: Option<&str>) {
        let message = message.unwrap_or("");
        match kind {
            EventKind::JukeboxWarning => warn!("[{partition}] {}: {message}", kind.as_str()),
            EventKind::JukeboxError | EventKind::CacheError => {
                error!("[{partition}] {}: {message}", kind.as_str())
            }
            _ => info!("[{partition}] {} {message}", kind.as_str()),
        }
    }
}

/// Writes one JSON-RPC notification object per line
pub struct JsonNotifier<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonNotifier<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> Notifier for JsonNotifier<W> {
    fn emit(&self, kind: EventKind, partition: &str, message: Option<&str>) {
        let line = json!({
            "jsonrpc": "2.0",
            "method": kind.as_str(),
            "params": {
                "partition": partition,
                "message": message,
            }
        });
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            warn!("Failed to write {} notification: {e}", kind.as_str());
        }
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|event| event.kind == kind).count()
    }
}

impl Notifier for MemoryNotifier {
    fn emit(&self, kind: EventKind, partition: &str, message: Option<&str>) {
        self.events.lock().push(Notification {
            kind,
            partition: partition.to_string(),
            message: message.map(str::to_string),
        });
    }
}
