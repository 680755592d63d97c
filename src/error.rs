//! Error types shared by the cache builder, the jukebox and the player service.
//!
//! Errors fall into two families:
//!
//! - **Protocol** errors: a player or sticker-store call failed. They abort the
//!   current build or fill attempt and are retried only by the jukebox's outer
//!   retry loop.
//! - **Policy** errors: not enough candidates, no album cache, a build already
//!   running. They are reported to clients as events and never touch the
//!   state that was current before the call.
//!
//! Lock failures are not represented here. The work queue uses `parking_lot`
//! primitives, which do not poison.

use crate::cache::CacheKind;
use thiserror::Error;

/// Result type used across the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A music player command failed or returned something unparseable
    #[error("player command `{command}` failed: {message}")]
    Protocol { command: String, message: String },

    /// I/O on the play-history tail or the config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading the sticker database failed
    #[error("sticker database error: {0}")]
    Sticker(#[from] rusqlite::Error),

    /// Config file could not be parsed
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// A build of this cache kind is already in flight
    #[error("{0} cache build already in progress")]
    Busy(CacheKind),

    /// Album mode was requested before the album cache was built
    #[error("album cache is not available")]
    AlbumCacheMissing,

    /// A request named a partition this service does not manage
    #[error("unknown partition `{0}`")]
    UnknownPartition(String),

    /// The source yielded no acceptable candidate at all
    #[error("no songs or albums matched the jukebox constraints")]
    NoCandidates,

    /// Every attempt of the jukebox retry loop failed
    #[error("jukebox gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },
}

impl Error {
    pub(crate) fn protocol(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            command: command.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by policy rather than a broken player connection
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            Self::Busy(_)
                | Self::AlbumCacheMissing
                | Self::NoCandidates
                | Self::UnknownPartition(_)
        )
    }
}
