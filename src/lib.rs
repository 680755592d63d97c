//! Keeps an MPD queue playing.
//!
//! `jukeboxd` watches one or more MPD partitions. When a partition's queue
//! runs low it adds random songs or whole albums, skipping anything played
//! recently, anything already queued and, optionally, anything hated.
//!
//! Core modules:
//! - [`work_queue`] - Blocking message queue with correlation ids
//! - [`cache`] - Album and sticker indexes, their builder and the swap into service
//! - [`jukebox`] - Reservoir sampling and the auto-fill state machine
//! - [`history`] - Append-only play-history tail
//! - [`daemon`] - The player service loop and PID file helpers
//!
//! ### Supporting Modules
//!
//! - [`player`] - The [`player::MusicPlayer`] trait and status types
//! - [`mpd_client`] - [`player::MusicPlayer`] over the `mpc` command-line client
//! - [`mpd_config`] - Finding MPD's sticker database through `mpd.conf`
//! - [`sticker`] - Reading MPD's sticker database
//! - [`events`] - Client-facing notifications
//! - [`context`] - Requests, replies and the shared queues
//! - [`config`] - Configuration and data directory management
//! - [`cli`] - Command-line interface definitions
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use jukeboxd::config::Config;
//! use jukeboxd::context::Context;
//! use jukeboxd::daemon::{Partition, PlayerService};
//! use jukeboxd::events::LogNotifier;
//! use jukeboxd::history::PlayHistory;
//! use jukeboxd::mpd_client::MpcClient;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let partitions = vec![Partition::new(
//!     "default",
//!     MpcClient::new(),
//!     config.partitions[0].jukebox.clone(),
//! )];
//! let mut service = PlayerService::new(
//!     Arc::new(Context::new()),
//!     partitions,
//!     PlayHistory::new("/tmp/jukeboxd-history"),
//!     Arc::new(LogNotifier),
//!     config.service_options(None),
//! );
//! service.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod cli;
pub mod completion;
pub mod config;
pub mod context;
pub mod daemon;
pub mod error;
pub mod events;
pub mod history;
pub mod jukebox;
pub mod mpd_client;
pub mod mpd_config;
pub mod player;
pub mod sticker;
pub mod work_queue;

pub use error::{Error, Result};
