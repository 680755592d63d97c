//! # Configuration
//!
//! Settings live in a JSON file, `config.json` in the platform data directory
//! unless `--config` / `JUKEBOXD_CONFIG` points elsewhere:
//!
//! - Linux: `~/.local/share/jukeboxd/config.json`
//! - macOS: `~/Library/Application Support/jukeboxd/config.json`
//! - Windows: `%APPDATA%\jukeboxd\config.json`
//!
//! A missing file means defaults; every field is optional.
//!
//! ```json
//! {
//!   "poll_interval_ms": 1000,
//!   "partitions": [
//!     { "name": "default", "jukebox": { "mode": "add_tracks", "queue_length": 10 } }
//!   ]
//! }
//! ```

use crate::cache::builder::DEFAULT_PAGE_SIZE;
use crate::cache::CacheKinds;
use crate::daemon::ServiceOptions;
use crate::error::{Error, Result};
use crate::history::{DEFAULT_MAX_ENTRIES, DEFAULT_ROTATE_SIZE};
use crate::jukebox::JukeboxSettings;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns the platform-appropriate data directory, creating it if needed
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "could not determine the system data directory",
        )
    })?;
    let dir = data_dir.join("jukeboxd");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.json"))
}

/// PID file of the background service
pub fn pid_file_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("jukeboxd.pid"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub name: String,
    /// mpc `--host`; unset uses `MPD_HOST` or localhost
    pub host: Option<String>,
    pub port: Option<u16>,
    pub jukebox: JukeboxSettings,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            host: None,
            port: None,
            jukebox: JukeboxSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_ms: u64,
    pub cache_page_size: usize,
    pub response_max_age_secs: u64,
    /// Build the album cache at startup
    pub albums_cache: bool,
    /// Build the sticker cache at startup
    pub stickers_cache: bool,
    /// MPD's sticker database; found through `mpd.conf` when unset
    pub sticker_db: Option<PathBuf>,
    /// Play-history tail; `history` in the data directory when unset
    pub history_file: Option<PathBuf>,
    pub history_rotate_size: usize,
    pub history_max_entries: usize,
    /// Print client notifications as JSON-RPC lines on stdout instead of logging them
    pub json_events: bool,
    pub partitions: Vec<PartitionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            cache_page_size: DEFAULT_PAGE_SIZE,
            response_max_age_secs: 60,
            albums_cache: true,
            stickers_cache: true,
            sticker_db: None,
            history_file: None,
            history_rotate_size: DEFAULT_ROTATE_SIZE,
            history_max_entries: DEFAULT_MAX_ENTRIES,
            json_events: false,
            partitions: vec![PartitionConfig::default()],
        }
    }
}

impl Config {
    /// Read `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                debug!("Loading config from {}", path.display());
                Ok(serde_json::from_str(&content)?)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn cache_kinds(&self) -> CacheKinds {
        CacheKinds {
            albums: self.albums_cache,
            stickers: self.stickers_cache,
        }
    }

    /// Service options; `sticker_db` is the resolved sticker database path
    pub fn service_options(&self, sticker_db: Option<PathBuf>) -> ServiceOptions {
        ServiceOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
            page_size: self.cache_page_size.max(1),
            response_max_age: Duration::from_secs(self.response_max_age_secs),
            sticker_db,
            cache_kinds: self.cache_kinds(),
        }
    }

    pub fn history_path(&self, data_dir: &Path) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| data_dir.join("history"))
    }
}
