//! # MPD configuration lookup
//!
//! Finds MPD's `sticker_file` so the cache builder can read stickers straight
//! from MPD's SQLite database instead of asking for them one song at a time.

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Places MPD reads its configuration from, most specific first
pub fn config_candidates() -> Vec<PathBuf> {
    [
        dirs::config_dir().map(|p| p.join("mpd").join("mpd.conf")),
        dirs::home_dir().map(|p| p.join(".config").join("mpd").join("mpd.conf")),
        dirs::home_dir().map(|p| p.join(".mpdconf")),
        Some(PathBuf::from("/etc/mpd.conf")),
        Some(PathBuf::from("/usr/local/etc/mpd.conf")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Locate the sticker database configured in the first readable `mpd.conf`
pub fn find_sticker_file() -> Option<PathBuf> {
    find_setting_path(&config_candidates(), "sticker_file")
}

/// First existing file named by `key` in any of `configs`
pub fn find_setting_path(configs: &[PathBuf], key: &str) -> Option<PathBuf> {
    for config in configs {
        let Ok(content) = fs::read_to_string(config) else {
            continue;
        };
        debug!("Looking for {key} in {}", config.display());
        let Some(path) = parse_setting(&content, key) else {
            continue;
        };
        if path.is_file() {
            return Some(path);
        }
        warn!(
            "{key} in {} points to a missing file: {}",
            config.display(),
            path.display()
        );
    }
    None
}

/// Value of a top-level `key "value"` line, with `~` expanded
pub fn parse_setting(content: &str, key: &str) -> Option<PathBuf> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let rest = line.strip_prefix(key)?;
            if !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let value = rest.trim().trim_matches('"').trim_matches('\'');
            (!value.is_empty()).then(|| expand_home(value))
        })
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        _ => Path::new(path).to_path_buf(),
    }
}
