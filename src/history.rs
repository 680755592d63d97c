//! Play-history log.
//!
//! Recent plays are kept in memory, newest first, and merged into an on-disk
//! tail once the in-memory list grows past `rotate_size`. The tail holds one
//! `<unix-timestamp>::<uri>` line per entry, newest first, bounded to
//! `max_entries`, and is always replaced through a temp file rename.

use crate::error::Result;
use log::{debug, warn};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DEFAULT_ROTATE_SIZE: usize = 20;
pub const DEFAULT_MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub uri: String,
}

impl HistoryEntry {
    pub fn new(timestamp: i64, uri: impl Into<String>) -> Self {
        Self {
            timestamp,
            uri: uri.into(),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let (timestamp, uri) = line.split_once("::")?;
        let timestamp = timestamp.trim().parse().ok()?;
        if uri.is_empty() {
            return None;
        }
        Some(Self::new(timestamp, uri))
    }

    pub fn to_line(&self) -> String {
        format!("{}::{}", self.timestamp, self.uri)
    }
}

#[derive(Debug)]
pub struct PlayHistory {
    path: PathBuf,
    recent: VecDeque<HistoryEntry>,
    rotate_size: usize,
    max_entries: usize,
}

impl PlayHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_limits(path, DEFAULT_ROTATE_SIZE, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits(path: impl Into<PathBuf>, rotate_size: usize, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            recent: VecDeque::new(),
            rotate_size,
            max_entries: max_entries.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember a play; rotates to disk once the in-memory list is too long
    pub fn record(&mut self, uri: &str, timestamp: i64) -> Result<()> {
        self.recent.push_front(HistoryEntry::new(timestamp, uri));
        if self.recent.len() > self.rotate_size {
            self.rotate()?;
        }
        Ok(())
    }

    /// Prepend the in-memory entries to the tail file and clear them
    pub fn rotate(&mut self) -> Result<()> {
        if self.recent.is_empty() {
            return Ok(());
        }
        let mut merged: Vec<HistoryEntry> = self.recent.iter().cloned().collect();
        merged.extend(self.read_tail()?);
        merged.truncate(self.max_entries);

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        for entry in &merged {
            writeln!(tmp, "{}", entry.to_line())?;
        }
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(
            "Rotated {} history entries into {} ({} kept)",
            self.recent.len(),
            self.path.display(),
            merged.len()
        );
        self.recent.clear();
        Ok(())
    }

    /// Write anything still in memory to disk
    pub fn flush(&mut self) -> Result<()> {
        self.rotate()
    }

    /// Every known entry, newest first
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self.recent.iter().cloned().collect();
        entries.extend(self.read_tail()?);
        Ok(entries)
    }

    /// URIs played at or after `since`
    pub fn recent_uris(&self, since: i64) -> Result<HashSet<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|entry| entry.timestamp >= since)
            .map(|entry| entry.uri)
            .collect())
    }

    pub fn in_memory(&self) -> usize {
        self.recent.len()
    }

    fn read_tail(&self) -> Result<Vec<HistoryEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let entry = HistoryEntry::parse(line);
                if entry.is_none() {
                    warn!("Skipping malformed history line: {line}");
                }
                entry
            })
            .collect())
    }
}
