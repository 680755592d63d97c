//! Per-song stickers: play/skip counters, like value and timestamps.
//!
//! MPD keeps stickers in an SQLite file (`sticker_file` in `mpd.conf`) with a
//! single table `sticker(type, uri, name, value)`. [`SqliteStickerStore`] reads
//! that file directly, which is far cheaper than one protocol round trip per
//! song during a cache build.

use crate::error::Result;
use log::trace;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;

/// Like sticker value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Like {
    Hate,
    #[default]
    Neutral,
    Love,
}

impl Like {
    fn from_value(value: i64) -> Self {
        match value {
            0 => Self::Hate,
            2 => Self::Love,
            _ => Self::Neutral,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sticker {
    pub play_count: u32,
    pub skip_count: u32,
    pub like: Like,
    /// Unix time, 0 = never
    pub last_played: i64,
    /// Unix time, 0 = never
    pub last_skipped: i64,
    /// Resume position in seconds
    pub elapsed: u32,
}

impl Sticker {
    /// Apply one named sticker value; unknown names and bad numbers are ignored.
    pub fn apply(&mut self, name: &str, value: &str) {
        let value = value.trim();
        match name {
            "playCount" => self.play_count = value.parse().unwrap_or(self.play_count),
            "skipCount" => self.skip_count = value.parse().unwrap_or(self.skip_count),
            "like" => {
                if let Ok(like) = value.parse() {
                    self.like = Like::from_value(like);
                }
            }
            "lastPlayed" => self.last_played = value.parse().unwrap_or(self.last_played),
            "lastSkipped" => self.last_skipped = value.parse().unwrap_or(self.last_skipped),
            "elapsed" => self.elapsed = value.parse().unwrap_or(self.elapsed),
            _ => trace!("Ignoring unknown sticker `{name}`"),
        }
    }
}

/// Source of sticker values during the second cache-build pass
pub trait StickerStore {
    /// Stickers of one song, `None` if the song has none
    fn stickers(&self, uri: &str) -> Result<Option<Sticker>>;
}

impl StickerStore for HashMap<String, Sticker> {
    fn stickers(&self, uri: &str) -> Result<Option<Sticker>> {
        Ok(self.get(uri).cloned())
    }
}

/// Read-only view of MPD's sticker database
#[derive(Debug)]
pub struct SqliteStickerStore {
    conn: Connection,
}

impl SqliteStickerStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

impl StickerStore for SqliteStickerStore {
    fn stickers(&self, uri: &str) -> Result<Option<Sticker>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT name, value FROM sticker WHERE type = 'song' AND uri = ?1")?;
        let rows = stmt.query_map([uri], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut sticker: Option<Sticker> = None;
        for row in rows {
            let (name, value) = row?;
            sticker.get_or_insert_with(Sticker::default).apply(&name, &value);
        }
        Ok(sticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_sticker_db() -> Result<SqliteStickerStore> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE sticker (
                type  VARCHAR NOT NULL,
                uri   VARCHAR NOT NULL,
                name  VARCHAR NOT NULL,
                value VARCHAR NOT NULL
            )",
            [],
        )?;
        for (uri, name, value) in [
            ("rock/song1.flac", "playCount", "12"),
            ("rock/song1.flac", "like", "2"),
            ("rock/song1.flac", "lastPlayed", "1700000000"),
            ("rock/song2.flac", "skipCount", "3"),
            ("rock/song2.flac", "like", "0"),
            ("rock/song2.flac", "rating", "7"),
        ] {
            conn.execute(
                "INSERT INTO sticker (type, uri, name, value) VALUES ('song', ?1, ?2, ?3)",
                [uri, name, value],
            )?;
        }
        Ok(SqliteStickerStore::from_connection(conn))
    }

    #[test]
    fn test_sqlite_store_reads_named_values() -> Result<()> {
        let store = create_sticker_db()?;

        let first = store.stickers("rock/song1.flac")?.expect("song1 has stickers");
        assert_eq!(first.play_count, 12);
        assert_eq!(first.like, Like::Love);
        assert_eq!(first.last_played, 1_700_000_000);
        assert_eq!(first.skip_count, 0);

        let second = store.stickers("rock/song2.flac")?.expect("song2 has stickers");
        assert_eq!(second.skip_count, 3);
        assert_eq!(second.like, Like::Hate);
        Ok(())
    }

    #[test]
    fn test_sqlite_store_missing_song() -> Result<()> {
        let store = create_sticker_db()?;
        assert!(store.stickers("jazz/none.flac")?.is_none());
        Ok(())
    }

    #[test]
    fn test_apply_ignores_garbage() {
        let mut sticker = Sticker::default();
        sticker.apply("playCount", "lots");
        sticker.apply("like", "9");
        sticker.apply("elapsed", " 42 ");
        assert_eq!(sticker.play_count, 0);
        assert_eq!(sticker.like, Like::Neutral);
        assert_eq!(sticker.elapsed, 42);
    }
}
