//! Background cache builds.
//!
//! One paged scan of the whole database feeds both indexes. Stickers are
//! reserved per URI during the scan and filled from the sticker store in a
//! second pass. Any error drops everything built so far; a partial index is
//! never published.

use super::{AlbumIndex, CacheKinds, StickerIndex};
use crate::context::{Command, Context};
use crate::error::Result;
use crate::events::{EventKind, Notifier, ALL_PARTITIONS};
use crate::player::{scan_pages, MusicPlayer};
use crate::sticker::{SqliteStickerStore, StickerStore};
use crate::work_queue::Message;
use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// MPD refuses larger result windows
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub page_size: usize,
    pub kinds: CacheKinds,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            kinds: CacheKinds::ALL,
        }
    }
}

#[derive(Debug, Default)]
pub struct BuiltCaches {
    pub albums: Option<AlbumIndex>,
    pub stickers: Option<StickerIndex>,
}

/// Scan the player's database and build the requested indexes.
///
/// Without a sticker store the sticker index keeps its default records.
///
/// # Errors
///
/// Any page the player fails to list, or a sticker lookup the store fails,
/// aborts the whole build; no partial indexes are returned.
pub fn build<P: MusicPlayer + ?Sized>(
    player: &P,
    store: Option<&dyn StickerStore>,
    options: BuildOptions,
) -> Result<BuiltCaches> {
    let started = Instant::now();
    let mut albums = options.kinds.albums.then(AlbumIndex::default);
    let mut stickers = options.kinds.stickers.then(StickerIndex::default);

    let scanned = scan_pages(
        options.page_size,
        |offset, limit| player.search_page(offset, limit),
        |song| {
            if let Some(albums) = albums.as_mut() {
                albums.insert_song(&song);
            }
            if let Some(stickers) = stickers.as_mut() {
                stickers.reserve(&song.uri);
            }
        },
    )?;
    debug!("Scanned {scanned} songs");

    if let (Some(stickers), Some(store)) = (stickers.as_mut(), store) {
        stickers.fill_from(store)?;
    }

    if let Some(albums) = &albums {
        info!(
            "Album cache built: {} albums ({} songs skipped) in {:.2?}",
            albums.len(),
            albums.skipped(),
            started.elapsed()
        );
    }
    if let Some(stickers) = &stickers {
        info!(
            "Sticker cache built: {} songs in {:.2?}",
            stickers.len(),
            started.elapsed()
        );
    }
    Ok(BuiltCaches { albums, stickers })
}

/// Hand the finished indexes to the owning thread, one message per index
pub fn publish(ctx: &Context, built: BuiltCaches) {
    if let Some(albums) = built.albums {
        ctx.inbox
            .push(Message::broadcast(Command::AlbumsBuilt(Some(albums))));
    }
    if let Some(stickers) = built.stickers {
        ctx.inbox
            .push(Message::broadcast(Command::StickersBuilt(Some(stickers))));
    }
}

/// Run a build on its own thread.
///
/// The caller must already hold the build flags for `options.kinds`. On
/// success they stay claimed until the owning thread installs the result; on
/// failure they are released here and a `cache_error` event is emitted.
pub fn spawn_build<P>(
    ctx: Arc<Context>,
    player: P,
    sticker_db: Option<PathBuf>,
    options: BuildOptions,
    notifier: Arc<dyn Notifier>,
) -> thread::JoinHandle<()>
where
    P: MusicPlayer + Send + 'static,
{
    thread::spawn(move || {
        let result = open_store(sticker_db.as_ref(), options.kinds).and_then(|store| {
            build(
                &player,
                store.as_ref().map(|s| s as &dyn StickerStore),
                options,
            )
        });

        match result {
            Ok(built) if ctx.is_shutting_down() => {
                debug!("Discarding finished cache build, shutting down");
                drop(built);
                release_all(&ctx, options.kinds);
            }
            Ok(built) => publish(&ctx, built),
            Err(e) => {
                error!("Cache build failed: {e}");
                notifier.emit(EventKind::CacheError, ALL_PARTITIONS, Some(&e.to_string()));
                release_all(&ctx, options.kinds);
            }
        }
    })
}

fn open_store(
    path: Option<&PathBuf>,
    kinds: CacheKinds,
) -> Result<Option<SqliteStickerStore>> {
    match path {
        Some(path) if kinds.stickers => Ok(Some(SqliteStickerStore::open(path)?)),
        _ => Ok(None),
    }
}

fn release_all(ctx: &Context, kinds: CacheKinds) {
    for kind in kinds.iter() {
        ctx.build_flags.release(kind);
    }
}
