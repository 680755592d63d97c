//! Installing a freshly built snapshot on the owning thread.
//!
//! The order is fixed: invalidate every dependent, replace the current
//! snapshot, drop the old one, then tell clients. Everything happens on the
//! thread that owns [`Caches`], so no reader can see an intermediate state.

use super::{AlbumIndex, CacheKind, Caches, StickerIndex};
use crate::events::{EventKind, Notifier, ALL_PARTITIONS};
use log::{error, info};

/// State derived from a snapshot that must be discarded before it is replaced
pub trait CacheDependent {
    fn invalidate(&mut self);
}

#[derive(Debug)]
pub enum Snapshot {
    Albums(AlbumIndex),
    Stickers(StickerIndex),
}

impl Snapshot {
    pub fn kind(&self) -> CacheKind {
        match self {
            Self::Albums(_) => CacheKind::Albums,
            Self::Stickers(_) => CacheKind::Stickers,
        }
    }
}

/// Install `snapshot` as the current `kind` cache.
///
/// `None` means the build failed upstream: an error event is emitted and the
/// current snapshot is left untouched. Returns whether a snapshot was
/// installed. Releasing the build flag is up to the caller.
pub fn install<'a, J, I>(
    caches: &mut Caches,
    kind: CacheKind,
    snapshot: Option<Snapshot>,
    dependents: I,
    notifier: &dyn Notifier,
) -> bool
where
    J: CacheDependent + 'a,
    I: IntoIterator<Item = &'a mut J>,
{
    let Some(snapshot) = snapshot else {
        error!("Received an empty {kind} cache, keeping the current one");
        notifier.emit(
            EventKind::CacheError,
            ALL_PARTITIONS,
            Some(&format!("{kind} cache build failed")),
        );
        return false;
    };
    debug_assert_eq!(snapshot.kind(), kind);

    // Jukebox queues are cleared for either kind.
    for dependent in dependents {
        dependent.invalidate();
    }

    let (old_len, new_len, event) = match snapshot {
        Snapshot::Albums(index) => {
            let new_len = index.len();
            let old = caches.albums.replace(index);
            (old.map_or(0, |old| old.len()), new_len, EventKind::UpdateAlbumCache)
        }
        Snapshot::Stickers(index) => {
            let new_len = index.len();
            let old = caches.stickers.replace(index);
            (old.map_or(0, |old| old.len()), new_len, EventKind::UpdateStickerCache)
        }
    };
    info!("Installed {kind} cache: {old_len} -> {new_len} entries");

    notifier.emit(event, ALL_PARTITIONS, None);
    true
}
