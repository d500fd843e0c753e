//! Open indexes of the editor session, keyed by canonical project root

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zem_core::path_utils::canonicalize;
use zem_core::{Entry, Error, Index, IndexConfig, Result};

fn canonical_root(path: &Path) -> Result<PathBuf> {
    canonicalize(path).map_err(|_| Error::InvalidPath(path.to_path_buf()))
}

#[derive(Default)]
pub struct IndexRegistry {
    indexes: RwLock<AHashMap<PathBuf, Arc<Index>>>,
}

impl IndexRegistry {
    /// Open the index of `path` unless it is open already. The flag tells whether
    /// it was opened by this call.
    pub fn open(&self, path: &Path) -> Result<(Arc<Index>, bool)> {
        let root = canonical_root(path)?;
        if let Some(index) = self.indexes.read().get(&root) {
            return Ok((Arc::clone(index), false));
        }

        let mut indexes = self.indexes.write();
        // another caller may have opened it between the two locks
        if let Some(index) = indexes.get(&root) {
            return Ok((Arc::clone(index), false));
        }

        let config = IndexConfig::load(&root)?;
        let index = Arc::new(Index::open(&root, config)?);
        indexes.insert(root, Arc::clone(&index));
        Ok((index, true))
    }

    pub fn get(&self, path: &Path) -> Result<Arc<Index>> {
        let root = canonical_root(path)?;
        self.indexes
            .read()
            .get(&root)
            .cloned()
            .ok_or(Error::IndexNotOpen(root))
    }

    /// Stop and forget the index of `path`
    pub fn close(&self, path: &Path) -> Result<bool> {
        let root = canonical_root(path)?;
        let Some(index) = self.indexes.write().remove(&root) else {
            return Ok(false);
        };
        index.stop()?;
        ::tracing::info!(root = %root.display(), "Index closed");
        Ok(true)
    }

    pub fn close_all(&self) {
        let indexes: Vec<_> = self.indexes.write().drain().collect();
        for (root, index) in indexes {
            if let Err(e) = index.stop() {
                ::tracing::warn!(root = %root.display(), error = %e, "Failed to stop index");
            }
        }
    }

    pub fn open_indexes(&self) -> Vec<Arc<Index>> {
        self.indexes.read().values().cloned().collect()
    }
}

/// Latest asynchronous query per index. A newer fetch supersedes the older one,
/// whose result is then never delivered.
struct PendingFetch {
    ticket: u64,
    result: Option<std::result::Result<Vec<Entry>, String>>,
}

#[derive(Default)]
pub struct FetchSlots {
    slots: Mutex<AHashMap<PathBuf, PendingFetch>>,
}

pub enum FetchPoll {
    /// A newer fetch replaced this one, or the root never fetched
    Superseded,
    Pending,
    Ready(std::result::Result<Vec<Entry>, String>),
}

impl FetchSlots {
    pub fn begin(&self, root: &Path, ticket: u64) {
        self.slots.lock().insert(
            root.to_path_buf(),
            PendingFetch {
                ticket,
                result: None,
            },
        );
    }

    pub fn complete(&self, root: &Path, ticket: u64, result: Result<Vec<Entry>>) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(root)
            && slot.ticket == ticket
        {
            slot.result = Some(result.map_err(|e| e.to_string()));
        }
    }

    pub fn poll(&self, root: &Path, ticket: u64) -> FetchPoll {
        let mut slots = self.slots.lock();
        let ready = match slots.get(root) {
            Some(slot) if slot.ticket == ticket => slot.result.is_some(),
            _ => return FetchPoll::Superseded,
        };
        if !ready {
            return FetchPoll::Pending;
        }

        match slots.remove(root).and_then(|slot| slot.result) {
            Some(result) => FetchPoll::Ready(result),
            None => FetchPoll::Pending,
        }
    }

    pub fn forget(&self, root: &Path) {
        self.slots.lock().remove(root);
    }
}
