//! Per-path write serialization.
//!
//! Modifications that target the same canonical path take the same mutex
//! for the whole read-resolve-write sequence; different paths never contend.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PathLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, path: &Path) -> Arc<Mutex<()>> {
        // Clone out of the map so the shard lock is released before blocking.
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Run `f` while holding the lock for `path`.
    ///
    /// The entry for `path` is dropped again once no other caller holds or
    /// waits on it, so the map only tracks paths with writes in flight.
    pub fn with_lock<R>(&self, path: &Path, f: impl FnOnce() -> R) -> R {
        let mutex = self.mutex_for(path);
        let result = {
            let _guard = mutex.lock();
            f()
        };
        drop(mutex);

        // Clones are only taken under the shard lock, so a count of one here
        // means nobody can be about to lock this mutex.
        self.locks
            .remove_if(path, |_, mutex| Arc::strong_count(mutex) == 1);
        result
    }

    /// Number of paths with a write in flight.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
