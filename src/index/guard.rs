//! Per-path in-flight guard.
//!
//! Reconciliation of one path is a read-modify-write over its photo row, so two
//! producers (a scan and a live notification) must never work on the same path
//! at once. Distinct paths proceed in parallel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    busy: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

/// Set of paths currently being reconciled. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct PathLocks {
    inner: Arc<Inner>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no one else holds `path`, then hold it until the guard drops.
    pub fn lock(&self, path: &Path) -> PathLock {
        let mut busy = self.busy();
        while busy.contains(path) {
            busy = self
                .inner
                .released
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
        busy.insert(path.to_path_buf());
        PathLock {
            inner: Arc::clone(&self.inner),
            path: path.to_path_buf(),
        }
    }

    fn busy(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.inner.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive claim on one path; released on drop.
pub struct PathLock {
    inner: Arc<Inner>,
    path: PathBuf,
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let mut busy = self.inner.busy.lock().unwrap_or_else(PoisonError::into_inner);
        busy.remove(&self.path);
        drop(busy);
        self.inner.released.notify_all();
    }
}
