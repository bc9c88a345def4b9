#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// Result of offering a `CREATED` notification to the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The path was idle and is now owned by the caller.
    Acquired,
    /// The path is busy; one follow-up scan will be issued on completion.
    Deferred,
}

/// Result of releasing a path after its task completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The path is idle again.
    Idle,
    /// A follow-up scan was requested meanwhile; the caller still owns the
    /// path and must submit it.
    Rescan,
    /// The path was not in flight.
    NotHeld,
}

/// Paths owned by a queued or running scan task. Every operation is a single
/// critical section, so check-and-mark is atomic with respect to concurrent
/// notifications.
#[derive(Debug)]
pub struct InFlightSet {
    /// path -> follow-up scan requested
    paths: Mutex<HashMap<PathBuf, bool>>,
    len: watch::Sender<usize>,
}

impl Default for InFlightSet {
    fn default() -> Self {
        Self {
            paths: Mutex::new(HashMap::new()),
            len: watch::Sender::new(0),
        }
    }
}

impl InFlightSet {
    /// Mark `path` in flight unless it already is.
    pub fn try_acquire(&self, path: &Path) -> bool {
        let mut paths = self.lock();
        if paths.contains_key(path) {
            return false;
        }
        paths.insert(path.to_path_buf(), false);
        self.len.send_replace(paths.len());
        true
    }

    pub fn acquire_or_defer(&self, path: &Path) -> Admission {
        let mut paths = self.lock();
        match paths.get_mut(path) {
            Some(rescan) => {
                *rescan = true;
                Admission::Deferred
            }
            None => {
                paths.insert(path.to_path_buf(), false);
                self.len.send_replace(paths.len());
                Admission::Acquired
            }
        }
    }

    /// Release `path` after its task completed. Idempotent.
    pub fn release(&self, path: &Path) -> Release {
        let mut paths = self.lock();
        match paths.get_mut(path) {
            Some(rescan) if *rescan => {
                *rescan = false;
                Release::Rescan
            }
            Some(_) => {
                paths.remove(path);
                self.len.send_replace(paths.len());
                Release::Idle
            }
            None => Release::NotHeld,
        }
    }

    /// Drop `path` regardless of pending follow-ups.
    pub fn remove(&self, path: &Path) -> bool {
        let mut paths = self.lock();
        let removed = paths.remove(path).is_some();
        if removed {
            self.len.send_replace(paths.len());
        }
        removed
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve once no path is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.len.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|len| *len == 0).await;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, bool>> {
        match self.paths.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
