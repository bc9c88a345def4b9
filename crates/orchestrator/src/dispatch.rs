#![forbid(unsafe_code)]

use crate::domain::{ScanEvent, ScanTask, WatchTarget};
use crate::observation::EventSink;
use crate::pool::{PoolHandle, TaskReport};
use crate::stats::PipelineStats;
use crate::stores::{Admission, InFlightSet, Release};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Turns notifications and startup walks into scan tasks, and releases
/// paths when their tasks report back.
///
/// Every task owns its path's in-flight slot from submission until the
/// supervisor has processed its completion, so at most one task per path is
/// ever queued or running.
#[derive(Debug)]
pub struct Dispatcher {
    pool: PoolHandle,
    in_flight: Arc<InFlightSet>,
    stats: Arc<PipelineStats>,
    excluded: Vec<PathBuf>,
    seq: AtomicU64,
}

impl Dispatcher {
    pub fn new(pool: PoolHandle, in_flight: Arc<InFlightSet>, stats: Arc<PipelineStats>) -> Self {
        Self {
            pool,
            in_flight,
            stats,
            excluded: Vec::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Never dispatch anything at or below `prefix`.
    pub fn exclude(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.excluded.push(prefix.into());
        self
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    pub fn queued(&self) -> usize {
        self.pool.queued()
    }

    /// A brand-new file is always scanned. When the path is already in
    /// flight the request is folded into a single follow-up scan.
    pub fn created(&self, path: PathBuf) {
        if !self.accepts(&path) {
            return;
        }
        match self.in_flight.acquire_or_defer(&path) {
            Admission::Acquired => {
                self.submit(path, ScanEvent::Created);
            }
            Admission::Deferred => {
                debug!(?path, "file created while in flight, follow-up scan scheduled");
            }
        }
    }

    pub fn modified(&self, path: PathBuf) {
        if !self.accepts(&path) {
            return;
        }
        if self.in_flight.try_acquire(&path) {
            self.submit(path, ScanEvent::Modified);
        } else {
            self.stats.record_dropped_modification();
            debug!(?path, "redundant modification dropped, scan already in flight");
        }
    }

    /// Walk every target and queue one `INITIAL_SCAN` per regular file.
    /// Blocking; run it off the async runtime. Returns the number queued.
    pub fn scan_all_existing(&self, targets: &[WatchTarget], cancel: &CancellationToken) -> usize {
        let mut queued = 0;
        for target in targets {
            let mut walker = WalkDir::new(&target.path);
            if !target.recursive {
                walker = walker.max_depth(1);
            }
            let entries = walker
                .into_iter()
                .filter_entry(|entry| !self.is_excluded(entry.path()));

            for entry in entries {
                if cancel.is_cancelled() {
                    info!(queued, "startup scan interrupted");
                    return queued;
                }
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(%err, "skipping unreadable entry during startup scan");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.into_path();
                if !self.in_flight.try_acquire(&path) {
                    trace!(?path, "already in flight, skipped by startup scan");
                    continue;
                }
                if self.submit(path, ScanEvent::InitialScan) {
                    queued += 1;
                }
            }
            debug!(target = ?target.path, queued, "startup scan walked target");
        }
        info!(queued, "startup scan queued");
        queued
    }

    /// Account for a finished task and give its path back.
    pub fn complete(&self, report: &TaskReport) {
        self.stats.record_outcome(&report.outcome);
        match self.in_flight.release(&report.path) {
            Release::Idle => trace!(seq = report.seq, path = ?report.path, "path released"),
            Release::Rescan => {
                if std::fs::symlink_metadata(&report.path).is_ok() {
                    debug!(path = ?report.path, "issuing follow-up scan");
                    self.submit(report.path.clone(), ScanEvent::Created);
                } else {
                    self.in_flight.remove(&report.path);
                    debug!(path = ?report.path, "follow-up scan skipped, file is gone");
                }
            }
            Release::NotHeld => {
                warn!(seq = report.seq, path = ?report.path, "completion for a path not in flight");
            }
        }
    }

    /// Consume completion reports until every worker has hung up.
    pub async fn supervise(self: Arc<Self>, mut completions: mpsc::UnboundedReceiver<TaskReport>) {
        while let Some(report) = completions.recv().await {
            self.complete(&report);
        }
        debug!("completion supervisor stopped");
    }

    /// Resolve once nothing is queued or running.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await;
    }

    fn submit(&self, path: PathBuf, event: ScanEvent) -> bool {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(seq, ?path, %event, "submitting scan task");
        match self.pool.submit(ScanTask::new(path, event, seq)) {
            Ok(()) => {
                self.stats.record_submitted();
                true
            }
            Err(task) => {
                self.in_flight.remove(&task.path);
                warn!(path = ?task.path, %event, "worker pool closed, scan task discarded");
                false
            }
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.is_excluded(path) {
            trace!(?path, "ignoring event inside excluded directory");
            return false;
        }
        !path.is_dir()
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|prefix| path.starts_with(prefix))
    }
}

impl EventSink for Dispatcher {
    fn on_created(&self, path: PathBuf) {
        self.created(path);
    }

    fn on_modified(&self, path: PathBuf) {
        self.modified(path);
    }
}
