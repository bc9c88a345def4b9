#![forbid(unsafe_code)]

mod worker;

pub use worker::WorkerContext;

use crate::domain::{QuarantineRecord, ScanEvent, ScanFailure, ScanTask};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Clean,
    Quarantined(QuarantineRecord),
    ScanFailed(ScanFailure),
    Panicked,
}

/// Completion message a worker sends once scan and quarantine are both done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub seq: u64,
    pub path: PathBuf,
    pub event: ScanEvent,
    pub outcome: TaskOutcome,
}

/// Fixed number of workers draining one unbounded queue.
#[derive(Debug)]
pub struct WorkerPool {
    tasks: flume::Sender<ScanTask>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

/// Cheap submission side of a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolHandle {
    tasks: flume::Sender<ScanTask>,
}

impl PoolHandle {
    /// Queue a task without waiting for it. Hands the task back when the
    /// pool is gone.
    pub fn submit(&self, task: ScanTask) -> Result<(), ScanTask> {
        self.tasks.send(task).map_err(|err| err.into_inner())
    }

    pub fn queued(&self) -> usize {
        self.tasks.len()
    }

    /// A handle with no workers behind it; tests read the queue directly.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, flume::Receiver<ScanTask>) {
        let (tx, rx) = flume::unbounded();
        (Self { tasks: tx }, rx)
    }
}

impl WorkerPool {
    pub fn spawn(
        size: usize,
        context: Arc<WorkerContext>,
        completions: mpsc::UnboundedSender<TaskReport>,
    ) -> Self {
        let size = size.max(1);
        let (tx, rx) = flume::unbounded();
        let cancel = CancellationToken::new();
        let workers = (0..size)
            .map(|id| {
                tokio::spawn(worker::run_worker(
                    id,
                    rx.clone(),
                    context.clone(),
                    completions.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        info!(size, "worker pool started");
        Self {
            tasks: tx,
            workers,
            cancel,
        }
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            tasks: self.tasks.clone(),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop the workers once they are between tasks and wait for them. A
    /// task already running is never interrupted; callers that need the
    /// queue drained wait for it to empty first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.tasks);
        for handle in self.workers {
            if let Err(err) = handle.await {
                warn!(%err, "scan worker exited abnormally");
            }
        }
        info!("worker pool stopped");
    }
}
