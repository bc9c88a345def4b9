#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::domain::{ScanTask, ScanVerdict};
use crate::pool::{TaskOutcome, TaskReport};
use crate::quarantine::Quarantine;
use crate::scan::ScanClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a worker needs to carry a task from scan to quarantine.
pub struct WorkerContext {
    pub scanner: Arc<dyn ScanClient>,
    pub quarantine: Arc<dyn Quarantine>,
    pub clock: Arc<dyn Clock>,
    pub settle_delay: Duration,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_worker(
    id: usize,
    tasks: flume::Receiver<ScanTask>,
    context: Arc<WorkerContext>,
    completions: mpsc::UnboundedSender<TaskReport>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "scan worker started");
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = tasks.recv_async() => match task {
                Ok(task) => task,
                Err(_) => break,
            },
        };

        let report = execute(context.clone(), task).await;
        if completions.send(report).is_err() {
            warn!(worker = id, "completion channel closed");
        }
    }
    debug!(worker = id, "scan worker stopped");
}

/// Run one task on its own tokio task so a panic inside the scan or the
/// quarantine is contained and still produces a completion.
async fn execute(context: Arc<WorkerContext>, task: ScanTask) -> TaskReport {
    let ScanTask { path, event, seq } = task.clone();
    let outcome = match tokio::spawn(process(context, task)).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(seq, ?path, %event, %err, "scan task crashed");
            TaskOutcome::Panicked
        }
    };
    TaskReport {
        seq,
        path,
        event,
        outcome,
    }
}

async fn process(context: Arc<WorkerContext>, task: ScanTask) -> TaskOutcome {
    if task.event.is_live() {
        context.clock.sleep(context.settle_delay).await;
    }

    debug!(seq = task.seq, path = ?task.path, event = %task.event, "scanning file");
    match context.scanner.scan(&task.path).await {
        ScanVerdict::Clean => {
            info!(seq = task.seq, path = ?task.path, event = %task.event, "file is clean");
            TaskOutcome::Clean
        }
        ScanVerdict::Infected(signature) => {
            warn!(
                seq = task.seq,
                path = ?task.path,
                event = %task.event,
                signature,
                "threat detected"
            );
            let record = context.quarantine.isolate(&task.path, &signature).await;
            TaskOutcome::Quarantined(record)
        }
        ScanVerdict::Error(failure) => {
            warn!(
                seq = task.seq,
                path = ?task.path,
                event = %task.event,
                %failure,
                "scan failed"
            );
            TaskOutcome::ScanFailed(failure)
        }
    }
}
