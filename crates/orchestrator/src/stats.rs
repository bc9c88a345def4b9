#![forbid(unsafe_code)]

use crate::pool::TaskOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for the scan pipeline, shared by the dispatcher and the
/// workers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    clean: AtomicU64,
    infected: AtomicU64,
    scan_errors: AtomicU64,
    isolated: AtomicU64,
    isolation_failures: AtomicU64,
    dropped_modifications: AtomicU64,
    worker_panics: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub clean: u64,
    pub infected: u64,
    pub scan_errors: u64,
    pub isolated: u64,
    pub isolation_failures: u64,
    pub dropped_modifications: u64,
    pub worker_panics: u64,
}

impl PipelineStats {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_modification(&self) {
        self.dropped_modifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &TaskOutcome) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            TaskOutcome::Clean => {
                self.clean.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Quarantined(record) => {
                self.infected.fetch_add(1, Ordering::Relaxed);
                if record.is_isolated() {
                    self.isolated.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.isolation_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            TaskOutcome::ScanFailed(_) => {
                self.scan_errors.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Panicked => {
                self.worker_panics.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            clean: self.clean.load(Ordering::Relaxed),
            infected: self.infected.load(Ordering::Relaxed),
            scan_errors: self.scan_errors.load(Ordering::Relaxed),
            isolated: self.isolated.load(Ordering::Relaxed),
            isolation_failures: self.isolation_failures.load(Ordering::Relaxed),
            dropped_modifications: self.dropped_modifications.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DirectoryState, IsolationOutcome, QuarantineRecord, ScanFailure};

    fn record(outcome: IsolationOutcome) -> QuarantineRecord {
        QuarantineRecord {
            original: "/w/x".into(),
            destination: "/q/x.infected".into(),
            signature: "Eicar-Test-Signature".into(),
            outcome,
            attempts: 1,
            directory: DirectoryState::Existing,
            note: None,
        }
    }

    #[test]
    fn outcomes_land_in_their_counters() {
        let stats = PipelineStats::default();
        stats.record_submitted();
        stats.record_dropped_modification();
        stats.record_outcome(&TaskOutcome::Clean);
        stats.record_outcome(&TaskOutcome::Quarantined(record(IsolationOutcome::Isolated)));
        stats.record_outcome(&TaskOutcome::Quarantined(record(
            IsolationOutcome::FailedAfterRetries,
        )));
        stats.record_outcome(&TaskOutcome::ScanFailed(ScanFailure::Timeout));
        stats.record_outcome(&TaskOutcome::Panicked);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                submitted: 1,
                completed: 5,
                clean: 1,
                infected: 2,
                scan_errors: 1,
                isolated: 1,
                isolation_failures: 1,
                dropped_modifications: 1,
                worker_panics: 1,
            }
        );
    }
}
