#![forbid(unsafe_code)]

use crate::clock::{Clock, SystemClock};
use crate::dispatch::Dispatcher;
use crate::domain::WatchTarget;
use crate::error::Error;
use crate::observation::NotificationSource;
use crate::pool::{WorkerContext, WorkerPool};
use crate::quarantine::{Quarantine, QuarantineManager};
use crate::scan::{ClamdClient, ScanClient};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::stores::InFlightSet;
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Services {
    pub scanner: Arc<dyn ScanClient>,
    pub quarantine: Arc<dyn Quarantine>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Production wiring: clamd over TCP, on-disk quarantine, wall clock.
    pub fn from_config(config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            scanner: Arc::new(ClamdClient::new(&config.scanner)),
            quarantine: Arc::new(QuarantineManager::new(&config.quarantine, clock.clone())),
            clock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    DumpStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Watching,
    Draining,
}

pub struct ScanEngine {
    config: Config,
    services: Services,
    stats: Arc<PipelineStats>,
    in_flight: Arc<InFlightSet>,
    state: watch::Sender<EngineState>,
}

impl ScanEngine {
    pub fn new(config: Config, services: Services) -> Self {
        Self {
            config,
            services,
            stats: Arc::new(PipelineStats::default()),
            in_flight: Arc::new(InFlightSet::default()),
            state: watch::Sender::new(EngineState::Stopped),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Follow state transitions from another task.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Keep the paths that still exist. Missing ones are logged and skipped.
    pub fn resolve_targets(
        paths: impl IntoIterator<Item = PathBuf>,
        recursive: bool,
    ) -> Vec<WatchTarget> {
        paths
            .into_iter()
            .filter_map(|path| {
                if path.exists() {
                    Some(WatchTarget::new(path, recursive))
                } else {
                    warn!(?path, "watch target does not exist, skipping");
                    None
                }
            })
            .collect()
    }

    /// Watch `paths` until `cancel` fires, then drain every queued and
    /// running task before returning the final counters.
    pub async fn run_until(
        &self,
        paths: Vec<PathBuf>,
        mut source: Box<dyn NotificationSource>,
        cancel: CancellationToken,
        mut control_rx: mpsc::UnboundedReceiver<ControlEvent>,
    ) -> Result<StatsSnapshot, Error> {
        if self.state() != EngineState::Stopped {
            return Err(Error::AlreadyStarted);
        }
        let targets = Self::resolve_targets(paths, self.config.watch.recursive);
        if targets.is_empty() {
            return Err(Error::NoWatchTargets);
        }

        match self.services.scanner.ping().await {
            Ok(()) => info!("scan daemon is reachable"),
            Err(failure) => warn!(%failure, "scan daemon is not answering, scans will fail until it is"),
        }

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let context = Arc::new(WorkerContext {
            scanner: self.services.scanner.clone(),
            quarantine: self.services.quarantine.clone(),
            clock: self.services.clock.clone(),
            settle_delay: self.config.workers.settle_delay,
        });
        let pool = WorkerPool::spawn(self.config.workers.size, context, completions_tx);
        let quarantine_dir = std::path::absolute(&self.config.quarantine.dir)
            .unwrap_or_else(|_| self.config.quarantine.dir.clone());
        let dispatcher = Arc::new(
            Dispatcher::new(pool.handle(), self.in_flight.clone(), self.stats.clone())
                .exclude(quarantine_dir),
        );
        let supervisor = tokio::spawn(dispatcher.clone().supervise(completions_rx));

        if let Err(err) = Self::attach(source.as_mut(), &targets, dispatcher.clone()) {
            pool.shutdown().await;
            if let Err(err) = supervisor.await {
                warn!(%err, "completion supervisor exited abnormally");
            }
            return Err(err);
        }

        self.state.send_replace(EngineState::Watching);
        info!(targets = targets.len(), workers = pool.size(), "engine watching");

        let walk_cancel = cancel.child_token();
        let walk = self.config.watch.initial_scan.then(|| {
            let dispatcher = dispatcher.clone();
            let targets = targets.clone();
            let walk_cancel = walk_cancel.clone();
            tokio::task::spawn_blocking(move || dispatcher.scan_all_existing(&targets, &walk_cancel))
        });

        let mut control_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = control_rx.recv(), if control_open => match event {
                    Some(ControlEvent::DumpStatus) => self.dump_status(&dispatcher),
                    None => control_open = false,
                },
            }
        }

        self.state.send_replace(EngineState::Draining);
        info!(
            in_flight = self.in_flight.len(),
            queued = dispatcher.queued(),
            "shutdown requested, draining"
        );

        source.stop();
        match tokio::task::spawn_blocking(move || source.join()).await {
            Ok(()) => debug!("notification source joined"),
            Err(err) => warn!(%err, "notification source did not shut down cleanly"),
        }

        walk_cancel.cancel();
        if let Some(walk) = walk
            && let Err(err) = walk.await
        {
            warn!(%err, "startup scan exited abnormally");
        }

        dispatcher.wait_idle().await;
        pool.shutdown().await;
        if let Err(err) = supervisor.await {
            warn!(%err, "completion supervisor exited abnormally");
        }

        self.state.send_replace(EngineState::Stopped);
        let stats = self.stats.snapshot();
        info!(?stats, "engine stopped");
        Ok(stats)
    }

    fn attach(
        source: &mut dyn NotificationSource,
        targets: &[WatchTarget],
        dispatcher: Arc<Dispatcher>,
    ) -> Result<(), Error> {
        for target in targets {
            source.register(&target.path, target.recursive)?;
        }
        source.start(dispatcher)
    }

    fn dump_status(&self, dispatcher: &Dispatcher) {
        info!(config = ?self.config, "current config");
        info!(
            state = ?self.state(),
            in_flight = self.in_flight.len(),
            queued = dispatcher.queued(),
            stats = ?self.stats.snapshot(),
            "pipeline status"
        );
    }
}

impl std::fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEngine")
            .field("state", &self.state())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
