#![forbid(unsafe_code)]

use flume::Sender;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGUSR1: log config, in-flight count and counters.
    DumpStatus,
    /// SIGINT or SIGTERM: stop watching and drain.
    Shutdown,
}

/// Translate process signals into [`SignalEvent`]s. Only returns on error.
pub async fn wait_for_signal(events: Sender<SignalEvent>) -> anyhow::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    loop {
        let event = tokio::select! {
            _ = interrupt.recv() => {
                info!("received SIGINT");
                SignalEvent::Shutdown
            }
            _ = terminate.recv() => {
                info!("received SIGTERM");
                SignalEvent::Shutdown
            }
            _ = user1.recv() => {
                info!("received SIGUSR1");
                SignalEvent::DumpStatus
            }
        };
        events.send_async(event).await?;
    }
}
