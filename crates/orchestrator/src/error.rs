/// Failures that stop the engine from starting. Everything that happens
/// after startup is handled per task and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No watch target could be resolved")]
    NoWatchTargets,

    #[error("Failed to initialize filesystem watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Notification source is already running")]
    AlreadyStarted,

    #[error("Failed to spawn notification thread: {0}")]
    Io(#[from] std::io::Error),
}
