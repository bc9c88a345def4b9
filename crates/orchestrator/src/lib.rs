#![forbid(unsafe_code)]

pub mod clock;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod observation;
pub mod pool;
pub mod quarantine;
pub mod scan;
pub mod stats;
pub mod stores;

pub use dispatch::Dispatcher;
pub use engine::{ControlEvent, EngineState, ScanEngine, Services};
pub use error::Error;
pub use observation::{EventSink, FsEvent, NotificationSource, NotifyWatcher};
pub use pool::{PoolHandle, TaskOutcome, TaskReport, WorkerContext, WorkerPool};
pub use quarantine::{FileMover, FsMover, Quarantine, QuarantineManager};
pub use scan::{ClamdClient, ScanClient};
pub use stats::{PipelineStats, StatsSnapshot};

pub use clock::{Clock, SystemClock};
pub use domain::{
    DirectoryState, IsolationOutcome, QuarantineRecord, ScanEvent, ScanFailure, ScanTask,
    ScanVerdict, WatchTarget,
};
pub use stores::{Admission, InFlightSet, Release};
