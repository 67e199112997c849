//! Recording jobs: model, registry, stall detection, supervision.

pub mod events;
pub mod job;
pub mod monitor;
pub mod registry;
pub mod stall;
pub mod status;
pub mod supervisor;

pub use events::{JobFailure, SupervisorEvent};
pub use job::{Job, JobId, JobKind, JobPayload, JobState, LocalJob, RemoteJob};
pub use monitor::spawn_monitor;
pub use registry::JobRegistry;
pub use stall::{Observation, StallDetector};
pub use status::{StatusRow, format_size, project};
pub use supervisor::{
    MonitoringSample, StartKind, StartRequest, StopOutcome, Supervisor, SupervisorConfig,
    TickReport,
};
