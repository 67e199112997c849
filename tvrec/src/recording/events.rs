//! Notifications published by the supervisor.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job::{JobId, JobKind};

/// Why a job ended without being asked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobFailure {
    /// The encoder exited on its own. `code` is `None` when it was killed by
    /// a signal; `diagnostics` is the tail of its error output.
    ProcessExitedAbnormally {
        code: Option<i32>,
        bytes_written: u64,
        diagnostics: Vec<String>,
    },
    /// Output stopped growing and the restart budget was used up.
    Stalled { restarts: u32 },
    /// Output stalled and the replacement capture could not be started.
    RestartFailed(String),
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessExitedAbnormally {
                code,
                bytes_written,
                diagnostics,
            } => {
                match code {
                    Some(code) => write!(f, "encoder exited with code {code}")?,
                    None => f.write_str("encoder was killed")?,
                }
                write!(f, " after writing {bytes_written} bytes")?;
                if let Some(last) = diagnostics.last() {
                    write!(f, ": {last}")?;
                }
                Ok(())
            }
            Self::Stalled { restarts } => {
                write!(f, "output stopped growing after {restarts} restart(s)")
            }
            Self::RestartFailed(reason) => write!(f, "restart after stall failed: {reason}"),
        }
    }
}

/// Everything that adds or removes a job, plus stall restarts.
#[derive(Debug, Clone, Serialize)]
pub enum SupervisorEvent {
    JobStarted {
        job_id: JobId,
        channel: String,
        kind: JobKind,
        output_path: Option<PathBuf>,
        timestamp: DateTime<Utc>,
    },
    /// A stalled capture was relaunched into a new segment file.
    JobRestarted {
        job_id: JobId,
        channel: String,
        restarts: u32,
        segment_path: PathBuf,
        timestamp: DateTime<Utc>,
    },
    /// Stopped on request.
    JobStopped {
        job_id: JobId,
        channel: String,
        timestamp: DateTime<Utc>,
    },
    /// The encoder finished cleanly by itself.
    JobCompleted {
        job_id: JobId,
        channel: String,
        bytes_written: u64,
        timestamp: DateTime<Utc>,
    },
    JobFailed {
        job_id: JobId,
        channel: String,
        failure: JobFailure,
        timestamp: DateTime<Utc>,
    },
}

impl SupervisorEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::JobRestarted { job_id, .. }
            | Self::JobStopped { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. } => job_id,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            Self::JobStarted { channel, .. }
            | Self::JobRestarted { channel, .. }
            | Self::JobStopped { channel, .. }
            | Self::JobCompleted { channel, .. }
            | Self::JobFailed { channel, .. } => channel,
        }
    }

    /// One-line message suitable for a user notification.
    pub fn description(&self) -> String {
        match self {
            Self::JobStarted { channel, kind, .. } => {
                format!("Started {kind} recording of {channel}")
            }
            Self::JobRestarted {
                channel,
                restarts,
                segment_path,
                ..
            } => format!(
                "Restarted stalled recording of {channel} (restart {restarts}), continuing in {}",
                segment_path.display()
            ),
            Self::JobStopped { channel, .. } => format!("Stopped recording of {channel}"),
            Self::JobCompleted {
                channel,
                bytes_written,
                ..
            } => format!(
                "Recording of {channel} finished ({})",
                super::status::format_size(*bytes_written)
            ),
            Self::JobFailed {
                channel, failure, ..
            } => format!("Recording of {channel} failed: {failure}"),
        }
    }
}
