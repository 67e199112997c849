//! Recording jobs and their state machine.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureProcess;
use crate::catalog::Channel;
use crate::Error;

/// Identifier of a recording job.
///
/// Remote jobs reuse the backend entry uuid; local jobs get a fresh UUID v4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Local,
    Remote,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Starting,
    Active,
    Stopping,
    Stopped,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Active => "ACTIVE",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }

    /// Human readable label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::Active => "Recording",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Starting, Active | Failed)
                | (Active, Stopping | Failed)
                // A failed backend stop hands the job back
                | (Stopping, Active | Stopped | Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capture running in this process.
///
/// A stall restart never overwrites what was already captured: each relaunch
/// writes a fresh segment next to `output_path` (`show.part1.ts`, ...).
pub struct LocalJob {
    /// Path the recording was requested for; identifies the job.
    pub output_path: PathBuf,
    /// File the current capture writes to.
    pub capture_path: PathBuf,
    /// Number of restart segments so far.
    pub segment: u32,
    /// Catalog entry the stream was resolved from; reused on restart.
    pub source: Channel,
    pub profile: Option<String>,
    /// `None` only while a stop or restart owns the process.
    pub process: Option<Box<dyn CaptureProcess>>,
    pub previous_size: u64,
    pub current_size: u64,
    /// Largest size the current segment reached.
    pub max_size: u64,
    /// Bytes left behind in earlier segments.
    pub earlier_bytes: u64,
    /// Size the stalled segment had reached when it was restarted. The
    /// restart budget only refills once the current segment outgrows it.
    pub restart_baseline: u64,
    /// Whether the output file existed at the last sample.
    pub file_present: bool,
    pub stall_restarts: u32,
}

impl LocalJob {
    pub fn new(
        output_path: PathBuf,
        source: Channel,
        profile: Option<String>,
        process: Box<dyn CaptureProcess>,
    ) -> Self {
        Self {
            capture_path: output_path.clone(),
            output_path,
            segment: 0,
            source,
            profile,
            process: Some(process),
            previous_size: 0,
            current_size: 0,
            max_size: 0,
            earlier_bytes: 0,
            restart_baseline: 0,
            file_present: true,
            stall_restarts: 0,
        }
    }

    /// Record a new size sample of the current segment. Returns `true` when
    /// the file grew.
    pub fn record_size(&mut self, size: Option<u64>) -> bool {
        self.file_present = size.is_some();
        let size = size.unwrap_or(0);
        self.previous_size = self.current_size;
        self.current_size = size;
        self.max_size = self.max_size.max(size);
        self.current_size > self.previous_size
    }

    /// Whether the segment started by the last restart has captured more
    /// than the one it replaced.
    pub fn outgrew_restart(&self) -> bool {
        self.current_size > self.restart_baseline
    }

    /// Bytes captured across all segments.
    pub fn bytes_written(&self) -> u64 {
        self.earlier_bytes + self.max_size
    }

    /// Bytes currently on disk across all segments, as last sampled.
    pub fn total_size(&self) -> u64 {
        self.earlier_bytes + self.current_size
    }

    /// Switch sampling over to restart segment `segment` and return its path.
    pub fn begin_segment(&mut self, segment: u32) -> PathBuf {
        self.restart_baseline = self.max_size;
        self.earlier_bytes += self.max_size;
        self.previous_size = 0;
        self.current_size = 0;
        self.max_size = 0;
        self.segment = segment;
        self.capture_path = segment_path(&self.output_path, segment);
        self.capture_path.clone()
    }

    /// Whether this job owns `path`, either as the requested output or as
    /// the segment being written.
    pub fn writes_to(&self, path: &Path) -> bool {
        self.output_path == path || self.capture_path == path
    }
}

/// Path of restart segment `segment` for a recording requested at `base`.
pub fn segment_path(base: &Path, segment: u32) -> PathBuf {
    if segment == 0 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{stem}.part{segment}.{}", ext.to_string_lossy()),
        None => format!("{stem}.part{segment}"),
    };
    base.with_file_name(name)
}

impl fmt::Debug for LocalJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalJob")
            .field("output_path", &self.output_path)
            .field("capture_path", &self.capture_path)
            .field("profile", &self.profile)
            .field("pid", &self.process.as_ref().and_then(|p| p.pid()))
            .field("current_size", &self.current_size)
            .field("stall_restarts", &self.stall_restarts)
            .finish()
    }
}

/// A recording delegated to the backend DVR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub entry_id: String,
    pub channel_id: String,
    pub start: i64,
    pub stop: i64,
    pub title: String,
}

#[derive(Debug)]
pub enum JobPayload {
    Local(LocalJob),
    Remote(RemoteJob),
}

/// One in-flight recording.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    /// Channel display name.
    pub channel: String,
    pub created_at: DateTime<Utc>,
    state: JobState,
    pub payload: JobPayload,
}

impl Job {
    pub fn local(id: JobId, channel: impl Into<String>, local: LocalJob) -> Self {
        Self::with_payload(id, channel, JobPayload::Local(local))
    }

    pub fn remote(channel: impl Into<String>, remote: RemoteJob) -> Self {
        let id = JobId::new(remote.entry_id.clone());
        Self::with_payload(id, channel, JobPayload::Remote(remote))
    }

    fn with_payload(id: JobId, channel: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            id,
            channel: channel.into(),
            created_at: Utc::now(),
            state: JobState::Starting,
            payload,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self.payload {
            JobPayload::Local(_) => JobKind::Local,
            JobPayload::Remote(_) => JobKind::Remote,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Bytes written so far; always 0 for remote jobs.
    pub fn size_bytes(&self) -> u64 {
        match &self.payload {
            JobPayload::Local(local) => local.total_size(),
            JobPayload::Remote(_) => 0,
        }
    }

    pub fn as_local(&self) -> Option<&LocalJob> {
        match &self.payload {
            JobPayload::Local(local) => Some(local),
            JobPayload::Remote(_) => None,
        }
    }

    pub fn as_local_mut(&mut self) -> Option<&mut LocalJob> {
        match &mut self.payload {
            JobPayload::Local(local) => Some(local),
            JobPayload::Remote(_) => None,
        }
    }

    /// Move to `target`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, target: JobState) -> Result<(), Error> {
        if !self.state.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }
        self.state = target;
        Ok(())
    }
}
