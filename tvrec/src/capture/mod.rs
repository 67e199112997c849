//! Local capture of a live stream through an external encoder process.
//!
//! A [`CaptureLauncher`] turns a [`CaptureSpec`] into a running
//! [`CaptureProcess`]; the supervisor owns each process exclusively through
//! its job and drives it with [`CaptureProcess::poll`] and
//! [`CaptureProcess::stop`].

mod args;
mod diagnostics;
mod ffmpeg;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use args::{ContainerHint, build_capture_args};
pub use diagnostics::{DiagnosticsBuffer, drain_into, is_progress_record};
pub use ffmpeg::{FfmpegConfig, FfmpegLauncher, FfmpegProcess};

/// Errors raised while starting a local capture.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to spawn encoder {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output path {} is not writable: {source}", path.display())]
    OutputPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What to capture and where to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpec {
    pub stream_url: String,
    pub output_path: PathBuf,
}

impl CaptureSpec {
    pub fn new(stream_url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            stream_url: stream_url.into(),
            output_path: output_path.into(),
        }
    }

    pub fn container(&self) -> ContainerHint {
        ContainerHint::from_path(&self.output_path)
    }
}

/// Liveness of a capture process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// The process is gone. `None` when it was terminated by a signal.
    Exited(Option<i32>),
}

/// One owned encoder process.
#[async_trait]
pub trait CaptureProcess: Send {
    /// OS process id, while known.
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check.
    fn poll(&mut self) -> ProcessStatus;

    /// Request termination, force-killing after `grace`.
    ///
    /// Calling this on an exited or already stopped process is a no-op.
    async fn stop(&mut self, grace: Duration);

    /// Most recent diagnostic lines of the encoder, oldest first.
    fn diagnostics(&self) -> Vec<String>;
}

/// Starts capture processes.
#[async_trait]
pub trait CaptureLauncher: Send + Sync {
    async fn launch(&self, spec: &CaptureSpec) -> Result<Box<dyn CaptureProcess>, CaptureError>;
}
