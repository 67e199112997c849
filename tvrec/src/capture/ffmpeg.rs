//! ffmpeg-backed capture processes.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{Termination, terminate_child, tokio_command};
use serde::{Deserialize, Serialize};
use tokio::process::{Child, ChildStdin};
use tracing::{debug, info, warn};

use super::args::build_capture_args;
use super::diagnostics::{DiagnosticsBuffer, drain_into};
use super::{CaptureError, CaptureLauncher, CaptureProcess, CaptureSpec, ProcessStatus};

/// ffmpeg reads `q` on stdin as "finish the file and exit".
const QUIT_REQUEST: &[u8] = b"q";

/// Encoder settings for local captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Path or name of the ffmpeg executable.
    pub binary_path: String,
    /// Extra arguments placed before `-i`.
    pub input_args: Vec<String>,
    /// Number of stderr lines kept for failure reports.
    pub diagnostics_lines: usize,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            input_args: Vec::new(),
            diagnostics_lines: 32,
        }
    }
}

/// Launches one ffmpeg process per local recording.
pub struct FfmpegLauncher {
    config: FfmpegConfig,
}

impl FfmpegLauncher {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    /// First line of `ffmpeg -version`, if the binary can be run at all.
    pub fn detect_version(&self) -> Option<String> {
        std::process::Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .ok()
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new(FfmpegConfig::default())
    }
}

/// Create the parent directory on demand and make sure the file can be opened
/// for writing. The encoder truncates the file itself (`-y`).
async fn prepare_output(path: &Path) -> Result<(), CaptureError> {
    let output_error = |source| CaptureError::OutputPath {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(output_error)?;
    }

    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(output_error)?;

    Ok(())
}

#[async_trait]
impl CaptureLauncher for FfmpegLauncher {
    async fn launch(&self, spec: &CaptureSpec) -> Result<Box<dyn CaptureProcess>, CaptureError> {
        prepare_output(&spec.output_path).await?;

        let container = spec.container();
        let args = build_capture_args(
            &spec.stream_url,
            &spec.output_path,
            container,
            &self.config.input_args,
        );

        info!(
            output = %spec.output_path.display(),
            container = %container,
            "Starting ffmpeg capture"
        );

        let process = FfmpegProcess::spawn(
            &self.config.binary_path,
            &args,
            self.config.diagnostics_lines,
        )?;
        Ok(Box::new(process))
    }
}

/// A running (or finished) encoder process owned by exactly one job.
pub struct FfmpegProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    diagnostics: DiagnosticsBuffer,
    /// Cached exit code once the process is known to be gone.
    exit: Option<Option<i32>>,
}

impl FfmpegProcess {
    /// Spawn `program` with `args`, piping stdin for quit requests and
    /// draining stderr into a bounded diagnostics buffer.
    pub fn spawn(
        program: &str,
        args: &[String],
        diagnostics_lines: usize,
    ) -> Result<Self, CaptureError> {
        let mut child = tokio_command(program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::SpawnFailed {
                program: program.to_string(),
                source,
            })?;

        let diagnostics = DiagnosticsBuffer::new(diagnostics_lines);
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_into(stderr, diagnostics.clone()));
        }

        debug!(pid = ?child.id(), program, "Encoder process spawned");

        Ok(Self {
            stdin: child.stdin.take(),
            child,
            diagnostics,
            exit: None,
        })
    }
}

#[async_trait]
impl CaptureProcess for FfmpegProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn poll(&mut self) -> ProcessStatus {
        if let Some(code) = self.exit {
            return ProcessStatus::Exited(code);
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status.code());
                ProcessStatus::Exited(status.code())
            }
            Ok(None) => ProcessStatus::Running,
            Err(e) => {
                warn!(error = %e, "Failed to poll encoder process");
                ProcessStatus::Running
            }
        }
    }

    async fn stop(&mut self, grace: Duration) {
        if self.exit.is_some() {
            return;
        }

        let pid = self.child.id();
        let outcome = terminate_child(&mut self.child, self.stdin.take(), QUIT_REQUEST, grace).await;
        match outcome {
            Termination::Exited(code) => info!(?pid, ?code, "Encoder exited after quit request"),
            Termination::Killed(_) => warn!(?pid, "Encoder killed after grace period"),
        }
        self.exit = Some(outcome.code());
    }

    fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.snapshot()
    }
}
