//! Application configuration, stored as TOML.
//!
//! Loaded from an explicit `--config` path or from
//! `<config dir>/tvrec/config.toml`. A missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::FfmpegConfig;
use crate::catalog::Credentials;
use crate::logging::LoggingConfig;
use crate::recording::SupervisorConfig;
use crate::{Error, Result};

const APP_DIR: &str = "tvrec";
const CONFIG_FILE: &str = "config.toml";

/// Where channels come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Tvheadend,
    M3u,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// TVHeadend server, e.g. `http://tvh.local:9981`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// M3U playlist file or URL.
    pub playlist: Option<String>,
    /// TVHeadend streaming profile for local captures.
    pub profile: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Tvheadend,
            url: "http://localhost:9981".to_string(),
            username: None,
            password: None,
            playlist: None,
            profile: None,
        }
    }
}

impl SourceConfig {
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.username.clone(), self.password.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory for recordings started without an explicit file.
    pub output_dir: PathBuf,
    /// Extension of generated file names; decides the container.
    pub default_extension: String,
    #[serde(flatten)]
    pub ffmpeg: FfmpegConfig,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs::video_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Recordings"),
            default_extension: "ts".to_string(),
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl RecordingConfig {
    /// `<output_dir>/<channel>_<YYYYmmdd_HHMMSS>.<ext>` with path separators
    /// in the channel name replaced.
    pub fn output_path_for(&self, channel: &str, at: chrono::DateTime<chrono::Local>) -> PathBuf {
        let safe: String = channel
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        let extension = self.default_extension.trim_start_matches('.');
        self.output_dir
            .join(format!("{safe}_{}.{extension}", at.format("%Y%m%d_%H%M%S")))
    }
}

/// Supervisor tunables in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    pub monitor_interval_secs: u64,
    pub stall_threshold: u32,
    pub max_stall_restarts: u32,
    pub stop_grace_secs: u64,
    pub request_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub launch_timeout_secs: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            monitor_interval_secs: defaults.monitor_interval.as_secs(),
            stall_threshold: defaults.stall_threshold,
            max_stall_restarts: defaults.max_stall_restarts,
            stop_grace_secs: defaults.stop_grace.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            stop_timeout_secs: defaults.stop_timeout.as_secs(),
            launch_timeout_secs: defaults.launch_timeout.as_secs(),
        }
    }
}

impl SupervisorSection {
    pub fn to_supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            monitor_interval: Duration::from_secs(self.monitor_interval_secs.max(1)),
            stall_threshold: self.stall_threshold.max(1),
            max_stall_restarts: self.max_stall_restarts,
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs.max(1)),
            launch_timeout: Duration::from_secs(self.launch_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub recording: RecordingConfig,
    pub supervisor: SupervisorSection,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::config("could not determine the config directory"))?;
        Ok(dir.join(APP_DIR).join(CONFIG_FILE))
    }

    fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path(),
        }
    }

    /// Load the configuration, falling back to defaults when no file exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(path)?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| Error::io_path("reading", &path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("failed to parse TOML: {e}")))
    }

    /// Effective configuration rendered as TOML.
    pub fn show(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize TOML: {e}")))
    }

    /// Overwrite the config file with the defaults. Returns the file written.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve_path(path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io_path("creating config directory", parent, e))?;
        }
        std::fs::write(&path, Self::default().show()?)
            .map_err(|e| Error::io_path("writing", &path, e))?;
        Ok(path)
    }
}
