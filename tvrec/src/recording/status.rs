//! Read-only projection of the registry for display.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job::{JobId, JobKind, JobPayload, JobState};
use super::registry::JobRegistry;

/// One line of the recording status view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub job_id: JobId,
    pub channel: String,
    pub kind: JobKind,
    /// File being written for local jobs, `entry <uuid>` for remote ones.
    pub reference: String,
    /// Bytes across all segments of a local job. `None` for remote jobs and
    /// when the current segment has vanished.
    pub size: Option<u64>,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
}

impl StatusRow {
    pub fn size_label(&self) -> String {
        self.size.map_or_else(|| "N/A".to_string(), format_size)
    }
}

pub fn project(registry: &JobRegistry) -> Vec<StatusRow> {
    registry
        .iter()
        .map(|job| {
            let (reference, size) = match &job.payload {
                JobPayload::Local(local) => (
                    local.capture_path.display().to_string(),
                    local.file_present.then_some(local.total_size()),
                ),
                JobPayload::Remote(remote) => (format!("entry {}", remote.entry_id), None),
            };
            StatusRow {
                job_id: job.id.clone(),
                channel: job.channel.clone(),
                kind: job.kind(),
                reference,
                size,
                state: job.state(),
                started_at: job.created_at,
            }
        })
        .collect()
}

/// Human readable byte count with one decimal, e.g. `11.7 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
