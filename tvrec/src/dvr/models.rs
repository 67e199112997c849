//! Wire models of the TVHeadend DVR API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Locale-keyed text, e.g. `{"eng": "Evening news"}`.
pub type LocalizedText = BTreeMap<String, String>;

/// Language key used for titles created by this client.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Payload of `/api/dvr/entry/create`, sent as the JSON value of the `conf`
/// form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntry {
    /// Start time, epoch seconds.
    pub start: i64,
    /// Stop time, epoch seconds.
    pub stop: i64,
    /// Backend channel uuid.
    pub channel: String,
    pub title: LocalizedText,
    pub subtitle: LocalizedText,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CreateEntry {
    pub fn new(channel: impl Into<String>, start: i64, stop: i64, title: impl Into<String>) -> Self {
        Self {
            start,
            stop,
            channel: channel.into(),
            title: localized(title),
            subtitle: LocalizedText::new(),
            comment: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = localized(subtitle);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

fn localized(text: impl Into<String>) -> LocalizedText {
    LocalizedText::from([(DEFAULT_LANGUAGE.to_string(), text.into())])
}

/// `uuid` carrying response of create/stop calls.
#[derive(Debug, Deserialize)]
pub(crate) struct EntryIdResponse {
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Response of `/api/dvr/entry/grid`.
#[derive(Debug, Deserialize)]
pub(crate) struct EntryGrid {
    #[serde(default)]
    pub entries: Vec<DvrEntry>,
}

/// One entry as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DvrEntry {
    pub uuid: String,
    /// Backend channel uuid.
    pub channel: String,
    pub channelname: String,
    pub disp_title: String,
    pub status: String,
    pub sched_status: String,
    pub start: i64,
    pub stop: i64,
    pub duration: i64,
    pub errors: i64,
    pub errorcode: i64,
    pub error: String,
}

/// Where an entry belongs in a DVR status overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryCategory {
    Recording,
    Upcoming,
    Finished,
    Failed(String),
    Other,
}

impl DvrEntry {
    /// The backend reports `"Running"` (exact case) while an entry records.
    pub fn is_running(&self) -> bool {
        self.status == "Running"
    }

    pub fn category(&self) -> EntryCategory {
        let status = self.status.to_lowercase();
        let sched = self.sched_status.to_lowercase();

        if self.is_running() {
            EntryCategory::Recording
        } else if status.contains("scheduled") || sched == "scheduled" {
            EntryCategory::Upcoming
        } else if status.contains("completed") || status == "finished" {
            EntryCategory::Finished
        } else if status.contains("failed")
            || status.contains("invalid")
            || status.contains("error")
            || self.errors > 0
            || self.errorcode != 0
        {
            EntryCategory::Failed(self.failure_message())
        } else {
            EntryCategory::Other
        }
    }

    fn failure_message(&self) -> String {
        if !self.error.is_empty() {
            self.error.clone()
        } else if self.errors > 0 {
            format!("Recording failed with {} errors", self.errors)
        } else if self.errorcode != 0 {
            format!("Error code: {}", self.errorcode)
        } else {
            "Unknown error".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_payload_uses_locale_maps() {
        let entry = CreateEntry::new("abc", 1000, 4600, "Manual Recording - News1")
            .with_subtitle("Started at 2024-01-01 10:00:00");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["start"], 1000);
        assert_eq!(json["stop"], 4600);
        assert_eq!(json["channel"], "abc");
        assert_eq!(json["title"]["eng"], "Manual Recording - News1");
        assert_eq!(json["subtitle"]["eng"], "Started at 2024-01-01 10:00:00");
        assert!(json.get("comment").is_none());
    }

    #[test]
    fn entries_decode_leniently() {
        let grid: EntryGrid = serde_json::from_str(
            r#"{"entries":[{"uuid":"e1","channelname":"News1","status":"Running","extra":1}]}"#,
        )
        .unwrap();

        assert_eq!(grid.entries.len(), 1);
        assert_eq!(grid.entries[0].uuid, "e1");
        assert_eq!(grid.entries[0].start, 0);
        assert!(grid.entries[0].is_running());
    }

    #[test]
    fn categorizes_like_the_status_overview() {
        let entry = |status: &str| DvrEntry {
            status: status.to_string(),
            ..Default::default()
        };

        assert_eq!(entry("Running").category(), EntryCategory::Recording);
        assert_eq!(entry("running").category(), EntryCategory::Other);
        assert_eq!(entry("Scheduled").category(), EntryCategory::Upcoming);
        assert_eq!(entry("Completed OK").category(), EntryCategory::Finished);
        assert_eq!(entry("File missing").category(), EntryCategory::Other);

        let with_message = DvrEntry {
            status: "Invalid".to_string(),
            error: "No space left".to_string(),
            ..Default::default()
        };
        assert_eq!(
            with_message.category(),
            EntryCategory::Failed("No space left".to_string())
        );

        let errored = DvrEntry {
            status: "Time missed".to_string(),
            errors: 2,
            ..Default::default()
        };
        assert_eq!(
            errored.category(),
            EntryCategory::Failed("Recording failed with 2 errors".to_string())
        );
    }
}
