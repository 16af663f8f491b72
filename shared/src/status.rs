use crate::upload::TaskId;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum TaskStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    /// Any status this client does not know yet. Treated as still running.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// One poll's complete view of a task. Each poll replaces the previous one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusSnapshot {
    pub status: TaskStatus,
    #[serde(deserialize_with = "clamped_progress")]
    pub progress: u8,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(default)]
    pub project_id: Option<i64>,
}

impl StatusSnapshot {
    pub fn label(&self) -> String {
        if self.message.is_empty() {
            format!("{}%", self.progress)
        } else {
            format!("{}% - {}", self.progress, self.message)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub status: StatusSnapshot,
}

// The backend computes progress as a float in places and truncates it, so
// accept any JSON number and pin it to 0..=100.
fn clamped_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.clamp(0.0, 100.0) as u8)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::decode_json;
    use std::str::FromStr;

    #[test]
    fn test_decode_status_response() {
        let body = r#"{"task_id": "t-1", "status": {"status": "Processing", "progress": 40, "message": "Processing file 2 of 5"}}"#;
        let resp: StatusResponse = decode_json(body).unwrap();
        assert_eq!(resp.task_id, Some(TaskId::from("t-1")));
        assert_eq!(resp.status.status, TaskStatus::Processing);
        assert_eq!(resp.status.progress, 40);
        assert_eq!(resp.status.label(), "40% - Processing file 2 of 5");
        assert_eq!(resp.status.project_id, None);
    }

    #[test]
    fn test_progress_is_clamped() {
        let over: StatusSnapshot =
            decode_json(r#"{"status": "Completed", "progress": 140.7, "message": ""}"#).unwrap();
        assert_eq!(over.progress, 100);
        assert_eq!(over.label(), "100%");

        let under: StatusSnapshot =
            decode_json(r#"{"status": "Pending", "progress": -3}"#).unwrap();
        assert_eq!(under.progress, 0);
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let snapshot: StatusSnapshot =
            decode_json(r#"{"status": "Exploded", "progress": 1}"#).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Unknown);
        assert!(!snapshot.status.is_terminal());
    }

    #[test]
    fn test_decode_queued_status() {
        let body = r#"{"task_id": "t", "status": {"status": "Queued", "progress": 0, "message": "Task queued"}}"#;
        let resp: StatusResponse = decode_json(body).unwrap();
        assert_eq!(resp.status.status, TaskStatus::Queued);
        assert!(!resp.status.status.is_terminal());
        assert_eq!(resp.status.label(), "0% - Task queued");
    }

    #[test]
    fn test_null_message_reads_as_empty() {
        let body = r#"{"status": {"status": "Processing", "progress": 40, "message": null, "project_id": null}}"#;
        let resp: StatusResponse = decode_json(body).unwrap();
        assert_eq!(resp.status.message, "");
        assert_eq!(resp.status.project_id, None);
        assert_eq!(resp.status.label(), "40%");
    }

    #[test]
    fn test_invalid_progress_is_invalid_response() {
        let result = decode_json::<StatusSnapshot>(r#"{"status": "Pending", "progress": "half"}"#);
        assert!(matches!(result, Err(crate::ApiError::InvalidResponse(_))));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Unknown.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert_eq!(TaskStatus::from_str("Failed").unwrap(), TaskStatus::Failed);
        assert_eq!(TaskStatus::Cancelled.to_string(), "Cancelled");
    }
}
