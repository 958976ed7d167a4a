//! Request/response types for the remote job API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
use wmr_models::{JobId, JobState, TerminalJob};

/// Caller-supplied options for job creation.
///
/// The fields are passed through to the service and never interpreted
/// locally beyond basic validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SubmitOptions {
    /// URL the service calls when the job finishes
    #[validate(url)]
    pub callback_url: Option<String>,
    /// Scheduling hint
    #[validate(length(min = 1, max = 64))]
    pub priority: Option<String>,
}

impl SubmitOptions {
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }
}

/// Body of the job-creation call.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskRequest<'a> {
    pub model: &'a str,
    pub input: TaskInput<'a>,
    #[serde(rename = "callBackUrl", skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<&'a str>,
}

/// Input descriptor inside [`CreateTaskRequest`].
#[derive(Debug, Clone, Serialize)]
pub struct TaskInput<'a> {
    pub video_url: &'a str,
}

/// `data` object of a successful creation response.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskData {
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Reference to a job the service has accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Remote task ID
    pub id: JobId,
    /// Submitted input URL
    pub input_reference: String,
    /// Base URL that accepted the job; status queries go here
    pub endpoint: String,
    /// Local submission time
    pub submitted_at: DateTime<Utc>,
}

impl JobHandle {
    /// Handle for a job created elsewhere (e.g. a task ID typed by a user).
    pub fn existing(id: JobId, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            input_reference: String::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            submitted_at: Utc::now(),
        }
    }
}

/// Outcome of one status query after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusSnapshot {
    /// Still processing; carries the raw remote state string
    Pending { remote_state: String },
    /// Finished, successfully or not
    Terminal(TerminalJob),
}

impl StatusSnapshot {
    pub fn state(&self) -> JobState {
        match self {
            StatusSnapshot::Pending { .. } => JobState::Waiting,
            StatusSnapshot::Terminal(job) => job.state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusSnapshot::Terminal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_shape() {
        let body = CreateTaskRequest {
            model: "sora-watermark-remover",
            input: TaskInput {
                video_url: "https://example.com/video.mp4",
            },
            callback_url: Some("https://hooks.example/done"),
            priority: None,
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "sora-watermark-remover",
                "input": {"video_url": "https://example.com/video.mp4"},
                "callBackUrl": "https://hooks.example/done"
            })
        );
    }

    #[test]
    fn test_submit_options_validation() {
        assert!(SubmitOptions::default().validate().is_ok());
        assert!(SubmitOptions::default()
            .with_callback_url("https://hooks.example/done")
            .validate()
            .is_ok());
        assert!(SubmitOptions::default()
            .with_callback_url("not a url")
            .validate()
            .is_err());
        assert!(SubmitOptions::default().with_priority("").validate().is_err());
    }

    #[test]
    fn test_existing_handle_trims_endpoint() {
        let handle = JobHandle::existing(JobId::from("task_1"), "https://api.example/jobs/");
        assert_eq!(handle.endpoint, "https://api.example/jobs");
    }
}
