//! Job definitions for remote watermark removal tasks.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier assigned by the remote service when a task is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created and still being processed remotely
    #[default]
    Waiting,
    /// Finished with at least one output locator
    Success,
    /// Finished with a failure reported by the remote service
    Fail,
    /// The last status query failed; the job itself may still be running
    Unknown,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Success => "success",
            JobState::Fail => "fail",
            JobState::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Fail)
    }

    /// Map the remote `state` field onto a lifecycle state.
    ///
    /// The service reports intermediate stages under several names; all of
    /// them mean the job is still running. Returns `None` for unrecognized
    /// values so the caller can decide how to treat them.
    pub fn parse_remote(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "waiting" | "queuing" | "queued" | "generating" | "processing" | "running" => {
                Some(JobState::Waiting)
            }
            "success" | "succeeded" | "completed" => Some(JobState::Success),
            "fail" | "failed" | "error" => Some(JobState::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure reported by the remote service for a job that ran and failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    /// Human-readable failure message
    pub message: String,
    /// Machine code, when the service provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Final outcome of a job, as extracted from a status payload.
///
/// Built only through [`TerminalJob::success`] and [`TerminalJob::failed`],
/// so a successful job always carries at least one output locator and a
/// failed job always carries an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TerminalJob {
    /// Remote task ID
    pub id: JobId,

    /// Either `Success` or `Fail`
    pub state: JobState,

    /// Output locators, in the order the service returned them
    #[serde(default)]
    pub result: Vec<String>,

    /// Failure details (only for `Fail`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,

    /// Creation time reported by the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Completion time reported by the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Remote processing time in seconds (only for `Success`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_processing_time: Option<f64>,
}

impl TerminalJob {
    /// Successful outcome. Returns `None` when `result` holds no locator.
    pub fn success(id: JobId, result: Vec<String>) -> Option<Self> {
        if result.is_empty() {
            return None;
        }

        Some(Self {
            id,
            state: JobState::Success,
            result,
            error: None,
            created_at: None,
            completed_at: None,
            elapsed_processing_time: None,
        })
    }

    /// Failed outcome.
    pub fn failed(id: JobId, error: JobFailure) -> Self {
        Self {
            id,
            state: JobState::Fail,
            result: Vec::new(),
            error: Some(error),
            created_at: None,
            completed_at: None,
            elapsed_processing_time: None,
        }
    }

    /// Attach service-reported timestamps.
    pub fn with_times(
        mut self,
        created_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_at = created_at;
        self.completed_at = completed_at;
        self
    }

    /// Attach processing time. Ignored for failed jobs.
    pub fn with_elapsed(mut self, seconds: Option<f64>) -> Self {
        if self.state == JobState::Success {
            self.elapsed_processing_time = seconds;
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == JobState::Success
    }

    /// First output locator, if any.
    pub fn primary_result(&self) -> Option<&str> {
        self.result.first().map(String::as_str)
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Job {id} is already {state} and cannot change")]
    AlreadyTerminal { id: JobId, state: JobState },

    #[error("Outcome for job {outcome} does not belong to job {job}")]
    IdMismatch { job: JobId, outcome: JobId },
}

/// Caller-owned record of one remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Remote task ID
    pub id: JobId,

    /// Source URL submitted for processing
    pub input_reference: String,

    /// Current state
    #[serde(default)]
    pub state: JobState,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Set once the job reaches `Success` or `Fail`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Output locators (only for `Success`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<String>>,

    /// Failure details (only for `Fail`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,

    /// Remote processing time in seconds (only for `Success`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_processing_time: Option<f64>,
}

impl Job {
    /// Record for a job the service has just accepted.
    pub fn new(id: JobId, input_reference: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            input_reference: input_reference.into(),
            state: JobState::Waiting,
            created_at,
            completed_at: None,
            result: None,
            error: None,
            elapsed_processing_time: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// A status query failed; the job's real state is not known.
    pub fn mark_unknown(&mut self) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.state = JobState::Unknown;
        Ok(())
    }

    /// A status query reported the job as still running.
    pub fn mark_waiting(&mut self) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.state = JobState::Waiting;
        Ok(())
    }

    /// Apply a terminal outcome.
    ///
    /// Re-applying the outcome the job already holds is a no-op; any other
    /// change to a terminal job is rejected.
    pub fn apply_terminal(&mut self, outcome: &TerminalJob) -> Result<(), TransitionError> {
        if outcome.id != self.id {
            return Err(TransitionError::IdMismatch {
                job: self.id.clone(),
                outcome: outcome.id.clone(),
            });
        }

        if self.is_terminal() {
            if self.matches_outcome(outcome) {
                return Ok(());
            }
            return Err(TransitionError::AlreadyTerminal {
                id: self.id.clone(),
                state: self.state,
            });
        }

        self.state = outcome.state;
        self.completed_at = Some(outcome.completed_at.unwrap_or_else(Utc::now));
        match outcome.state {
            JobState::Success => {
                self.result = Some(outcome.result.clone());
                self.elapsed_processing_time = outcome.elapsed_processing_time;
            }
            _ => {
                self.error = outcome.error.clone();
            }
        }
        Ok(())
    }

    fn matches_outcome(&self, outcome: &TerminalJob) -> bool {
        if self.state != outcome.state {
            return false;
        }
        match self.state {
            JobState::Success => self.result.as_deref() == Some(outcome.result.as_slice()),
            _ => self.error == outcome.error,
        }
    }

    fn ensure_open(&self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            Err(TransitionError::AlreadyTerminal {
                id: self.id.clone(),
                state: self.state,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobId::from("task_123"), "https://example.com/video.mp4", Utc::now())
    }

    fn success() -> TerminalJob {
        TerminalJob::success(JobId::from("task_123"), vec!["https://cdn/out.mp4".into()]).unwrap()
    }

    #[test]
    fn test_job_creation() {
        let job = job();
        assert_eq!(job.state, JobState::Waiting);
        assert!(job.completed_at.is_none());
        assert!(job.result.is_none());
    }

    #[test]
    fn test_parse_remote_state() {
        assert_eq!(JobState::parse_remote("waiting"), Some(JobState::Waiting));
        assert_eq!(JobState::parse_remote("GENERATING"), Some(JobState::Waiting));
        assert_eq!(JobState::parse_remote("success"), Some(JobState::Success));
        assert_eq!(JobState::parse_remote("fail"), Some(JobState::Fail));
        assert_eq!(JobState::parse_remote("exploded"), None);
    }

    #[test]
    fn test_success_requires_result() {
        assert!(TerminalJob::success(JobId::from("t"), vec![]).is_none());
    }

    #[test]
    fn test_elapsed_ignored_for_failure() {
        let failed = TerminalJob::failed(JobId::from("t"), JobFailure::new("boom", None))
            .with_elapsed(Some(12.5));
        assert!(failed.elapsed_processing_time.is_none());
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = job();

        job.mark_unknown().unwrap();
        assert_eq!(job.state, JobState::Unknown);

        job.mark_waiting().unwrap();
        job.apply_terminal(&success().with_elapsed(Some(4.2))).unwrap();
        assert_eq!(job.state, JobState::Success);
        assert_eq!(job.result.as_deref(), Some(&["https://cdn/out.mp4".to_string()][..]));
        assert_eq!(job.elapsed_processing_time, Some(4.2));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_is_monotonic() {
        let mut job = job();
        job.apply_terminal(&success()).unwrap();

        // Same outcome again is an idempotent re-read
        assert!(job.apply_terminal(&success()).is_ok());

        let failed = TerminalJob::failed(JobId::from("task_123"), JobFailure::new("late", None));
        assert!(matches!(
            job.apply_terminal(&failed),
            Err(TransitionError::AlreadyTerminal { .. })
        ));
        assert!(job.mark_unknown().is_err());
        assert!(job.mark_waiting().is_err());
        assert_eq!(job.state, JobState::Success);
    }

    #[test]
    fn test_outcome_for_other_job_rejected() {
        let mut job = job();
        let other = TerminalJob::success(JobId::from("task_999"), vec!["u".into()]).unwrap();
        assert!(matches!(
            job.apply_terminal(&other),
            Err(TransitionError::IdMismatch { .. })
        ));
        assert_eq!(job.state, JobState::Waiting);
    }

    #[test]
    fn test_failure_recorded() {
        let mut job = job();
        let failed = TerminalJob::failed(
            JobId::from("task_123"),
            JobFailure::new("video unavailable", Some("422".into())),
        );
        job.apply_terminal(&failed).unwrap();
        assert_eq!(job.state, JobState::Fail);
        assert!(job.result.is_none());
        assert_eq!(job.error.as_ref().unwrap().code.as_deref(), Some("422"));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&JobState::Success).unwrap();
        assert_eq!(json, "\"success\"");
        let id: JobId = serde_json::from_str("\"task_1\"").unwrap();
        assert_eq!(id.as_str(), "task_1");
    }
}
