//! Poll lifecycle logging.
//!
//! Every line of a polling run carries the job ID and the operation name,
//! both as fields on the run's span and on the event itself.

use std::fmt::Display;
use std::time::Duration;

use tracing::{debug, info, warn, Span};
use wmr_models::{JobId, JobState};

use crate::error::TimeoutReason;

/// Structured logger for one polling run.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
    span: Span,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        let span = tracing::info_span!("job", job_id = %job_id, operation = operation);
        Self {
            job_id: job_id.clone(),
            operation,
            span,
        }
    }

    /// Span the whole run is instrumented with.
    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn started(&self, interval: Duration, timeout: Duration) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            ?interval,
            ?timeout,
            "Polling started"
        );
    }

    /// Still processing. Frequent, so debug only.
    pub fn pending(&self, attempt: u32, remote_state: &str) {
        debug!(
            job_id = %self.job_id,
            operation = self.operation,
            attempt,
            remote_state,
            "Job still processing"
        );
    }

    pub fn query_failed(&self, attempt: u32, error: &impl Display) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            attempt,
            error = %error,
            "Status query failed"
        );
    }

    pub fn gave_up(&self, attempts: u32, reason: TimeoutReason) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            attempts,
            reason = %reason,
            "Polling gave up"
        );
    }

    pub fn finished(&self, state: JobState, attempts: u32, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            state = %state,
            attempts,
            ?elapsed,
            "Job reached terminal state"
        );
    }
}
