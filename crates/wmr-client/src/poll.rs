//! Status polling loop.
//!
//! Queries a job until the service reports a terminal state, a policy bound
//! runs out, the transient-failure budget is spent, or the caller cancels.
//! Cancellation is observed before every query and every sleep, and both
//! are raced against the token so an abandoned poll returns promptly.

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use wmr_models::TerminalJob;

use crate::error::{ApiResult, PollError, PollResult, TimeoutReason};
use crate::logging::JobLogger;
use crate::metrics::{record_terminal, record_transient_failure};
use crate::normalize::normalize;
use crate::policy::{PollPolicy, TransientBudget};
use crate::types::{JobHandle, StatusSnapshot};

/// Anything that can answer a single status query for a job.
///
/// Implementations return the raw status payload on success and a
/// classified [`ApiError`] otherwise.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn query(&self, handle: &JobHandle) -> ApiResult<Value>;
}

/// Poll `handle` until it reaches `Success` or `Fail`.
///
/// A job that fails remotely is returned as `Ok` with state `Fail`.
pub async fn poll_until_terminal<S>(
    source: &S,
    handle: &JobHandle,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> PollResult<TerminalJob>
where
    S: StatusSource + ?Sized,
{
    policy.validate()?;

    let logger = JobLogger::new(&handle.id, "poll");
    let span = logger.span();

    run_loop(source, handle, policy, cancel, &logger)
        .instrument(span)
        .await
}

async fn run_loop<S>(
    source: &S,
    handle: &JobHandle,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    logger: &JobLogger,
) -> PollResult<TerminalJob>
where
    S: StatusSource + ?Sized,
{
    let start = Instant::now();
    let deadline = start
        .checked_add(policy.timeout)
        .ok_or_else(|| PollError::InvalidPolicy("timeout is out of range".into()))?;
    let mut attempts = 0u32;
    let mut budget = TransientBudget::new(policy.max_transient_failures);

    logger.started(policy.interval, policy.timeout);

    let timed_out = |attempts: u32, reason: TimeoutReason| {
        logger.gave_up(attempts, reason);
        PollError::Timeout {
            elapsed: start.elapsed(),
            attempts,
            reason,
        }
    };

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        if Instant::now() >= deadline {
            return Err(timed_out(attempts, TimeoutReason::Deadline));
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            res = tokio::time::timeout_at(deadline, source.query(handle)) => match res {
                Ok(outcome) => outcome,
                Err(_) => return Err(timed_out(attempts, TimeoutReason::Deadline)),
            },
        };

        match outcome {
            Ok(payload) => {
                budget.record_success();
                match normalize(&handle.id, &payload)? {
                    StatusSnapshot::Terminal(job) => {
                        record_terminal(job.state.as_str());
                        logger.finished(job.state, attempts, start.elapsed());
                        return Ok(job);
                    }
                    StatusSnapshot::Pending { remote_state } => {
                        logger.pending(attempts, &remote_state);
                    }
                }
            }
            Err(e) if e.is_transient() => {
                record_transient_failure();
                logger.query_failed(attempts, &e);
                if budget.record_failure() {
                    return Err(PollError::QueryFailed {
                        failures: budget.failure_count(),
                        last: e,
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }

        if attempts >= policy.max_attempts {
            return Err(timed_out(attempts, TimeoutReason::Attempts));
        }

        let delay = policy.delay_after(attempts);
        match Instant::now().checked_add(delay) {
            Some(next) if next < deadline => {}
            _ => return Err(timed_out(attempts, TimeoutReason::Deadline)),
        }

        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
