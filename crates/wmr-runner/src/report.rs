//! Per-job output: one text line or one JSON object.

use serde_json::{json, Value};
use wmr_client::{ApiError, JobHandle, PollError, PollResult, StatusSnapshot};
use wmr_models::{JobState, TerminalJob};

/// Text line for a finished polling run.
pub fn outcome_line(handle: &JobHandle, result: &PollResult<TerminalJob>) -> String {
    match result {
        Ok(job) => terminal_line(handle, job),
        Err(e) => error_line(handle, e),
    }
}

/// JSON object for a finished polling run.
pub fn outcome_json(handle: &JobHandle, result: &PollResult<TerminalJob>) -> Value {
    match result {
        Ok(job) => terminal_json(handle, job),
        Err(e) => error_json(handle, e),
    }
}

/// Text line for a single status query. A failed query renders like a
/// failed polling run.
pub fn status_line(handle: &JobHandle, result: &PollResult<StatusSnapshot>) -> String {
    match result {
        Ok(StatusSnapshot::Pending { remote_state }) => {
            format!("{}  {}  (remote: {})", handle.id, JobState::Waiting, remote_state)
        }
        Ok(StatusSnapshot::Terminal(job)) => terminal_line(handle, job),
        Err(e) => error_line(handle, e),
    }
}

pub fn status_json(handle: &JobHandle, result: &PollResult<StatusSnapshot>) -> Value {
    match result {
        Ok(StatusSnapshot::Pending { remote_state }) => json!({
            "id": handle.id,
            "state": JobState::Waiting,
            "remote_state": remote_state,
        }),
        Ok(StatusSnapshot::Terminal(job)) => terminal_json(handle, job),
        Err(e) => error_json(handle, e),
    }
}

fn terminal_line(handle: &JobHandle, job: &TerminalJob) -> String {
    if job.is_success() {
        let mut line = format!("{}  success  {}", handle.id, job.result.join(" "));
        if let Some(secs) = job.elapsed_processing_time {
            line.push_str(&format!("  ({:.1}s)", secs));
        }
        return line;
    }

    let reason = job
        .error
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!("{}  fail  {}", handle.id, reason)
}

fn terminal_json(handle: &JobHandle, job: &TerminalJob) -> Value {
    let mut value = json!({ "input": handle.input_reference });
    if let (Value::Object(out), Ok(Value::Object(fields))) = (&mut value, serde_json::to_value(job)) {
        out.extend(fields);
    }
    value
}

fn error_line(handle: &JobHandle, err: &PollError) -> String {
    match err.kind() {
        Some(kind) => format!("{}  error  {}: {}", handle.id, kind.user_message(), err),
        None => format!("{}  cancelled", handle.id),
    }
}

fn error_json(handle: &JobHandle, err: &PollError) -> Value {
    let state = if err.kind().is_some() { "error" } else { "cancelled" };
    json!({
        "id": handle.id,
        "input": handle.input_reference,
        "state": state,
        "error": {
            "kind": err.kind().map(|k| format!("{:?}", k)),
            "message": err.to_string(),
            "user_message": err.kind().map(|k| k.user_message()),
        },
    })
}

/// Text line for a failed submission.
pub fn submit_error_line(input: &str, err: &ApiError) -> String {
    format!("{}  error  {}: {}", input, err.kind().user_message(), err)
}

pub fn submit_error_json(input: &str, err: &ApiError) -> Value {
    json!({
        "input": input,
        "state": "error",
        "error": {
            "kind": format!("{:?}", err.kind()),
            "message": err.to_string(),
            "user_message": err.kind().user_message(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmr_client::TimeoutReason;
    use wmr_models::{JobFailure, JobId};

    fn handle() -> JobHandle {
        let mut handle = JobHandle::existing(JobId::from("task_1"), "https://api.example/jobs");
        handle.input_reference = "https://a.example/1.mp4".into();
        handle
    }

    fn success() -> TerminalJob {
        TerminalJob::success(JobId::from("task_1"), vec!["https://cdn.example/out.mp4".into()])
            .unwrap()
            .with_elapsed(Some(12.34))
    }

    #[test]
    fn test_success_line() {
        let line = outcome_line(&handle(), &Ok(success()));
        assert_eq!(line, "task_1  success  https://cdn.example/out.mp4  (12.3s)");
    }

    #[test]
    fn test_fail_line() {
        let job = TerminalJob::failed(
            JobId::from("task_1"),
            JobFailure::new("no watermark found", Some("422".into())),
        );
        assert_eq!(
            outcome_line(&handle(), &Ok(job)),
            "task_1  fail  no watermark found (422)"
        );
    }

    #[test]
    fn test_error_and_cancelled_lines() {
        let timeout = PollError::Timeout {
            elapsed: std::time::Duration::from_secs(600),
            attempts: 120,
            reason: TimeoutReason::Deadline,
        };
        let line = outcome_line(&handle(), &Err(timeout));
        assert!(line.starts_with("task_1  error  Processing is taking longer than expected"));

        assert_eq!(
            outcome_line(&handle(), &Err(PollError::Cancelled)),
            "task_1  cancelled"
        );
    }

    #[test]
    fn test_success_json_carries_input_and_result() {
        let value = outcome_json(&handle(), &Ok(success()));
        assert_eq!(value["id"], "task_1");
        assert_eq!(value["state"], "success");
        assert_eq!(value["input"], "https://a.example/1.mp4");
        assert_eq!(value["result"][0], "https://cdn.example/out.mp4");
    }

    #[test]
    fn test_error_json() {
        let err = PollError::Rejected(ApiError::RateLimited("slow down".into()));
        let value = outcome_json(&handle(), &Err(err));
        assert_eq!(value["state"], "error");
        assert_eq!(value["error"]["kind"], "RateLimited");
        assert_eq!(value["error"]["user_message"], "Rate Limit Exceeded");
    }

    #[test]
    fn test_pending_status_line() {
        let snapshot = StatusSnapshot::Pending {
            remote_state: "generating".into(),
        };
        assert_eq!(
            status_line(&handle(), &Ok(snapshot)),
            "task_1  waiting  (remote: generating)"
        );
    }

    #[test]
    fn test_failed_status_query_is_reported() {
        let result = Err(PollError::Rejected(ApiError::Unauthorized("bad key".into())));

        let line = status_line(&handle(), &result);
        assert!(line.starts_with("task_1  error  Invalid API Key"));

        let value = status_json(&handle(), &result);
        assert_eq!(value["state"], "error");
        assert_eq!(value["error"]["kind"], "Unauthorized");
    }
}
