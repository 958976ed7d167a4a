//! Status payload normalization.
//!
//! The status response shape is not stable across integration points: the
//! output URLs may sit inside the `resultJson` string, directly on `data`, or
//! one level deeper, and under several key names. Everything here reduces a
//! raw payload to a [`StatusSnapshot`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use wmr_models::{JobFailure, JobId, JobState, TerminalJob};

use crate::error::PollError;
use crate::types::StatusSnapshot;

/// Output-locator keys, highest priority first.
pub const RESULT_URL_KEYS: &[&str] = &[
    "resultUrls",
    "result_urls",
    "resultUrl",
    "result_url",
    "videoUrls",
    "videoUrl",
    "video_url",
    "outputUrls",
    "output_url",
    "urls",
    "url",
];

/// Objects under `data` that may hold the output locators.
const NESTED_RESULT_KEYS: &[&str] = &["response", "result", "output"];

const FAIL_MESSAGE_KEYS: &[&str] = &["failMsg", "errorMessage", "failReason", "error"];
const FAIL_CODE_KEYS: &[&str] = &["failCode", "errorCode"];

const NO_FAIL_MESSAGE: &str = "No error message provided.";

/// Reduce a status payload to a snapshot.
///
/// Accepts either the full envelope (`{"code": .., "data": {..}}`) or the
/// bare `data` object. A job marked successful without any extractable
/// output URL yields [`PollError::MissingResult`].
pub fn normalize(job_id: &JobId, payload: &Value) -> Result<StatusSnapshot, PollError> {
    let data = match payload.get("data") {
        Some(data) if data.is_object() => data,
        Some(Value::Null) | None if payload.get("state").is_some() => payload,
        _ => {
            return Err(PollError::MalformedResponse(
                "status payload has no data object".to_string(),
            ))
        }
    };

    if let Some(remote_id) = data.get("taskId").and_then(Value::as_str) {
        if remote_id != job_id.as_str() {
            warn!(
                job_id = %job_id,
                remote_id = %remote_id,
                "Status payload reports a different task ID"
            );
        }
    }

    let raw_state = data
        .get("state")
        .or_else(|| data.get("status"))
        .and_then(Value::as_str)
        .ok_or_else(|| PollError::MalformedResponse("status payload has no state".to_string()))?;

    let state = match JobState::parse_remote(raw_state) {
        Some(state) => state,
        None => {
            warn!(job_id = %job_id, state = %raw_state, "Unrecognized remote state, treating as pending");
            JobState::Waiting
        }
    };

    let created_at = data.get("createTime").and_then(epoch_millis);
    let completed_at = data.get("completeTime").and_then(epoch_millis);

    match state {
        JobState::Success => {
            let urls = extract_result_urls(data)?;
            let elapsed = data.get("costTime").and_then(as_f64).map(|ms| ms / 1000.0);

            let job = TerminalJob::success(job_id.clone(), urls)
                .ok_or_else(|| PollError::MissingResult {
                    job_id: job_id.clone(),
                })?
                .with_times(created_at, completed_at)
                .with_elapsed(elapsed);
            Ok(StatusSnapshot::Terminal(job))
        }
        JobState::Fail => {
            let message = first_string(data, FAIL_MESSAGE_KEYS)
                .unwrap_or_else(|| NO_FAIL_MESSAGE.to_string());
            let code = first_string(data, FAIL_CODE_KEYS);

            let job = TerminalJob::failed(job_id.clone(), JobFailure::new(message, code))
                .with_times(created_at, completed_at);
            Ok(StatusSnapshot::Terminal(job))
        }
        JobState::Waiting | JobState::Unknown => Ok(StatusSnapshot::Pending {
            remote_state: raw_state.to_string(),
        }),
    }
}

/// Collect output URLs from the first source that has any.
///
/// Sources in order: the decoded `resultJson`, `data` itself, then the
/// nested objects in [`NESTED_RESULT_KEYS`]. Returns an empty list when no
/// source yields a URL; fails only if `resultJson` is present but not JSON.
pub fn extract_result_urls(data: &Value) -> Result<Vec<String>, PollError> {
    let decoded = match data.get("resultJson") {
        Some(Value::String(raw)) if !raw.trim().is_empty() => {
            Some(serde_json::from_str::<Value>(raw).map_err(|e| {
                PollError::MalformedResponse(format!("resultJson is not valid JSON: {}", e))
            })?)
        }
        Some(obj @ Value::Object(_)) => Some(obj.clone()),
        _ => None,
    };

    let sources = decoded
        .iter()
        .chain(std::iter::once(data))
        .chain(NESTED_RESULT_KEYS.iter().filter_map(|key| data.get(*key)));

    for source in sources {
        if let Some(urls) = locators_in(source) {
            return Ok(urls);
        }
    }
    Ok(Vec::new())
}

/// First key in priority order holding a non-empty string or string list.
fn locators_in(source: &Value) -> Option<Vec<String>> {
    RESULT_URL_KEYS.iter().find_map(|key| {
        let urls: Vec<String> = match source.get(*key)? {
            Value::String(s) => vec![s.trim().to_string()],
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .collect(),
            _ => return None,
        };
        let urls: Vec<String> = urls.into_iter().filter(|s| !s.is_empty()).collect();
        (!urls.is_empty()).then_some(urls)
    })
}

fn first_string(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn epoch_millis(value: &Value) -> Option<DateTime<Utc>> {
    let ms = as_f64(value)?;
    DateTime::from_timestamp_millis(ms as i64)
}
