//! Task client error types.
//!
//! [`ApiError`] classifies the outcome of a single remote call (creation or
//! status query). [`PollError`] covers the polling loop as a whole. Both map
//! onto [`ErrorKind`], the one taxonomy presentation code renders.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use wmr_models::JobId;

pub type ApiResult<T> = Result<T, ApiError>;
pub type PollResult<T> = Result<T, PollError>;

/// Transport failure flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Timeout,
    Connection,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Connection => write!(f, "connection"),
        }
    }
}

/// Classified failure of one remote call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transport {kind} error: {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("Server error {code}: {message}")]
    ServerError { code: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn transport(kind: TransportKind, msg: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: msg.into(),
        }
    }

    /// Classify a failed call.
    ///
    /// The transport status code wins when it is not a success code. Next
    /// comes the `code` field embedded in the payload. Well-known substrings
    /// of the payload message are only consulted when neither code maps to a
    /// known kind.
    pub fn classify(status: Option<u16>, payload: Option<&Value>) -> Self {
        let message = payload
            .and_then(payload_message)
            .unwrap_or_else(|| "no message provided".to_string());

        let transport_code = status.filter(|c| !(200..300).contains(c));
        let payload_code = payload.and_then(payload_code).filter(|c| *c != 200);
        let code = transport_code.or(payload_code);

        if let Some(err) = code.and_then(|c| Self::from_code(c, &message)) {
            return err;
        }
        if let Some(err) = Self::from_message(&message) {
            return err;
        }

        match code {
            Some(code) => Self::ServerError { code, message },
            None => Self::MalformedResponse(format!(
                "call failed without a status code: {}",
                message
            )),
        }
    }

    /// Map a status code (transport or payload) onto a kind.
    pub fn from_code(code: u16, message: &str) -> Option<Self> {
        let message = message.to_string();
        match code {
            401 | 403 => Some(Self::Unauthorized(message)),
            402 => Some(Self::InsufficientBalance(message)),
            429 => Some(Self::RateLimited(message)),
            400 | 404 | 405 | 409 | 413 | 422 => Some(Self::InvalidInput(message)),
            500..=599 => Some(Self::ServerError { code, message }),
            _ => None,
        }
    }

    fn from_message(message: &str) -> Option<Self> {
        let msg = message.to_lowercase();

        if msg.contains("api key") || msg.contains("unauthorized") || msg.contains("invalid token")
        {
            return Some(Self::Unauthorized(message.to_string()));
        }
        if msg.contains("insufficient") || msg.contains("balance") || msg.contains("credits") {
            return Some(Self::InsufficientBalance(message.to_string()));
        }
        if msg.contains("rate limit") || msg.contains("too many requests") {
            return Some(Self::RateLimited(message.to_string()));
        }
        None
    }

    /// Shared taxonomy kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::InsufficientBalance(_) => ErrorKind::InsufficientBalance,
            ApiError::RateLimited(_) => ErrorKind::RateLimited,
            ApiError::InvalidInput(_) => ErrorKind::InvalidInput,
            ApiError::Transport { kind, .. } => ErrorKind::Transport(*kind),
            ApiError::ServerError { code, .. } => ErrorKind::ServerError(*code),
            ApiError::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }

    /// Failures a repeated read-only query may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport { .. } | ApiError::ServerError { .. })
    }

    /// Status code equivalent, for metrics.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::InsufficientBalance(_) => Some(402),
            ApiError::RateLimited(_) => Some(429),
            ApiError::InvalidInput(_) => Some(400),
            ApiError::ServerError { code, .. } => Some(*code),
            ApiError::Transport { .. } | ApiError::MalformedResponse(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::transport(TransportKind::Timeout, e.to_string())
        } else if e.is_decode() {
            ApiError::malformed(e.to_string())
        } else if e.is_builder() {
            ApiError::invalid_input(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::classify(Some(status.as_u16()), None)
        } else {
            ApiError::transport(TransportKind::Connection, e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::malformed(e.to_string())
    }
}

fn payload_code(payload: &Value) -> Option<u16> {
    match payload.get("code")? {
        Value::Number(n) => n.as_u64().and_then(|c| u16::try_from(c).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn payload_message(payload: &Value) -> Option<String> {
    ["msg", "message", "error", "errorMessage"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Which poll bound ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    Deadline,
    Attempts,
}

impl fmt::Display for TimeoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutReason::Deadline => write!(f, "deadline reached"),
            TimeoutReason::Attempts => write!(f, "attempt limit reached"),
        }
    }
}

/// Failure of a polling run.
///
/// A job the service reports as failed is not an error; it comes back as a
/// terminal job with state `Fail`.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Polling timed out after {elapsed:?} and {attempts} queries ({reason})")]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        reason: TimeoutReason,
    },

    #[error("Status query failed {failures} times in a row: {last}")]
    QueryFailed {
        failures: u32,
        #[source]
        last: ApiError,
    },

    #[error("Job {job_id} reported success without an output URL")]
    MissingResult { job_id: JobId },

    #[error("Malformed status response: {0}")]
    MalformedResponse(String),

    #[error("Status query rejected: {0}")]
    Rejected(#[source] ApiError),

    #[error("Polling cancelled")]
    Cancelled,

    #[error("Invalid poll policy: {0}")]
    InvalidPolicy(String),
}

impl PollError {
    /// Shared taxonomy kind. `None` for caller-initiated cancellation.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PollError::Timeout { .. } => Some(ErrorKind::Timeout),
            PollError::QueryFailed { last, .. } => Some(last.kind()),
            PollError::MissingResult { .. } => Some(ErrorKind::MissingResult),
            PollError::MalformedResponse(_) => Some(ErrorKind::MalformedResponse),
            PollError::Rejected(e) => Some(e.kind()),
            PollError::InvalidPolicy(_) => Some(ErrorKind::InvalidInput),
            PollError::Cancelled => None,
        }
    }

    /// The remote service broke its response contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            PollError::MissingResult { .. } | PollError::MalformedResponse(_)
        )
    }
}

impl From<ApiError> for PollError {
    /// Map a single failed status query onto the poll taxonomy.
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::MalformedResponse(msg) => PollError::MalformedResponse(msg),
            e if e.is_transient() => PollError::QueryFailed {
                failures: 1,
                last: e,
            },
            e => PollError::Rejected(e),
        }
    }
}

/// Render-facing error taxonomy shared by submission and polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    InsufficientBalance,
    RateLimited,
    InvalidInput,
    Transport(TransportKind),
    ServerError(u16),
    MalformedResponse,
    MissingResult,
    Timeout,
}

impl ErrorKind {
    /// Short message suitable for end users.
    pub fn user_message(&self) -> String {
        match self {
            ErrorKind::Unauthorized => "Invalid API Key".to_string(),
            ErrorKind::InsufficientBalance => "Insufficient Balance".to_string(),
            ErrorKind::RateLimited => "Rate Limit Exceeded".to_string(),
            ErrorKind::InvalidInput => "Invalid input".to_string(),
            ErrorKind::Transport(TransportKind::Timeout) => "The service did not respond in time".to_string(),
            ErrorKind::Transport(TransportKind::Connection) => "Could not reach the service".to_string(),
            ErrorKind::ServerError(code) => format!("Service error ({})", code),
            ErrorKind::MalformedResponse => "The service returned an unreadable response".to_string(),
            ErrorKind::MissingResult => "Processing finished but no result was returned".to_string(),
            ErrorKind::Timeout => "Processing is taking longer than expected".to_string(),
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {var}: {message}")]
    Invalid { var: String, message: String },
}

impl ConfigError {
    pub fn invalid(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            var: var.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_known_status_codes() {
        assert!(matches!(ApiError::classify(Some(401), None), ApiError::Unauthorized(_)));
        assert!(matches!(ApiError::classify(Some(402), None), ApiError::InsufficientBalance(_)));
        assert!(matches!(ApiError::classify(Some(429), None), ApiError::RateLimited(_)));
        assert!(matches!(
            ApiError::classify(Some(500), None),
            ApiError::ServerError { code: 500, .. }
        ));
        assert!(matches!(ApiError::classify(Some(422), None), ApiError::InvalidInput(_)));
    }

    #[test]
    fn test_transport_status_wins_over_payload() {
        let payload = json!({"code": 402, "msg": "Insufficient Balance"});
        assert!(matches!(
            ApiError::classify(Some(401), Some(&payload)),
            ApiError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_classify_payload_code() {
        let payload = json!({"code": 402, "msg": "credits exhausted"});
        assert!(matches!(
            ApiError::classify(Some(200), Some(&payload)),
            ApiError::InsufficientBalance(_)
        ));

        let payload = json!({"code": "429", "msg": "slow down"});
        assert!(matches!(
            ApiError::classify(Some(200), Some(&payload)),
            ApiError::RateLimited(_)
        ));
    }

    #[test]
    fn test_classify_message_fallback() {
        let payload = json!({"code": 455, "msg": "Invalid API key supplied"});
        let err = ApiError::classify(Some(200), Some(&payload));
        assert!(matches!(err, ApiError::Unauthorized(ref m) if m.contains("API key")));

        let payload = json!({"code": 455, "msg": "maintenance window"});
        assert!(matches!(
            ApiError::classify(Some(200), Some(&payload)),
            ApiError::ServerError { code: 455, .. }
        ));
    }

    #[test]
    fn test_classify_without_any_code() {
        let payload = json!({"msg": "who knows"});
        assert!(matches!(
            ApiError::classify(None, Some(&payload)),
            ApiError::MalformedResponse(_)
        ));
    }

    #[test]
    fn test_transient_errors() {
        assert!(ApiError::transport(TransportKind::Timeout, "slow").is_transient());
        assert!(ApiError::classify(Some(503), None).is_transient());
        assert!(!ApiError::classify(Some(429), None).is_transient());
        assert!(!ApiError::malformed("bad json").is_transient());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ApiError::classify(Some(402), None).kind(), ErrorKind::InsufficientBalance);
        assert_eq!(
            ApiError::transport(TransportKind::Connection, "refused").kind(),
            ErrorKind::Transport(TransportKind::Connection)
        );

        let timeout = PollError::Timeout {
            elapsed: Duration::from_secs(1),
            attempts: 2,
            reason: TimeoutReason::Deadline,
        };
        assert_eq!(timeout.kind(), Some(ErrorKind::Timeout));
        assert_eq!(PollError::Cancelled.kind(), None);

        let failed = PollError::QueryFailed {
            failures: 3,
            last: ApiError::classify(Some(502), None),
        };
        assert_eq!(failed.kind(), Some(ErrorKind::ServerError(502)));
    }

    #[test]
    fn test_contract_violations_distinguishable() {
        assert!(PollError::MissingResult { job_id: JobId::from("t") }.is_contract_violation());
        assert!(PollError::MalformedResponse("x".into()).is_contract_violation());
        assert!(!PollError::Cancelled.is_contract_violation());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(ErrorKind::Unauthorized.user_message(), "Invalid API Key");
        assert_eq!(ErrorKind::ServerError(503).user_message(), "Service error (503)");
    }
}
