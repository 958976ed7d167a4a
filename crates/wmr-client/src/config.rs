//! Client configuration.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Default job API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.kie.ai/api/v1/jobs";

/// Default model identifier sent on job creation.
pub const DEFAULT_MODEL: &str = "sora-watermark-remover";

/// Configuration for [`TaskClient`](crate::TaskClient).
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer token for the remote service
    pub api_key: String,
    /// Base URLs to try for job creation, in priority order
    pub candidate_endpoints: Vec<String>,
    /// Model identifier sent on job creation
    pub model: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Config with default endpoint, model and timeouts.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            candidate_endpoints: vec![DEFAULT_BASE_URL.to_string()],
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Replace the candidate endpoint list.
    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidate_endpoints = endpoints
            .into_iter()
            .map(|e| e.into().trim_end_matches('/').to_string())
            .collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("WMR_API_KEY")
            .map_err(|_| ConfigError::Missing("WMR_API_KEY must be set".to_string()))?;

        if api_key.trim().is_empty() {
            return Err(ConfigError::invalid("WMR_API_KEY", "cannot be empty"));
        }

        let mut config = Self::new(api_key.trim());

        if let Ok(raw) = std::env::var("WMR_API_BASE_URLS") {
            let endpoints: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if endpoints.is_empty() {
                return Err(ConfigError::invalid(
                    "WMR_API_BASE_URLS",
                    "must list at least one URL",
                ));
            }
            config = config.with_endpoints(endpoints);
        }

        if let Ok(model) = std::env::var("WMR_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }

        config.request_timeout = Duration::from_secs(env_secs("WMR_REQUEST_TIMEOUT_SECS", 15)?);
        config.connect_timeout = Duration::from_secs(env_secs("WMR_CONNECT_TIMEOUT_SECS", 5)?);

        config.validate()?;
        Ok(config)
    }

    /// Check that every candidate endpoint is an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candidate_endpoints.is_empty() {
            return Err(ConfigError::invalid(
                "candidate_endpoints",
                "at least one endpoint is required",
            ));
        }

        for endpoint in &self.candidate_endpoints {
            let parsed = url::Url::parse(endpoint)
                .map_err(|e| ConfigError::invalid("candidate_endpoints", format!("{}: {}", endpoint, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(
                    "candidate_endpoints",
                    format!("{}: unsupported scheme", endpoint),
                ));
            }
        }
        Ok(())
    }
}

// Keeps the API key out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("candidate_endpoints", &self.candidate_endpoints)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

pub(crate) fn env_secs(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(var, format!("expected whole seconds, got {:?}", raw))),
        Err(_) => Ok(default),
    }
}
