//! Remote job API HTTP client.
//!
//! Stateless apart from configuration: every call carries its own job handle
//! and policy, so one client can be shared by many concurrent callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use validator::Validate;
use wmr_models::{Job, JobBook, JobId, TerminalJob};

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult, ConfigError, PollError, PollResult};
use crate::metrics::record_request;
use crate::normalize::normalize;
use crate::poll::{self, StatusSource};
use crate::policy::PollPolicy;
use crate::types::{
    CreateTaskData, CreateTaskRequest, JobHandle, StatusSnapshot, SubmitOptions, TaskInput,
};
use crate::validation::{InputPolicy, InputValidator};

/// Longest response body excerpt kept in error messages.
const BODY_EXCERPT_LEN: usize = 200;

/// Result of a creation attempt against one candidate endpoint.
#[derive(Debug)]
enum CreateOutcome {
    Created(String),
    /// The endpoint provably did not accept the request; the next candidate may be tried.
    /// `status` is `0` when the connection was refused.
    NotAccepted { status: u16, error: ApiError },
}

/// Status code recorded in request metrics for a successful call.
trait RecordedStatus {
    fn recorded_status(&self) -> u16;
}

impl RecordedStatus for Value {
    fn recorded_status(&self) -> u16 {
        200
    }
}

impl RecordedStatus for CreateOutcome {
    fn recorded_status(&self) -> u16 {
        match self {
            CreateOutcome::Created(_) => 200,
            CreateOutcome::NotAccepted { status, .. } => *status,
        }
    }
}

/// Client for the remote watermark removal job API.
#[derive(Clone)]
pub struct TaskClient {
    http: Client,
    config: ClientConfig,
    validator: Arc<dyn InputValidator>,
}

impl TaskClient {
    /// Create a new client with the default [`InputPolicy`].
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("wmr-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::invalid("http_client", e.to_string()))?;

        Ok(Self {
            http,
            config,
            validator: Arc::new(InputPolicy::default()),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Replace the input validation predicate.
    pub fn with_validator(mut self, validator: impl InputValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Endpoint used for jobs not created through this client.
    pub fn primary_endpoint(&self) -> &str {
        // validate() guarantees at least one candidate
        self.config
            .candidate_endpoints
            .first()
            .map(String::as_str)
            .unwrap_or(crate::config::DEFAULT_BASE_URL)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Create a remote job for `input_reference`.
    ///
    /// Sends at most one creation request per candidate endpoint and moves to
    /// the next candidate only when the previous one could not have accepted
    /// the request (connection refused, or no such route). Every other
    /// failure is returned as-is: creation is billable and not idempotent.
    pub async fn submit(
        &self,
        input_reference: &str,
        options: &SubmitOptions,
    ) -> ApiResult<JobHandle> {
        let input = input_reference.trim();
        self.validator
            .validate(input)
            .map_err(ApiError::InvalidInput)?;
        options
            .validate()
            .map_err(|e| ApiError::invalid_input(e.to_string()))?;

        let body = CreateTaskRequest {
            model: &self.config.model,
            input: TaskInput { video_url: input },
            callback_url: options.callback_url.as_deref(),
            priority: options.priority.as_deref(),
        };

        let mut last_error = None;
        for endpoint in &self.config.candidate_endpoints {
            match self.create_at(endpoint, &body).await? {
                CreateOutcome::Created(task_id) => {
                    info!(task_id = %task_id, endpoint = %endpoint, "Job submitted");
                    return Ok(JobHandle {
                        id: JobId::from_string(task_id),
                        input_reference: input.to_string(),
                        endpoint: endpoint.clone(),
                        submitted_at: Utc::now(),
                    });
                }
                CreateOutcome::NotAccepted { status, error } => {
                    warn!(endpoint = %endpoint, status, error = %error, "Endpoint did not accept job, trying next candidate");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::invalid_input("no candidate endpoints configured")))
    }

    async fn create_at(
        &self,
        endpoint: &str,
        body: &CreateTaskRequest<'_>,
    ) -> ApiResult<CreateOutcome> {
        let url = format!("{}/createTask", endpoint);

        self.execute_request("create_task", endpoint, async {
            let response = match self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_connect() => {
                    return Ok(CreateOutcome::NotAccepted {
                        status: 0,
                        error: e.into(),
                    })
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if matches!(status, StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED) {
                let payload = Self::error_payload(response).await;
                return Ok(CreateOutcome::NotAccepted {
                    status: status.as_u16(),
                    error: ApiError::classify(Some(status.as_u16()), Some(&payload)),
                });
            }

            let payload = Self::read_envelope(response).await?;
            let data: CreateTaskData = payload
                .get("data")
                .cloned()
                .ok_or_else(|| ApiError::malformed("creation response has no data object"))
                .and_then(|data| serde_json::from_value(data).map_err(ApiError::from))?;

            if data.task_id.trim().is_empty() {
                return Err(ApiError::malformed("creation response has an empty taskId"));
            }
            Ok(CreateOutcome::Created(data.task_id))
        })
        .await
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Fetch the raw status payload once.
    pub async fn fetch_status(&self, handle: &JobHandle) -> ApiResult<Value> {
        let url = format!("{}/recordInfo", handle.endpoint);

        self.execute_request("record_info", &handle.endpoint, async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.config.api_key)
                .query(&[("taskId", handle.id.as_str())])
                .send()
                .await?;
            Self::read_envelope(response).await
        })
        .await
    }

    /// Query and normalize the job status once.
    pub async fn query_status(&self, handle: &JobHandle) -> PollResult<StatusSnapshot> {
        let payload = self.fetch_status(handle).await?;
        normalize(&handle.id, &payload)
    }

    /// Poll until the job reaches a terminal state. See [`poll::poll_until_terminal`].
    pub async fn poll_until_terminal(
        &self,
        handle: &JobHandle,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> PollResult<TerminalJob> {
        poll::poll_until_terminal(self, handle, policy, cancel).await
    }

    /// Poll and record the outcome in a caller-owned [`JobBook`].
    ///
    /// The job is added to the book if it is not tracked yet. When the status
    /// query budget runs out the record is marked `Unknown`.
    pub async fn poll_into(
        &self,
        book: &mut JobBook,
        handle: &JobHandle,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> PollResult<TerminalJob> {
        Self::track(book, handle);
        let result = self.poll_until_terminal(handle, policy, cancel).await;
        Self::record_outcome(book, handle, &result);
        result
    }

    /// Add `handle` to `book` unless it is already tracked.
    pub fn track(book: &mut JobBook, handle: &JobHandle) {
        if book.get(&handle.id).is_some() {
            return;
        }
        let job = Job::new(
            handle.id.clone(),
            handle.input_reference.clone(),
            handle.submitted_at,
        );
        // Cannot be a duplicate: presence was checked above
        let _ = book.insert(job);
    }

    /// Apply the result of a polling run to the job's record in `book`.
    ///
    /// Errors other than an exhausted query budget leave the record as is.
    pub fn record_outcome(book: &mut JobBook, handle: &JobHandle, result: &PollResult<TerminalJob>) {
        match result {
            Ok(outcome) => {
                if let Err(e) = book.apply_terminal(outcome) {
                    warn!(job_id = %handle.id, error = %e, "Could not record terminal outcome");
                }
            }
            Err(PollError::QueryFailed { .. }) => {
                if let Some(job) = book.get_mut(&handle.id) {
                    let _ = job.mark_unknown();
                }
            }
            Err(_) => {}
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Run one request inside a span and record its metrics.
    async fn execute_request<T, F>(&self, operation: &str, endpoint: &str, fut: F) -> ApiResult<T>
    where
        T: RecordedStatus,
        F: std::future::Future<Output = ApiResult<T>>,
    {
        let span = info_span!("wmr_request", operation = %operation, endpoint = %endpoint);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(value) => value.recorded_status(),
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(operation, status, latency_ms);
        debug!(operation = %operation, status, latency_ms, "Remote request finished");

        result
    }

    /// Read a JSON envelope and check both the transport and payload codes.
    async fn read_envelope(response: Response) -> ApiResult<Value> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let payload: Value =
                serde_json::from_str(&text).unwrap_or_else(|_| json!({ "msg": excerpt(&text) }));
            return Err(ApiError::classify(Some(status.as_u16()), Some(&payload)));
        }

        let payload: Value = serde_json::from_str(&text).map_err(|e| {
            ApiError::malformed(format!("response is not JSON ({}): {}", e, excerpt(&text)))
        })?;

        match payload.get("code") {
            None => Err(ApiError::malformed("response has no code field")),
            Some(code) if code.as_u64() == Some(200) || code.as_str() == Some("200") => Ok(payload),
            Some(_) => Err(ApiError::classify(Some(status.as_u16()), Some(&payload))),
        }
    }

    async fn error_payload(response: Response) -> Value {
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str(&text).unwrap_or_else(|_| json!({ "msg": excerpt(&text) }))
    }
}

#[async_trait]
impl StatusSource for TaskClient {
    async fn query(&self, handle: &JobHandle) -> ApiResult<Value> {
        self.fetch_status(handle).await
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_LEN).collect()
}
