//! Job orchestration for the runner: submit inputs, then poll every job in
//! its own task while a single [`JobBook`] records the outcomes.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wmr_client::{ApiResult, JobHandle, PollPolicy, PollResult, SubmitOptions, TaskClient};
use wmr_models::{JobBook, TerminalJob};

/// Outcome of one polling run.
#[derive(Debug)]
pub struct JobOutcome {
    pub handle: JobHandle,
    pub result: PollResult<TerminalJob>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(job) if job.is_success())
    }
}

/// Submit each input once, in order.
///
/// Creation is billable, so inputs are sent one at a time and a failed
/// submission is reported rather than retried. Stops early when `cancel`
/// fires; inputs not yet sent are skipped.
pub async fn submit_all(
    client: &TaskClient,
    book: &mut JobBook,
    inputs: &[String],
    options: &SubmitOptions,
    cancel: &CancellationToken,
) -> Vec<(String, ApiResult<JobHandle>)> {
    let mut submitted = Vec::with_capacity(inputs.len());

    for input in inputs {
        if cancel.is_cancelled() {
            warn!(remaining = inputs.len() - submitted.len(), "Submission cancelled");
            break;
        }

        let result = client.submit(input, options).await;
        match &result {
            Ok(handle) => TaskClient::track(book, handle),
            Err(e) => error!(input = %input, error = %e, "Submission failed"),
        }
        submitted.push((input.clone(), result));
    }

    submitted
}

/// Poll every handle concurrently and record each outcome in `book`.
///
/// Outcomes are returned in completion order. Cancelling `cancel` stops all
/// polls; their outcomes come back as cancelled.
pub async fn wait_all(
    client: &TaskClient,
    book: &mut JobBook,
    handles: Vec<JobHandle>,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Vec<JobOutcome> {
    let mut set = JoinSet::new();

    for handle in handles {
        TaskClient::track(book, &handle);

        let client = client.clone();
        let policy = policy.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let result = client.poll_until_terminal(&handle, &policy, &cancel).await;
            JobOutcome { handle, result }
        });
    }

    info!(jobs = set.len(), "Waiting for jobs");

    let mut outcomes = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => {
                TaskClient::record_outcome(book, &outcome.handle, &outcome.result);
                outcomes.push(outcome);
            }
            Err(e) => error!(error = %e, "Polling task aborted"),
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use wmr_client::{ClientConfig, PollError};
    use wmr_models::{JobId, JobState};

    fn client_for(server: &MockServer) -> TaskClient {
        TaskClient::new(ClientConfig::new("test-key").with_endpoints([server.uri()])).unwrap()
    }

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(10), Duration::from_secs(5), 50)
    }

    #[tokio::test]
    async fn test_submit_all_tracks_accepted_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/createTask"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 200, "data": {"taskId": "task_a"}})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut book = JobBook::new();
        let inputs = vec![
            "https://a.example/1.mp4".to_string(),
            "ftp://a.example/2.mp4".to_string(),
            "https://a.example/3.mp4".to_string(),
        ];

        let submitted = submit_all(
            &client,
            &mut book,
            &inputs,
            &SubmitOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(submitted.len(), 3);
        assert!(submitted[0].1.is_ok());
        assert!(submitted[1].1.is_err());
        // Both accepted submissions share one task ID, so the book keeps one record
        assert_eq!(book.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_all_records_each_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recordInfo"))
            .and(query_param("taskId", "task_ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"taskId": "task_ok", "state": "success", "resultJson": "{\"resultUrls\":[\"https://cdn/ok.mp4\"]}"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/recordInfo"))
            .and(query_param("taskId", "task_bad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"taskId": "task_bad", "state": "fail", "failMsg": "corrupt input"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut book = JobBook::new();
        let handles = vec![
            JobHandle::existing(JobId::from("task_ok"), server.uri()),
            JobHandle::existing(JobId::from("task_bad"), server.uri()),
        ];

        let outcomes = wait_all(&client, &mut book, handles, &policy(), &CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 1);
        assert_eq!(book.get(&JobId::from("task_ok")).unwrap().state, JobState::Success);
        assert_eq!(book.get(&JobId::from("task_bad")).unwrap().state, JobState::Fail);
    }

    #[tokio::test]
    async fn test_wait_all_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recordInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"taskId": "task_1", "state": "waiting"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut book = JobBook::new();
        let cancel = CancellationToken::new();
        let handles = vec![JobHandle::existing(JobId::from("task_1"), server.uri())];

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let slow = PollPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 100);
        let outcomes = wait_all(&client, &mut book, handles, &slow, &cancel).await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].result, Err(PollError::Cancelled)));
        assert_eq!(book.get(&JobId::from("task_1")).unwrap().state, JobState::Waiting);
    }
}
