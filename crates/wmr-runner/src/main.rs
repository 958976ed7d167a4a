//! Watermark removal runner binary.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wmr_client::{JobHandle, PollPolicy, SubmitOptions, TaskClient};
use wmr_models::{JobBook, JobId};
use wmr_runner::{report, submit_all, wait_all, Cli, Command, JobOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Colored output for dev, JSON for production.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wmr=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

/// Run one command. Returns `Ok(false)` when any job did not succeed.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let client = TaskClient::from_env().context("Failed to configure task client")?;
    info!(config = ?client.config(), "Task client ready");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling jobs");
            shutdown.cancel();
        }
    });

    let mut book = JobBook::new();

    match cli.command {
        Command::Submit {
            urls,
            callback_url,
            priority,
            no_wait,
        } => {
            let options = SubmitOptions {
                callback_url,
                priority,
            };

            let submitted = submit_all(&client, &mut book, &urls, &options, &cancel).await;
            let mut all_ok = submitted.len() == urls.len();
            let mut handles = Vec::new();

            for (input, result) in submitted {
                match result {
                    Ok(handle) => {
                        if no_wait {
                            if cli.json {
                                println!(
                                    "{}",
                                    serde_json::json!({"id": handle.id, "input": input, "state": "waiting"})
                                );
                            } else {
                                println!("{}  submitted  {}", handle.id, input);
                            }
                        }
                        handles.push(handle);
                    }
                    Err(e) => {
                        all_ok = false;
                        if cli.json {
                            println!("{}", report::submit_error_json(&input, &e));
                        } else {
                            println!("{}", report::submit_error_line(&input, &e));
                        }
                    }
                }
            }

            if no_wait || handles.is_empty() {
                return Ok(all_ok);
            }

            let policy = PollPolicy::from_env().context("Invalid poll policy")?;
            let outcomes = wait_all(&client, &mut book, handles, &policy, &cancel).await;
            Ok(print_outcomes(&outcomes, cli.json) && all_ok)
        }

        Command::Status { task_id } => {
            let handle = JobHandle::existing(JobId::from_string(task_id), client.primary_endpoint());
            let result = client.query_status(&handle).await;
            if cli.json {
                println!("{}", report::status_json(&handle, &result));
            } else {
                println!("{}", report::status_line(&handle, &result));
            }
            Ok(result.is_ok())
        }

        Command::Wait { task_ids } => {
            let handles = task_ids
                .into_iter()
                .map(|id| JobHandle::existing(JobId::from_string(id), client.primary_endpoint()))
                .collect();

            let policy = PollPolicy::from_env().context("Invalid poll policy")?;
            let outcomes = wait_all(&client, &mut book, handles, &policy, &cancel).await;
            Ok(print_outcomes(&outcomes, cli.json))
        }
    }
}

/// Print one line per outcome. Returns whether every job succeeded.
fn print_outcomes(outcomes: &[JobOutcome], json: bool) -> bool {
    for outcome in outcomes {
        if json {
            println!("{}", report::outcome_json(&outcome.handle, &outcome.result));
        } else {
            println!("{}", report::outcome_line(&outcome.handle, &outcome.result));
        }
    }
    outcomes.iter().all(JobOutcome::is_success)
}
