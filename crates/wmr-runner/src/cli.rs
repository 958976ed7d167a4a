//! Command-line interface.

use clap::{Parser, Subcommand};

/// Submit videos for watermark removal and wait for the results.
#[derive(Debug, Parser)]
#[command(name = "wmr-runner", version, about)]
pub struct Cli {
    /// Print one JSON object per job instead of a text line
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit one or more videos and wait for each to finish
    Submit {
        /// Public URLs of the input videos
        #[arg(required = true)]
        urls: Vec<String>,

        /// URL the service calls when a job finishes
        #[arg(long)]
        callback_url: Option<String>,

        /// Scheduling hint passed through to the service
        #[arg(long)]
        priority: Option<String>,

        /// Print task IDs and exit without polling
        #[arg(long)]
        no_wait: bool,
    },

    /// Query the current status of a job once
    Status {
        /// Remote task ID
        task_id: String,
    },

    /// Wait for jobs submitted earlier
    Wait {
        /// Remote task IDs
        #[arg(required = true)]
        task_ids: Vec<String>,
    },
}
