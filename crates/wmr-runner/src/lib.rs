//! Command-line runner for watermark removal jobs.
//!
//! This crate provides:
//! - Argument parsing for the `submit`, `status` and `wait` commands
//! - Concurrent polling of many jobs with shared cancellation
//! - Text and JSON reporting of job outcomes

pub mod cli;
pub mod jobs;
pub mod report;

pub use cli::{Cli, Command};
pub use jobs::{submit_all, wait_all, JobOutcome};
