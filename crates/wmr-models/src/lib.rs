//! Shared job data models for the watermark removal task client.
//!
//! This crate provides Serde-serializable types for:
//! - Remote job identifiers and lifecycle states
//! - Terminal outcomes extracted from status payloads
//! - A caller-owned collection of job records

pub mod book;
pub mod job;

// Re-export common types
pub use book::{BookError, JobBook};
pub use job::{Job, JobFailure, JobId, JobState, TerminalJob, TransitionError};
