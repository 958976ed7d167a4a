//! Caller-owned collection of job records.
//!
//! The task client itself is stateless. Callers that track several jobs
//! (a dashboard, a batch runner) keep them here and feed terminal outcomes
//! back in as polls complete.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Job, JobId, TerminalJob, TransitionError};

/// Errors from [`JobBook`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("Job already tracked: {0}")]
    Duplicate(JobId),

    #[error("Job not tracked: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Ordered set of jobs, newest first.
///
/// Deserialization goes through [`JobBook::insert`], so a stored book with a
/// repeated job ID is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "StoredBook")]
pub struct JobBook {
    jobs: Vec<Job>,
}

#[derive(Deserialize)]
struct StoredBook {
    jobs: Vec<Job>,
}

impl TryFrom<StoredBook> for JobBook {
    type Error = BookError;

    fn try_from(stored: StoredBook) -> Result<Self, Self::Error> {
        let mut book = JobBook::new();
        // Stored newest first; insert oldest first to keep that order
        for job in stored.jobs.into_iter().rev() {
            book.insert(job)?;
        }
        Ok(book)
    }
}

impl JobBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new job. It is placed ahead of every existing entry.
    pub fn insert(&mut self, job: Job) -> Result<(), BookError> {
        if self.get(&job.id).is_some() {
            return Err(BookError::Duplicate(job.id));
        }
        self.jobs.insert(0, job);
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| &j.id == id)
    }

    /// Stop tracking a job and hand its record back.
    pub fn remove(&mut self, id: &JobId) -> Option<Job> {
        let idx = self.jobs.iter().position(|j| &j.id == id)?;
        Some(self.jobs.remove(idx))
    }

    /// Jobs that have not reached a terminal state.
    pub fn pending(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| !j.is_terminal())
    }

    /// Apply a terminal outcome to the matching record.
    pub fn apply_terminal(&mut self, outcome: &TerminalJob) -> Result<&Job, BookError> {
        let job = self
            .get_mut(&outcome.id)
            .ok_or_else(|| BookError::NotFound(outcome.id.clone()))?;
        job.apply_terminal(outcome)?;
        Ok(job)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobFailure, JobState};
    use chrono::Utc;

    fn job(id: &str) -> Job {
        Job::new(JobId::from(id), "https://example.com/v.mp4", Utc::now())
    }

    #[test]
    fn test_insert_newest_first() {
        let mut book = JobBook::new();
        book.insert(job("a")).unwrap();
        book.insert(job("b")).unwrap();

        let ids: Vec<_> = book.iter().map(|j| j.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut book = JobBook::new();
        book.insert(job("a")).unwrap();
        assert_eq!(
            book.insert(job("a")),
            Err(BookError::Duplicate(JobId::from("a")))
        );
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_apply_terminal_updates_pending() {
        let mut book = JobBook::new();
        book.insert(job("a")).unwrap();
        book.insert(job("b")).unwrap();

        let outcome = TerminalJob::failed(JobId::from("a"), JobFailure::new("nope", None));
        let updated = book.apply_terminal(&outcome).unwrap();
        assert_eq!(updated.state, JobState::Fail);

        let pending: Vec<_> = book.pending().map(|j| j.id.clone()).collect();
        assert_eq!(pending, vec![JobId::from("b")]);
    }

    #[test]
    fn test_apply_terminal_unknown_job() {
        let mut book = JobBook::new();
        let outcome = TerminalJob::failed(JobId::from("ghost"), JobFailure::new("x", None));
        assert!(matches!(
            book.apply_terminal(&outcome),
            Err(BookError::NotFound(_))
        ));
    }

    #[test]
    fn test_deserialize_keeps_order() {
        let mut book = JobBook::new();
        book.insert(job("a")).unwrap();
        book.insert(job("b")).unwrap();

        let json = serde_json::to_string(&book).unwrap();
        let restored: JobBook = serde_json::from_str(&json).unwrap();
        let ids: Vec<_> = restored.iter().map(|j| j.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_deserialize_rejects_duplicate_ids() {
        let mut book = JobBook::new();
        book.insert(job("a")).unwrap();
        let mut value = serde_json::to_value(&book).unwrap();
        let entry = value["jobs"][0].clone();
        value["jobs"].as_array_mut().unwrap().push(entry);

        let err = serde_json::from_value::<JobBook>(value).unwrap_err();
        assert!(err.to_string().contains("already tracked"));
    }

    #[test]
    fn test_remove() {
        let mut book = JobBook::new();
        book.insert(job("a")).unwrap();
        assert!(book.remove(&JobId::from("a")).is_some());
        assert!(book.is_empty());
        assert!(book.remove(&JobId::from("a")).is_none());
    }
}
