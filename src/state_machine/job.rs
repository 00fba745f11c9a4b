use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobState;
use crate::tasks::TaskKind;

/// Backoff for status polling after transient endpoint errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failed status checks tolerated before giving up.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms * 2u64.pow(attempt.saturating_sub(1))
    }
}

/// One chunk's submission, from creation to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub kind: TaskKind,
    /// First item offset covered by this job.
    pub start: usize,
    /// Last item offset covered by this job (inclusive).
    pub end: usize,
    pub batch_id: Option<String>,
    pub state: JobState,
    pub state_history: Vec<JobState>,
    pub polls: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    pub fn new(kind: TaskKind, start: usize, end: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            start,
            end,
            batch_id: None,
            state: JobState::Created,
            state_history: Vec::new(),
            polls: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Job tracking a batch that was submitted elsewhere; offsets are unknown.
    pub fn attached(kind: TaskKind, batch_id: &str) -> Self {
        let mut job = Self::new(kind, 0, 0);
        job.state_history.push(JobState::Created);
        job.state = JobState::Submitted;
        job.batch_id = Some(batch_id.to_string());
        job
    }
}

/// Summary produced when a job reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub kind: TaskKind,
    pub batch_id: Option<String>,
    pub start: usize,
    pub end: usize,
    pub state: JobState,
    pub state_transitions: Vec<JobState>,
    pub polls: u32,
    pub rows_appended: usize,
    pub lines_skipped: usize,
    /// Submitted requests that came back without a result.
    pub missing: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl JobReport {
    pub fn from_job(
        job: &BatchJob,
        rows_appended: usize,
        lines_skipped: usize,
        missing: usize,
    ) -> Self {
        let now = Utc::now();
        let duration = now - job.created_at;
        let mut transitions = job.state_history.clone();
        transitions.push(job.state);

        Self {
            job_id: job.id.clone(),
            kind: job.kind,
            batch_id: job.batch_id.clone(),
            start: job.start,
            end: job.end,
            state: job.state,
            state_transitions: transitions,
            polls: job.polls,
            rows_appended,
            lines_skipped,
            missing,
            started_at: job.created_at,
            completed_at: now,
            duration_ms: duration.num_milliseconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_creation_defaults() {
        let job = BatchJob::new(TaskKind::Screen, 4, 11);
        assert_eq!(job.state, JobState::Created);
        assert_eq!((job.start, job.end), (4, 11));
        assert!(job.batch_id.is_none());
        assert!(job.state_history.is_empty());
        assert_eq!(job.polls, 0);
    }

    #[test]
    fn attached_job_is_submitted() {
        let job = BatchJob::attached(TaskKind::Topic, "batch_abc");
        assert_eq!(job.state, JobState::Submitted);
        assert_eq!(job.batch_id.as_deref(), Some("batch_abc"));
        assert_eq!(job.state_history, vec![JobState::Created]);
    }

    #[test]
    fn retry_config_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
        };
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(2), 2000);
        assert_eq!(config.delay_for_attempt(3), 4000);
        assert_eq!(config.delay_for_attempt(4), 8000);
    }

    #[test]
    fn report_from_job() {
        let mut job = BatchJob::new(TaskKind::Lean, 0, 2);
        job.state_history.push(JobState::Created);
        job.state = JobState::Submitted;
        let report = JobReport::from_job(&job, 3, 1, 2);

        assert_eq!(report.job_id, job.id);
        assert_eq!(report.rows_appended, 3);
        assert_eq!(report.lines_skipped, 1);
        assert_eq!(report.missing, 2);
        assert_eq!(
            report.state_transitions,
            vec![JobState::Created, JobState::Submitted]
        );
    }

    #[test]
    fn job_serialization_roundtrip() {
        let job = BatchJob::new(TaskKind::Topic, 1, 5);
        let json = serde_json::to_string(&job).unwrap();
        let deserialized: BatchJob = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.id, job.id);
        assert_eq!(deserialized.kind, TaskKind::Topic);
        assert_eq!(deserialized.state, JobState::Created);
        assert!(json.contains("\"kind\":\"topic\""));
    }
}
