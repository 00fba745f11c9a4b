use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::BatchJob;
use crate::batch::BatchPhase;
use crate::error::PipelineError;

/// Lifecycle of one submitted chunk.
///
/// CREATED → SUBMITTED → COMPLETED | FAILED | CANCELLED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Submitted,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Created => write!(f, "CREATED"),
            JobState::Submitted => write!(f, "SUBMITTED"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// The endpoint accepted the batch.
    Submit { batch_id: String },
    /// A status check returned this phase.
    Poll(BatchPhase),
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobEvent::Submit { batch_id } => write!(f, "submit({batch_id})"),
            JobEvent::Poll(phase) => write!(f, "poll({phase:?})"),
        }
    }
}

/// The result of applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Moved to a non-terminal state.
    Next(JobState),
    /// Still running; poll again.
    Wait,
    /// Reached a terminal state.
    Complete(JobState),
}

/// Drives a `BatchJob` through its states.
pub struct StateMachine;

impl StateMachine {
    /// Apply `event` to `job`. Events that make no sense in the current state
    /// are rejected and leave the job untouched.
    pub fn next(job: &mut BatchJob, event: JobEvent) -> Result<Transition, PipelineError> {
        if job.state.is_terminal() {
            return Err(PipelineError::InvalidTransition {
                from: job.state.to_string(),
                event: event.to_string(),
            });
        }
        let transition = match (job.state, &event) {
            (JobState::Created, JobEvent::Submit { batch_id }) => {
                job.batch_id = Some(batch_id.clone());
                Transition::Next(JobState::Submitted)
            }
            (JobState::Submitted, JobEvent::Poll(phase)) => {
                job.polls += 1;
                match phase {
                    BatchPhase::Pending => Transition::Wait,
                    BatchPhase::Completed => Transition::Complete(JobState::Completed),
                    BatchPhase::Failed => Transition::Complete(JobState::Failed),
                    BatchPhase::Cancelled => Transition::Complete(JobState::Cancelled),
                }
            }
            (state, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: state.to_string(),
                    event: event.to_string(),
                });
            }
        };

        match &transition {
            Transition::Next(state) | Transition::Complete(state) => {
                job.state_history.push(job.state);
                job.state = *state;
                job.updated_at = chrono::Utc::now();
            }
            Transition::Wait => {}
        }

        Ok(transition)
    }
}
