mod job;
mod state;

pub use job::{BatchJob, JobReport, RetryConfig};
pub use state::{JobEvent, JobState, StateMachine, Transition};
