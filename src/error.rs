use std::path::PathBuf;

use thiserror::Error;

use crate::batch::BatchApiError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed hierarchy at record {record}: {reason}")]
    MalformedHierarchy { record: u64, reason: String },

    #[error("Item at offset {offset} weighs {weight} characters, over the chunk budget of {budget}")]
    BudgetExceededBySingleItem {
        offset: usize,
        weight: usize,
        budget: usize,
    },

    #[error("Invalid correlation key: {0}")]
    InvalidCorrelationKey(String),

    #[error("Invalid job transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Batch {batch_id} failed: {reason}")]
    JobFailed { batch_id: String, reason: String },

    #[error("Batch {batch_id} was cancelled")]
    JobCancelled { batch_id: String },

    #[error(
        "Batch {batch_id} returned no result for {missing} item(s), listed in {}; \
         chunk from offset {start} was not checkpointed",
        .path.display()
    )]
    IncompleteBatch {
        batch_id: String,
        missing: usize,
        start: usize,
        path: PathBuf,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Batch API error: {0}")]
    Batch(#[from] BatchApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A model answer that does not match the format its task asked for.
///
/// Never propagated past aggregation: callers substitute the neutral rating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreParseError {
    #[error("empty response")]
    Empty,

    #[error("not a number: {0:?}")]
    NotANumber(String),

    #[error("rating {0} is outside [-42, 42]")]
    OutOfRange(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_item_display() {
        let err = PipelineError::BudgetExceededBySingleItem {
            offset: 7,
            weight: 120,
            budget: 90,
        };
        assert_eq!(
            err.to_string(),
            "Item at offset 7 weighs 120 characters, over the chunk budget of 90"
        );
    }

    #[test]
    fn malformed_hierarchy_display() {
        let err = PipelineError::MalformedHierarchy {
            record: 4,
            reason: "expected 3 items, stream ended after 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed hierarchy at record 4: expected 3 items, stream ended after 1"
        );
    }

    #[test]
    fn incomplete_batch_display() {
        let err = PipelineError::IncompleteBatch {
            batch_id: "batch_9".into(),
            missing: 2,
            start: 40,
            path: PathBuf::from("requests_out/batch_lean_missing.txt"),
        };
        assert_eq!(
            err.to_string(),
            "Batch batch_9 returned no result for 2 item(s), listed in \
             requests_out/batch_lean_missing.txt; chunk from offset 40 was not checkpointed"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineError>();
        assert_send_sync::<ScoreParseError>();
    }
}
