//! Wire types for the OpenAI-compatible Batch API.
//!
//! Submission files are JSONL of [`RequestLine`]; finished batches expose a
//! JSONL output file of [`ResultLine`]. Batch status objects are decoded into
//! [`BatchObject`] and collapsed to a [`BatchPhase`] for the job state machine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Endpoint every request line targets.
pub const CHAT_COMPLETIONS: &str = "/v1/chat/completions";

/// Turnaround window requested for each batch.
pub const COMPLETION_WINDOW: &str = "24h";

/// One role/content pair of a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// "system", "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Chat completion body embedded in each request line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBody {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

/// One line of a submission file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLine {
    /// Correlation key, echoed back untouched in the matching result line.
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: ChatBody,
}

impl RequestLine {
    pub fn chat(custom_id: String, body: ChatBody) -> Self {
        Self {
            custom_id,
            method: "POST".into(),
            url: CHAT_COMPLETIONS.into(),
            body,
        }
    }
}

/// Uploaded file handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileObject {
    pub id: String,
}

/// Body of `POST /batches`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateBatchRequest {
    pub input_file_id: String,
    pub endpoint: String,
    pub completion_window: String,
    pub metadata: BTreeMap<String, String>,
}

impl CreateBatchRequest {
    pub fn new(input_file_id: &str, description: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("description".to_string(), description.to_string());
        Self {
            input_file_id: input_file_id.to_string(),
            endpoint: CHAT_COMPLETIONS.into(),
            completion_window: COMPLETION_WINDOW.into(),
            metadata,
        }
    }
}

/// Status string reported by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// What the job lifecycle cares about: still running, or which terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchPhase {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl RemoteStatus {
    pub fn phase(self) -> BatchPhase {
        match self {
            RemoteStatus::Completed => BatchPhase::Completed,
            RemoteStatus::Failed | RemoteStatus::Expired => BatchPhase::Failed,
            RemoteStatus::Cancelled => BatchPhase::Cancelled,
            RemoteStatus::Validating
            | RemoteStatus::InProgress
            | RemoteStatus::Finalizing
            | RemoteStatus::Cancelling
            | RemoteStatus::Unknown => BatchPhase::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchErrorEntry {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchErrors {
    #[serde(default)]
    pub data: Vec<BatchErrorEntry>,
}

/// Batch status object returned by create and retrieve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchObject {
    pub id: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
    #[serde(default)]
    pub request_counts: Option<RequestCounts>,
    #[serde(default)]
    pub errors: Option<BatchErrors>,
}

impl BatchObject {
    pub fn phase(&self) -> BatchPhase {
        self.status.phase()
    }

    /// First error message the endpoint attached, or the raw status.
    pub fn failure_reason(&self) -> String {
        self.errors
            .as_ref()
            .and_then(|e| e.data.first())
            .and_then(|e| e.message.clone().or_else(|| e.code.clone()))
            .unwrap_or_else(|| format!("{:?}", self.status).to_lowercase())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultResponse {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub body: Option<ChatCompletion>,
}

/// One line of a finished batch's output file.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultLine {
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub response: Option<ResultResponse>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ResultLine {
    /// Text of the first choice, if the request succeeded.
    pub fn content(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .body
            .as_ref()?
            .choices
            .first()?
            .message
            .content
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_uses_chat_completions() {
        let line = RequestLine::chat(
            "Gazette|News|https://x/a".into(),
            ChatBody {
                model: "gpt-4o-mini".into(),
                messages: vec![Message::user("hi")],
                max_tokens: 8,
            },
        );
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["custom_id"], "Gazette|News|https://x/a");
        assert_eq!(json["method"], "POST");
        assert_eq!(json["url"], "/v1/chat/completions");
        assert_eq!(json["body"]["max_tokens"], 8);
        assert_eq!(json["body"]["messages"][0]["role"], "user");
    }

    #[test]
    fn create_request_carries_description() {
        let req = CreateBatchRequest::new("file-1", "Lean scoring");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["input_file_id"], "file-1");
        assert_eq!(json["completion_window"], "24h");
        assert_eq!(json["metadata"]["description"], "Lean scoring");
    }

    #[test]
    fn status_phase_mapping() {
        assert_eq!(RemoteStatus::Validating.phase(), BatchPhase::Pending);
        assert_eq!(RemoteStatus::InProgress.phase(), BatchPhase::Pending);
        assert_eq!(RemoteStatus::Finalizing.phase(), BatchPhase::Pending);
        assert_eq!(RemoteStatus::Cancelling.phase(), BatchPhase::Pending);
        assert_eq!(RemoteStatus::Completed.phase(), BatchPhase::Completed);
        assert_eq!(RemoteStatus::Failed.phase(), BatchPhase::Failed);
        assert_eq!(RemoteStatus::Expired.phase(), BatchPhase::Failed);
        assert_eq!(RemoteStatus::Cancelled.phase(), BatchPhase::Cancelled);
    }

    #[test]
    fn batch_object_deserialize_from_api_format() {
        let json = r#"{
            "id": "batch_abc",
            "object": "batch",
            "status": "in_progress",
            "output_file_id": null,
            "request_counts": {"total": 10, "completed": 3, "failed": 0}
        }"#;
        let batch: BatchObject = serde_json::from_str(json).unwrap();
        assert_eq!(batch.id, "batch_abc");
        assert_eq!(batch.phase(), BatchPhase::Pending);
        assert_eq!(batch.request_counts.unwrap().completed, 3);
    }

    #[test]
    fn unknown_status_is_pending() {
        let batch: BatchObject =
            serde_json::from_str(r#"{"id": "b", "status": "paused"}"#).unwrap();
        assert_eq!(batch.status, RemoteStatus::Unknown);
        assert_eq!(batch.phase(), BatchPhase::Pending);
    }

    #[test]
    fn failure_reason_prefers_endpoint_message() {
        let batch: BatchObject = serde_json::from_str(
            r#"{"id": "b", "status": "failed",
                "errors": {"data": [{"code": "token_limit", "message": "too many tokens"}]}}"#,
        )
        .unwrap();
        assert_eq!(batch.failure_reason(), "too many tokens");

        let bare: BatchObject =
            serde_json::from_str(r#"{"id": "b", "status": "expired"}"#).unwrap();
        assert_eq!(bare.failure_reason(), "expired");
    }

    #[test]
    fn result_line_content() {
        let line: ResultLine = serde_json::from_str(
            r#"{"id": "r1", "custom_id": "A|B|u",
                "response": {"status_code": 200,
                             "body": {"choices": [{"message": {"role": "assistant", "content": "Y"}}]}},
                "error": null}"#,
        )
        .unwrap();
        assert_eq!(line.custom_id.as_deref(), Some("A|B|u"));
        assert_eq!(line.content(), Some("Y"));
    }

    #[test]
    fn result_line_without_body_has_no_content() {
        let line: ResultLine = serde_json::from_str(
            r#"{"custom_id": "A|B|u", "response": null, "error": {"message": "boom"}}"#,
        )
        .unwrap();
        assert_eq!(line.content(), None);
        assert!(line.error.is_some());
    }
}
