use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};

use super::error::BatchApiError;
use super::types::{BatchObject, CreateBatchRequest, FileObject};

/// The operations the job lifecycle needs from a bulk inference endpoint.
pub trait BatchEndpoint {
    /// Upload a JSONL submission file, returning its handle.
    async fn upload_requests(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<FileObject, BatchApiError>;

    /// Start a batch over an uploaded file.
    async fn create_batch(
        &self,
        input_file_id: &str,
        description: &str,
    ) -> Result<BatchObject, BatchApiError>;

    /// Fetch the current status of a batch.
    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchObject, BatchApiError>;

    /// Download the raw contents of a file (the batch output).
    async fn file_content(&self, file_id: &str) -> Result<String, BatchApiError>;
}

pub struct BatchClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl BatchClient {
    /// Create a client for the API rooted at `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, BatchApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response, BatchApiError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(BatchApiError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(BatchApiError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

impl BatchEndpoint for BatchClient {
    async fn upload_requests(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<FileObject, BatchApiError> {
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("application/jsonl")?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let file = Self::check(response).await?.json::<FileObject>().await?;
        Ok(file)
    }

    async fn create_batch(
        &self,
        input_file_id: &str,
        description: &str,
    ) -> Result<BatchObject, BatchApiError> {
        let response = self
            .client
            .post(self.url("batches"))
            .bearer_auth(&self.api_key)
            .json(&CreateBatchRequest::new(input_file_id, description))
            .send()
            .await?;
        let batch = Self::check(response).await?.json::<BatchObject>().await?;
        Ok(batch)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchObject, BatchApiError> {
        let response = self
            .client
            .get(self.url(&format!("batches/{batch_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let batch = Self::check(response).await?.json::<BatchObject>().await?;
        Ok(batch)
    }

    async fn file_content(&self, file_id: &str) -> Result<String, BatchApiError> {
        let response = self
            .client
            .get(self.url(&format!("files/{file_id}/content")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let text = Self::check(response).await?.text().await?;
        Ok(text)
    }
}
