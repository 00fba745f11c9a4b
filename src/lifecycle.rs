//! Submit → poll → retrieve for one chunk.
//!
//! [`JobRunner`] writes the chunk's request file, asks the confirmation gate,
//! uploads and starts the batch, then polls on a fixed interval until the
//! endpoint reports a terminal status. Completed batches are downloaded and
//! correlated into the results store; requests of the chunk that came back
//! without a result are written to the kind's missing file and counted in
//! the report. There is no overall timeout; the caller cancels by dropping
//! the future.
//!
//! Status checks and downloads retry transient endpoint errors with
//! exponential backoff. Uploads and batch creation are never retried.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::batch::{BatchApiError, BatchEndpoint, BatchObject};
use crate::config::{Layout, TaskSettings};
use crate::confirm::{ChunkPreview, ConfirmGate};
use crate::error::PipelineError;
use crate::planner::Chunk;
use crate::retrieve::{log_request_errors, retrieve_into, Expected, Retrieval};
use crate::state_machine::{
    BatchJob, JobEvent, JobReport, JobState, RetryConfig, StateMachine, Transition,
};
use crate::store::ResultsStore;
use crate::tasks::{Item, TaskKind};
use crate::ui::JobProgress;

/// How a chunk's job ended.
#[derive(Debug)]
pub enum JobOutcome {
    /// Results were retrieved and appended.
    Completed(JobReport),
    /// The endpoint reported failure or expiry; nothing was retrieved.
    Failed { report: JobReport, reason: String },
    Cancelled(JobReport),
    /// The operator declined; nothing was submitted.
    Declined,
}

impl JobOutcome {
    pub fn report(&self) -> Option<&JobReport> {
        match self {
            JobOutcome::Completed(report)
            | JobOutcome::Failed { report, .. }
            | JobOutcome::Cancelled(report) => Some(report),
            JobOutcome::Declined => None,
        }
    }
}

pub struct JobRunner<'a, E, G> {
    endpoint: &'a E,
    gate: &'a G,
    poll_interval: Duration,
    retry: RetryConfig,
    show_progress: bool,
}

impl<'a, E: BatchEndpoint, G: ConfirmGate> JobRunner<'a, E, G> {
    pub fn new(endpoint: &'a E, gate: &'a G, poll_interval: Duration, retry: RetryConfig) -> Self {
        Self {
            endpoint,
            gate,
            poll_interval,
            retry,
            show_progress: false,
        }
    }

    /// Show a spinner while polling.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn progress(&self, description: &str) -> JobProgress {
        if self.show_progress {
            JobProgress::start(description)
        } else {
            JobProgress::hidden()
        }
    }

    /// Run one chunk through the whole lifecycle.
    pub async fn run_chunk(
        &self,
        kind: TaskKind,
        chunk: &Chunk<'_, Item>,
        settings: &TaskSettings,
        layout: &Layout,
        store: &ResultsStore,
    ) -> Result<JobOutcome, PipelineError> {
        let request_file = layout.request_file(kind);
        let contents = write_request_file(&request_file, chunk.items, settings)?;

        let mut job = BatchJob::new(kind, chunk.start, chunk.end);
        let preview = ChunkPreview {
            kind,
            model: settings.model.clone(),
            request_file: request_file.clone(),
            start: chunk.start,
            end: chunk.end,
            items: chunk.items.len(),
            chars: chunk.weight,
            price_per_mtok: settings.price_per_mtok,
        };
        info!(
            job_id = %job.id,
            kind = %kind,
            start = chunk.start,
            end = chunk.end,
            items = preview.items,
            chars = preview.chars,
            est_tokens = preview.estimated_tokens(),
            est_cost = preview.estimated_cost(),
            "chunk ready"
        );

        if !self.gate.confirm(&preview).await? {
            info!(job_id = %job.id, kind = %kind, start = chunk.start, "submission declined");
            return Ok(JobOutcome::Declined);
        }

        let file_name = request_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("batch_{kind}_in.jsonl"));
        let file = self.endpoint.upload_requests(&file_name, contents).await?;
        let batch = self
            .endpoint
            .create_batch(&file.id, kind.description())
            .await?;
        StateMachine::next(
            &mut job,
            JobEvent::Submit {
                batch_id: batch.id.clone(),
            },
        )?;
        info!(job_id = %job.id, batch_id = %batch.id, input_file = %file.id, "batch submitted");

        let expected = Expected::from_items(chunk.items);
        self.await_terminal(&mut job, layout, store, &expected).await
    }

    /// Follow a batch submitted by an earlier run until it finishes, then
    /// retrieve its results. Checkpoints are the caller's business.
    pub async fn attach(
        &self,
        kind: TaskKind,
        batch_id: &str,
        layout: &Layout,
        store: &ResultsStore,
    ) -> Result<JobOutcome, PipelineError> {
        let mut job = BatchJob::attached(kind, batch_id);
        self.await_terminal(&mut job, layout, store, &Expected::Any(kind.parser()))
            .await
    }

    async fn await_terminal(
        &self,
        job: &mut BatchJob,
        layout: &Layout,
        store: &ResultsStore,
        expected: &Expected,
    ) -> Result<JobOutcome, PipelineError> {
        let batch_id = job.batch_id.clone().unwrap_or_default();
        let progress = self.progress(&format!("{} batch {batch_id}", job.kind));

        let (state, batch) = loop {
            let batch = self
                .with_retry(&progress, "batch status", || {
                    self.endpoint.retrieve_batch(&batch_id)
                })
                .await?;
            debug!(batch_id = %batch_id, status = ?batch.status, "polled batch");

            match StateMachine::next(job, JobEvent::Poll(batch.phase()))? {
                Transition::Wait => {
                    progress.update_state(
                        job.state,
                        &format!("{batch_id} {:?} (poll {})", batch.status, job.polls),
                    );
                    sleep(self.poll_interval).await;
                }
                Transition::Complete(state) => break (state, batch),
                Transition::Next(state) => {
                    return Err(PipelineError::InvalidTransition {
                        from: JobState::Submitted.to_string(),
                        event: format!("poll -> {state}"),
                    });
                }
            }
        };

        let outcome = match state {
            JobState::Completed => {
                let retrieval = self
                    .collect(&batch, job.kind, layout, store, expected, &progress)
                    .await?;
                let missing = match expected {
                    Expected::Chunk { .. } => retrieval.missing.len(),
                    Expected::Any(_) => batch
                        .request_counts
                        .as_ref()
                        .map_or(0, |c| c.failed as usize),
                };
                let report =
                    JobReport::from_job(job, retrieval.appended, retrieval.skipped, missing);
                info!(
                    job_id = %job.id,
                    batch_id = %batch_id,
                    rows = retrieval.appended,
                    skipped = retrieval.skipped,
                    missing,
                    polls = job.polls,
                    "batch completed"
                );
                JobOutcome::Completed(report)
            }
            JobState::Cancelled => {
                warn!(job_id = %job.id, batch_id = %batch_id, "batch cancelled");
                JobOutcome::Cancelled(JobReport::from_job(job, 0, 0, 0))
            }
            _ => {
                let reason = batch.failure_reason();
                warn!(job_id = %job.id, batch_id = %batch_id, reason = %reason, "batch failed");
                JobOutcome::Failed {
                    report: JobReport::from_job(job, 0, 0, 0),
                    reason,
                }
            }
        };

        if let Some(report) = outcome.report() {
            progress.complete(report);
        }
        Ok(outcome)
    }

    /// Download the output and error files, keep raw copies, and append
    /// correlated rows. A chunk's unanswered keys go to the missing file.
    async fn collect(
        &self,
        batch: &BatchObject,
        kind: TaskKind,
        layout: &Layout,
        store: &ResultsStore,
        expected: &Expected,
        progress: &JobProgress,
    ) -> Result<Retrieval, PipelineError> {
        if let Some(counts) = &batch.request_counts {
            info!(
                batch_id = %batch.id,
                total = counts.total,
                completed = counts.completed,
                failed = counts.failed,
                "request counts"
            );
        }

        let raw = match &batch.output_file_id {
            Some(file_id) => {
                self.with_retry(progress, "batch output", || {
                    self.endpoint.file_content(file_id)
                })
                .await?
            }
            None => {
                warn!(batch_id = %batch.id, "completed batch has no output file");
                String::new()
            }
        };

        write_file(&layout.response_file(kind), raw.as_bytes())?;

        if let Some(file_id) = &batch.error_file_id {
            let errors = self
                .with_retry(progress, "batch errors", || {
                    self.endpoint.file_content(file_id)
                })
                .await?;
            let error_file = layout.error_file(kind);
            write_file(&error_file, errors.as_bytes())?;
            let failed = log_request_errors(&errors);
            if failed > 0 {
                warn!(
                    batch_id = %batch.id,
                    failed,
                    path = %error_file.display(),
                    "endpoint rejected some requests"
                );
            }
        }

        let retrieval = retrieve_into(store, &raw, expected)?;
        debug!(
            store = %store.path().display(),
            appended = retrieval.appended,
            "results appended"
        );

        if let Expected::Chunk { .. } = expected {
            let missing_file = layout.missing_file(kind);
            if !retrieval.missing.is_empty() {
                let mut listing = retrieval.missing.join("\n");
                listing.push('\n');
                write_file(&missing_file, listing.as_bytes())?;
                warn!(
                    batch_id = %batch.id,
                    missing = retrieval.missing.len(),
                    path = %missing_file.display(),
                    "requests came back without a result"
                );
            } else if missing_file.exists() {
                std::fs::remove_file(&missing_file)?;
            }
        }

        Ok(retrieval)
    }

    /// Repeat a read-only request while it fails transiently, up to
    /// `max_retries` extra attempts.
    async fn with_retry<T, F, Fut>(
        &self,
        progress: &JobProgress,
        what: &str,
        mut op: F,
    ) -> Result<T, BatchApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BatchApiError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let mut delay_ms = self.retry.delay_for_attempt(attempt);
                    if let BatchApiError::RateLimited { retry_after_ms } = &e {
                        delay_ms = delay_ms.max(*retry_after_ms);
                    }
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms,
                        error = %e,
                        "{what} request failed; retrying"
                    );
                    progress.retry(attempt, self.retry.max_retries, &e.to_string());
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Serialize `items` as JSONL, overwrite `path` with it and return the bytes.
pub fn write_request_file(
    path: &Path,
    items: &[Item],
    settings: &TaskSettings,
) -> Result<Vec<u8>, PipelineError> {
    let mut contents = Vec::new();
    for item in items {
        serde_json::to_writer(&mut contents, &item.request_line(settings))?;
        contents.push(b'\n');
    }
    write_file(path, &contents)?;
    Ok(contents)
}

fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}
