//! The stages the CLI drives: abridging the corpus, submitting one task kind
//! chunk by chunk, and aggregating the stores.
//!
//! Submission keeps at most one batch in flight per kind. A chunk is
//! checkpointed only after every one of its requests has a result appended,
//! so the checkpoint log is a total order of completed chunks and a re-run
//! picks up at the first chunk that did not complete.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::aggregate::{category_stats, city_ratings, publication_ratings, state_table};
use crate::articles::{Article, SourceArticle};
use crate::batch::BatchEndpoint;
use crate::checkpoint::CheckpointLog;
use crate::confirm::ConfirmGate;
use crate::context::{ArticleIndex, PipelineContext};
use crate::error::PipelineError;
use crate::hierarchy::Corpus;
use crate::lifecycle::{JobOutcome, JobRunner};
use crate::planner::plan_chunks;
use crate::report::AggregateReport;
use crate::state_machine::RetryConfig;
use crate::store::{ResultRow, ResultsStore};
use crate::tasks::{is_political, Item, TaskKind};
use crate::truncate::SentenceSplitter;

/// Drop short articles and truncate the rest. Returns article counts before
/// and after.
pub fn abridge(
    ctx: &PipelineContext,
    input: &Path,
    output: &Path,
    splitter: &impl SentenceSplitter,
) -> Result<(usize, usize), PipelineError> {
    let corpus: Corpus<Article> = Corpus::read_path(input)?;
    let before = corpus.item_count();
    let limits = ctx.config.text_limits();
    let abridged = corpus.filter_map(|article| {
        limits
            .abridge(&article.body, splitter)
            .map(|body| Article { body, ..article })
    });
    let after = abridged.item_count();
    abridged.write_path(output)?;
    info!(before, after, output = %output.display(), "abridged corpus");
    Ok((before, after))
}

/// Group the scraper's flat `(publication, section, url, headline, body)`
/// rows into a corpus file. Unreadable rows are warned about and skipped.
/// Returns the number of articles written.
pub fn ingest(input: &Path, output: &Path) -> Result<usize, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(input)?;
    let mut articles = Vec::new();
    for (n, row) in reader.deserialize::<SourceArticle>().enumerate() {
        match row {
            Ok(article) => articles.push(article),
            Err(e) => warn!(row = n + 1, error = %e, "skipping unreadable scraped row"),
        }
    }
    let corpus = Corpus::from_flat(articles);
    let count = corpus.item_count();
    corpus.write_path(output)?;
    info!(
        articles = count,
        publications = corpus.publications.len(),
        output = %output.display(),
        "ingested scraped articles"
    );
    Ok(count)
}

fn items_from(kind: TaskKind, articles: impl IntoIterator<Item = SourceArticle>) -> Vec<Item> {
    articles
        .into_iter()
        .filter_map(|article| match Item::new(kind, &article) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(kind = %kind, url = %article.url, error = %e, "skipping article");
                None
            }
        })
        .collect()
}

/// Screen rows answered political, first occurrence per URL, after skipping
/// the first `skip_rows` rows, joined to the article text.
pub fn political_articles(
    screen_rows: &[ResultRow],
    index: &ArticleIndex,
    skip_rows: usize,
) -> Vec<SourceArticle> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in screen_rows.iter().skip(skip_rows) {
        if !is_political(&row.response) || !seen.insert(row.url.as_str()) {
            continue;
        }
        match index.get(&row.url) {
            Some(text) => out.push(SourceArticle {
                publication: row.publication.clone(),
                section: row.section.clone(),
                url: row.url.clone(),
                headline: text.headline.clone(),
                body: text.body.clone(),
            }),
            None => warn!(url = %row.url, "screened article missing from corpus; skipping"),
        }
    }
    out
}

/// A kind's ordered item list and how it was drawn.
#[derive(Debug, Clone)]
pub struct SourcedItems {
    pub kind: TaskKind,
    /// Screen rows skipped before sourcing; always 0 for screen items.
    pub skip_rows: usize,
    pub items: Vec<Item>,
}

/// The ordered item list a kind is planned over. The same inputs always give
/// the same order, which keeps checkpoints meaningful across runs.
pub fn source_items(
    ctx: &PipelineContext,
    kind: TaskKind,
    skip_rows: usize,
) -> Result<SourcedItems, PipelineError> {
    let (articles, skip_rows) = match kind {
        TaskKind::Screen => {
            if skip_rows > 0 {
                warn!(skip_rows, "--skip-rows only applies to lean and topic; ignoring");
            }
            (ctx.abridged_corpus()?.flatten(), 0)
        }
        TaskKind::Lean | TaskKind::Topic => {
            let screened = ResultsStore::new(ctx.layout.results_store(TaskKind::Screen)).read_all()?;
            let index = ctx.article_index()?;
            if index.is_empty() {
                warn!("abridged corpus is empty; no {kind} items can be sourced");
            }
            debug!(screened = screened.len(), indexed = index.len(), "sourcing {kind} items");
            (political_articles(&screened, index, skip_rows), skip_rows)
        }
    };
    Ok(SourcedItems {
        kind,
        skip_rows,
        items: items_from(kind, articles),
    })
}

/// What one `submit` run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub kind: TaskKind,
    pub total_items: usize,
    pub start: usize,
    /// Where the next run should start.
    pub next_offset: usize,
    pub chunks_completed: usize,
    pub rows_appended: usize,
    pub lines_skipped: usize,
    pub declined: bool,
}

/// Plan `sourced` from `start` and push each chunk through the lifecycle,
/// checkpointing after each completed one. Stops at the first declined
/// chunk. A failed or cancelled batch, or one that left requests without a
/// result, ends the run with an error and leaves its chunk unrecorded.
pub async fn run_kind<E: BatchEndpoint, G: ConfirmGate>(
    ctx: &PipelineContext,
    endpoint: &E,
    gate: &G,
    sourced: &SourcedItems,
    start: usize,
    show_progress: bool,
) -> Result<RunSummary, PipelineError> {
    let kind = sourced.kind;
    let items = &sourced.items;
    let config = &ctx.config;
    let settings = config.tasks.get(kind);
    let budget = config.char_budget(kind);
    let store = ResultsStore::new(ctx.layout.results_store(kind));
    let checkpoint = CheckpointLog::new(ctx.layout.checkpoint_log(kind));
    let runner = JobRunner::new(
        endpoint,
        gate,
        Duration::from_secs(config.poll_interval_secs),
        RetryConfig {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
        },
    )
    .with_progress(show_progress);

    let mut summary = RunSummary {
        kind,
        total_items: items.len(),
        start,
        next_offset: start,
        chunks_completed: 0,
        rows_appended: 0,
        lines_skipped: 0,
        declined: false,
    };
    info!(
        kind = %kind,
        total = items.len(),
        start,
        budget,
        store = %store.path().display(),
        "planning chunks"
    );

    for chunk in plan_chunks(items, start, budget, Item::weight, config.oversize) {
        let chunk = chunk?;
        match runner
            .run_chunk(kind, &chunk, settings, &ctx.layout, &store)
            .await?
        {
            JobOutcome::Completed(report) if report.missing > 0 => {
                return Err(PipelineError::IncompleteBatch {
                    batch_id: report.batch_id.unwrap_or_default(),
                    missing: report.missing,
                    start: chunk.start,
                    path: ctx.layout.missing_file(kind),
                });
            }
            JobOutcome::Completed(report) => {
                let record = checkpoint.record(&chunk, sourced.skip_rows)?;
                summary.next_offset = record.next_offset;
                summary.chunks_completed += 1;
                summary.rows_appended += report.rows_appended;
                summary.lines_skipped += report.lines_skipped;
                info!(
                    kind = %kind,
                    next_offset = record.next_offset,
                    log = %checkpoint.path().display(),
                    "checkpoint recorded"
                );
            }
            JobOutcome::Declined => {
                summary.declined = true;
                break;
            }
            JobOutcome::Failed { report, reason } => {
                return Err(PipelineError::JobFailed {
                    batch_id: report.batch_id.unwrap_or_default(),
                    reason,
                });
            }
            JobOutcome::Cancelled(report) => {
                return Err(PipelineError::JobCancelled {
                    batch_id: report.batch_id.unwrap_or_default(),
                });
            }
        }
    }

    Ok(summary)
}

/// Poll an existing batch and append its results without checkpointing.
pub async fn retrieve_existing<E: BatchEndpoint>(
    ctx: &PipelineContext,
    endpoint: &E,
    kind: TaskKind,
    batch_id: &str,
    show_progress: bool,
) -> Result<JobOutcome, PipelineError> {
    let store = ResultsStore::new(ctx.layout.results_store(kind));
    let gate = crate::confirm::AutoConfirm;
    JobRunner::new(
        endpoint,
        &gate,
        Duration::from_secs(ctx.config.poll_interval_secs),
        RetryConfig {
            max_retries: ctx.config.max_retries,
            base_delay_ms: ctx.config.base_delay_ms,
        },
    )
    .with_progress(show_progress)
    .attach(kind, batch_id, &ctx.layout, &store)
    .await
}

/// Recompute every roll-up from the lean and topic stores and write the
/// report tables.
pub fn aggregate(ctx: &PipelineContext) -> Result<AggregateReport, PipelineError> {
    let lean = ResultsStore::new(ctx.layout.results_store(TaskKind::Lean)).read_latest()?;
    let topics = ResultsStore::new(ctx.layout.results_store(TaskKind::Topic)).read_latest()?;

    let directory = ctx.publications()?;
    if directory.is_empty() {
        warn!("publication directory has no entries; city and state tables will be empty");
    }

    let publications = publication_ratings(&lean);
    let report = AggregateReport {
        cities: city_ratings(&publications, directory),
        states: state_table(&publications, directory),
        categories: category_stats(&topics, &lean, ctx.config.category_min_count),
        publications,
    };
    report.write(&ctx.layout)?;
    info!(
        lean_rows = lean.len(),
        topic_rows = topics.len(),
        publications = report.publications.len(),
        cities = report.cities.len(),
        categories = report.categories.len(),
        "aggregation written"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindStatus {
    pub kind: TaskKind,
    pub resume_offset: usize,
    pub rows: usize,
}

pub fn status(ctx: &PipelineContext) -> Result<Vec<KindStatus>, PipelineError> {
    TaskKind::ALL
        .into_iter()
        .map(|kind| {
            Ok(KindStatus {
                kind,
                resume_offset: CheckpointLog::new(ctx.layout.checkpoint_log(kind)).resume_offset()?,
                rows: ResultsStore::new(ctx.layout.results_store(kind))
                    .read_all()?
                    .len(),
            })
        })
        .collect()
}
