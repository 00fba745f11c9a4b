//! Correlating a finished batch's output back to its articles.
//!
//! Each output line is read on its own. A line that fails to parse, has no
//! usable correlation key, carries no answer, or answers a request the batch
//! never held is logged and skipped; the rest of the batch is kept. Requests
//! of the chunk that have no result at all are reported as missing.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use crate::articles::CorrelationKey;
use crate::batch::ResultLine;
use crate::error::PipelineError;
use crate::store::{ResultRow, ResultsStore};
use crate::tasks::{Item, ResponseParser};

#[derive(Debug, Error)]
pub enum MalformedResultLine {
    #[error("not a result record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no custom_id")]
    MissingId,

    #[error(transparent)]
    Key(#[from] PipelineError),

    #[error("no answer for {custom_id} (status {status:?}): {detail}")]
    NoContent {
        custom_id: String,
        status: Option<u16>,
        detail: String,
    },
}

/// The requests a batch is known to hold.
#[derive(Debug, Clone)]
pub enum Expected {
    /// A chunk submitted by this run: only its keys belong to the batch.
    Chunk {
        order: Vec<String>,
        parsers: HashMap<String, ResponseParser>,
    },
    /// A batch submitted elsewhere: any key is accepted and read with one
    /// parser.
    Any(ResponseParser),
}

impl Expected {
    pub fn from_items(items: &[Item]) -> Self {
        let order: Vec<String> = items.iter().map(|i| i.key.to_string()).collect();
        let parsers = order
            .iter()
            .cloned()
            .zip(items.iter().map(Item::parser))
            .collect();
        Expected::Chunk { order, parsers }
    }

    fn parser_for(&self, custom_id: &str) -> Option<ResponseParser> {
        match self {
            Expected::Chunk { parsers, .. } => parsers.get(custom_id).copied(),
            Expected::Any(parser) => Some(*parser),
        }
    }
}

/// Rows recovered from one output stream.
#[derive(Debug, Default)]
pub struct Correlated {
    pub rows: Vec<ResultRow>,
    pub skipped: usize,
    /// Well-formed lines whose key is not part of the batch.
    pub unexpected: usize,
    /// Kept rows whose answer does not match the task's format.
    pub unparsed: usize,
    /// Chunk keys with no usable result, in submission order.
    pub missing: Vec<String>,
}

/// What one retrieval wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retrieval {
    pub appended: usize,
    /// Malformed and foreign lines.
    pub skipped: usize,
    pub missing: Vec<String>,
}

pub fn parse_line(line: &str) -> Result<ResultRow, MalformedResultLine> {
    let record: ResultLine = serde_json::from_str(line)?;
    let custom_id = record
        .custom_id
        .as_deref()
        .ok_or(MalformedResultLine::MissingId)?;
    let key: CorrelationKey = custom_id.parse()?;
    match record.content() {
        Some(content) => Ok(ResultRow::new(key, content)),
        None => Err(MalformedResultLine::NoContent {
            custom_id: custom_id.to_string(),
            status: record.response.as_ref().and_then(|r| r.status_code),
            detail: record
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "empty response body".into()),
        }),
    }
}

/// Parse every line of `raw`, keeping what belongs to `expected`. Answers
/// are stored as returned; the request's parser only counts the ones that
/// will read as neutral later.
pub fn correlate(raw: &str, expected: &Expected) -> Correlated {
    let mut out = Correlated::default();
    let mut answered = HashSet::new();
    for (n, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = match parse_line(line) {
            Ok(row) => row,
            Err(e) => {
                out.skipped += 1;
                warn!(line = n + 1, error = %e, "skipping malformed result line");
                continue;
            }
        };
        let custom_id = row.key().to_string();
        let Some(parser) = expected.parser_for(&custom_id) else {
            out.unexpected += 1;
            warn!(line = n + 1, custom_id = %custom_id, "result is not from this batch; skipping");
            continue;
        };
        if let Err(e) = parser.parse(&row.response) {
            out.unparsed += 1;
            debug!(line = n + 1, url = %row.url, error = %e, "answer does not match format");
        }
        answered.insert(custom_id);
        out.rows.push(row);
    }

    if let Expected::Chunk { order, .. } = expected {
        out.missing = order
            .iter()
            .filter(|key| !answered.contains(*key))
            .cloned()
            .collect();
    }
    if out.unparsed > 0 {
        warn!(unparsed = out.unparsed, "some answers do not match the task format");
    }
    if !out.missing.is_empty() {
        warn!(missing = out.missing.len(), "some requests came back without a result");
    }
    debug!(
        rows = out.rows.len(),
        skipped = out.skipped,
        unexpected = out.unexpected,
        "correlated batch output"
    );
    out
}

/// Correlate `raw` and append the rows to `store`.
pub fn retrieve_into(
    store: &ResultsStore,
    raw: &str,
    expected: &Expected,
) -> Result<Retrieval, PipelineError> {
    let correlated = correlate(raw, expected);
    let appended = store.append(&correlated.rows)?;
    Ok(Retrieval {
        appended,
        skipped: correlated.skipped + correlated.unexpected,
        missing: correlated.missing,
    })
}

/// Log each request the endpoint put in a batch's error file. Returns how
/// many there were.
pub fn log_request_errors(raw: &str) -> usize {
    let mut count = 0;
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        count += 1;
        match serde_json::from_str::<ResultLine>(line) {
            Ok(record) => warn!(
                custom_id = record.custom_id.as_deref().unwrap_or("-"),
                status = ?record.response.as_ref().and_then(|r| r.status_code),
                error = %record.error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "request failed at the endpoint"
            ),
            Err(e) => warn!(error = %e, "unreadable error file line"),
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articles::SourceArticle;
    use crate::tasks::TaskKind;

    fn ok_line(custom_id: &str, content: &str) -> String {
        serde_json::json!({
            "id": "batch_req_1",
            "custom_id": custom_id,
            "response": {
                "status_code": 200,
                "body": { "choices": [ { "index": 0, "message": { "role": "assistant", "content": content } } ] }
            },
            "error": null
        })
        .to_string()
    }

    fn items(kind: TaskKind, urls: &[&str]) -> Vec<Item> {
        urls.iter()
            .map(|url| {
                Item::new(
                    kind,
                    &SourceArticle {
                        publication: "Ledger".into(),
                        section: "News".into(),
                        url: url.to_string(),
                        headline: "Vote".into(),
                        body: "The board voted.".into(),
                    },
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn one_malformed_line_among_valid_ones() {
        let raw = [
            ok_line("Ledger|News|https://l.example/a", "Y"),
            "{not json".to_string(),
            ok_line("Ledger|News|https://l.example/b", "N"),
            ok_line("Review|Opinion|https://r.example/c", "Y"),
        ]
        .join("\n");

        let correlated = correlate(&raw, &Expected::Any(ResponseParser::YesNo));
        assert_eq!(correlated.rows.len(), 3);
        assert_eq!(correlated.skipped, 1);
        assert_eq!(correlated.rows[2].publication, "Review");
        assert_eq!(correlated.rows[2].url, "https://r.example/c");
        assert!(correlated.missing.is_empty());
    }

    #[test]
    fn order_does_not_matter() {
        let raw = format!(
            "{}\n{}\n",
            ok_line("Ledger|News|b", "2 | x"),
            ok_line("Ledger|News|a", "1 | y")
        );
        let expected = Expected::from_items(&items(TaskKind::Lean, &["a", "b"]));
        let correlated = correlate(&raw, &expected);
        let urls: Vec<String> = correlated.rows.into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["b", "a"]);
        assert!(correlated.missing.is_empty());
    }

    #[test]
    fn errored_request_is_skipped() {
        let line = serde_json::json!({
            "custom_id": "Ledger|News|a",
            "response": null,
            "error": { "code": "server_error", "message": "boom" }
        })
        .to_string();
        match parse_line(&line) {
            Err(MalformedResultLine::NoContent { custom_id, detail, .. }) => {
                assert_eq!(custom_id, "Ledger|News|a");
                assert!(detail.contains("boom"));
            }
            other => panic!("expected NoContent, got {other:?}"),
        }
    }

    #[test]
    fn missing_or_bad_key_is_skipped() {
        let no_id = serde_json::json!({ "response": null }).to_string();
        assert!(matches!(parse_line(&no_id), Err(MalformedResultLine::MissingId)));
        assert!(matches!(
            parse_line(&ok_line("only|two", "Y")),
            Err(MalformedResultLine::Key(_))
        ));
    }

    #[test]
    fn unreadable_answers_are_kept_and_counted() {
        let raw = format!(
            "{}\n{}\n",
            ok_line("Ledger|News|a", "4 | firm"),
            ok_line("Ledger|News|b", "leans left")
        );
        let expected = Expected::from_items(&items(TaskKind::Lean, &["a", "b"]));
        let correlated = correlate(&raw, &expected);
        assert_eq!(correlated.rows.len(), 2);
        assert_eq!(correlated.unparsed, 1);
        assert_eq!(correlated.skipped, 0);
    }

    #[test]
    fn chunk_keys_without_a_result_are_missing() {
        let raw = [
            ok_line("Ledger|News|b", "Y"),
            serde_json::json!({
                "custom_id": "Ledger|News|c",
                "response": null,
                "error": { "code": "server_error", "message": "boom" }
            })
            .to_string(),
        ]
        .join("\n");
        let expected = Expected::from_items(&items(TaskKind::Screen, &["a", "b", "c"]));

        let correlated = correlate(&raw, &expected);
        assert_eq!(correlated.rows.len(), 1);
        assert_eq!(correlated.missing, vec!["Ledger|News|a", "Ledger|News|c"]);
    }

    #[test]
    fn foreign_keys_are_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultsStore::new(dir.path().join("article_screen.csv"));
        let raw = [
            ok_line("Ledger|News|a", "Y"),
            ok_line("Ledger|News|elsewhere", "Y"),
        ]
        .join("\n");
        let expected = Expected::from_items(&items(TaskKind::Screen, &["a"]));

        let retrieval = retrieve_into(&store, &raw, &expected).unwrap();
        assert_eq!(retrieval.appended, 1);
        assert_eq!(retrieval.skipped, 1);
        assert!(retrieval.missing.is_empty());
        assert_eq!(store.read_all().unwrap()[0].url, "a");
    }

    #[test]
    fn blank_lines_are_not_counted() {
        let raw = format!("\n{}\n\n", ok_line("Ledger|News|a", "Y"));
        let correlated = correlate(&raw, &Expected::Any(ResponseParser::YesNo));
        assert_eq!(correlated.rows.len(), 1);
        assert_eq!(correlated.skipped, 0);
    }

    #[test]
    fn retrieval_appends_rather_than_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultsStore::new(dir.path().join("article_screen.csv"));
        let raw = ok_line("Ledger|News|a", "Y");
        let expected = Expected::Any(ResponseParser::YesNo);

        assert_eq!(retrieve_into(&store, &raw, &expected).unwrap().appended, 1);
        assert_eq!(retrieve_into(&store, &raw, &expected).unwrap().appended, 1);
        assert_eq!(store.read_all().unwrap().len(), 2);
    }

    #[test]
    fn error_file_lines_are_counted() {
        let raw = [
            serde_json::json!({
                "custom_id": "Ledger|News|a",
                "response": { "status_code": 400, "body": null },
                "error": { "code": "invalid_request", "message": "too long" }
            })
            .to_string(),
            "not json".to_string(),
            String::new(),
        ]
        .join("\n");
        assert_eq!(log_request_errors(&raw), 2);
    }
}
