//! Append-only results store: one CSV file per task kind with rows of
//! `publication,section,url,response`.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::articles::CorrelationKey;
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub publication: String,
    pub section: String,
    pub url: String,
    pub response: String,
}

impl ResultRow {
    pub fn new(key: CorrelationKey, response: impl Into<String>) -> Self {
        Self {
            publication: key.publication,
            section: key.section,
            url: key.url,
            response: response.into(),
        }
    }

    /// The correlation key this row answers.
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey {
            publication: self.publication.clone(),
            section: self.section.clone(),
            url: self.url.clone(),
        }
    }

    fn identity(&self) -> (&str, &str, &str) {
        (&self.publication, &self.section, &self.url)
    }
}

#[derive(Debug, Clone)]
pub struct ResultsStore {
    path: PathBuf,
}

impl ResultsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows; existing rows are never rewritten.
    pub fn append(&self, rows: &[ResultRow]) -> Result<usize, PipelineError> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(rows.len())
    }

    /// Every readable row in file order. A missing store is empty.
    pub fn read_all(&self) -> Result<Vec<ResultRow>, PipelineError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        let mut rows = Vec::new();
        for (n, row) in reader.deserialize::<ResultRow>().enumerate() {
            match row {
                Ok(row) => rows.push(row),
                Err(e) => warn!(
                    path = %self.path.display(),
                    row = n + 1,
                    error = %e,
                    "skipping unreadable result row"
                ),
            }
        }
        Ok(rows)
    }

    /// Rows with one row per correlation key, the last written winning.
    pub fn read_latest(&self) -> Result<Vec<ResultRow>, PipelineError> {
        Ok(latest_per_key(self.read_all()?))
    }
}

/// Collapse duplicate correlation keys, keeping the last row for each key at
/// the position where the key first appeared.
pub fn latest_per_key(rows: Vec<ResultRow>) -> Vec<ResultRow> {
    let mut position: HashMap<(String, String, String), usize> = HashMap::new();
    let mut out: Vec<ResultRow> = Vec::with_capacity(rows.len());
    for row in rows {
        let (p, s, u) = row.identity();
        let key = (p.to_string(), s.to_string(), u.to_string());
        match position.get(&key) {
            Some(&i) => out[i] = row,
            None => {
                position.insert(key, out.len());
                out.push(row);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str, response: &str) -> ResultRow {
        ResultRow {
            publication: "Ledger".into(),
            section: "News".into(),
            url: url.into(),
            response: response.into(),
        }
    }

    #[test]
    fn append_accumulates_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultsStore::new(dir.path().join("results").join("article_lean.csv"));
        assert!(store.read_all().unwrap().is_empty());

        store.append(&[row("a", "3 | mild")]).unwrap();
        store.append(&[row("b", "-8, left"), row("a", "5 | firm")]).unwrap();

        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].response, "-8, left");
    }

    #[test]
    fn latest_row_wins_at_first_position() {
        let rows = vec![row("a", "1"), row("b", "2"), row("a", "3")];
        let latest = latest_per_key(rows);
        assert_eq!(latest, vec![row("a", "3"), row("b", "2")]);
    }

    #[test]
    fn same_url_in_other_section_is_distinct() {
        let mut other = row("a", "9");
        other.section = "Opinion".into();
        let latest = latest_per_key(vec![row("a", "1"), other.clone()]);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[1], other);
    }

    #[test]
    fn row_from_key() {
        let key: CorrelationKey = "Ledger|News|https://l.example/a".parse().unwrap();
        let row = ResultRow::new(key, "Y");
        assert_eq!(row.url, "https://l.example/a");
        assert_eq!(row.response, "Y");
    }

    #[test]
    fn short_rows_are_skipped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("article_screen.csv");
        std::fs::write(&path, "Ledger,News,a,Y\nbroken\nLedger,News,b,N\n").unwrap();
        let rows = ResultsStore::new(&path).read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].url, "b");
    }
}
