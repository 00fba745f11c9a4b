//! Append-only resumption log, one per task kind.
//!
//! Each completed chunk appends `next_offset,end,skip_rows,recorded_at`. The
//! last readable row is the offset a new run starts from. `skip_rows` records
//! how the item list was drawn, since an offset only means something against
//! the same list.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;
use crate::planner::Chunk;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// First offset not yet processed.
    pub next_offset: usize,
    /// Last offset of the chunk that completed.
    pub end: usize,
    /// Screen rows skipped when the item list was sourced.
    pub skip_rows: usize,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CheckpointLog {
    path: PathBuf,
}

impl CheckpointLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that every item up to and including the chunk's end is
    /// processed.
    pub fn record<T>(
        &self,
        chunk: &Chunk<'_, T>,
        skip_rows: usize,
    ) -> Result<CheckpointRecord, PipelineError> {
        let record = CheckpointRecord {
            next_offset: chunk.next_offset(),
            end: chunk.end,
            skip_rows,
            recorded_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(&record)?;
        writer.flush()?;
        Ok(record)
    }

    /// Last record in the log, or `None` when the log is missing or holds no
    /// readable rows.
    pub fn last(&self) -> Result<Option<CheckpointRecord>, PipelineError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        let mut last = None;
        for (n, row) in reader.deserialize::<CheckpointRecord>().enumerate() {
            match row {
                Ok(record) => last = Some(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    row = n + 1,
                    error = %e,
                    "skipping unreadable checkpoint row"
                ),
            }
        }
        Ok(last)
    }

    /// Where a resumed run starts: the last `next_offset`, or 0.
    pub fn resume_offset(&self) -> Result<usize, PipelineError> {
        Ok(self.last()?.map_or(0, |r| r.next_offset))
    }

    /// Resume offset for an item list sourced with `skip_rows`. A different
    /// value than the one recorded means a different list; the offset is
    /// still returned, with a warning.
    pub fn resume_for(&self, skip_rows: usize) -> Result<usize, PipelineError> {
        let Some(last) = self.last()? else {
            return Ok(0);
        };
        if last.skip_rows != skip_rows {
            warn!(
                path = %self.path.display(),
                recorded = last.skip_rows,
                requested = skip_rows,
                next_offset = last.next_offset,
                "resuming with a different --skip-rows than the checkpoint was written with"
            );
        }
        Ok(last.next_offset)
    }
}
