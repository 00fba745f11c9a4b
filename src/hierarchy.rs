//! Length-prefixed, line-oriented codec for the corpus tree.
//!
//! A corpus is publications → sections → records. On disk every container is
//! preceded by a record holding its child count, every named level by a record
//! holding its name, and each leaf is one CSV record:
//!
//! ```text
//! 1
//! Lincoln Ledger
//! 2
//! News
//! 1
//! https://ledger.example/a,Headline,2024-05-01,Body text
//! Opinion
//! 0
//! ```
//!
//! CSV quoting keeps commas, quotes and line breaks inside fields intact, so a
//! "line" here is a CSV record. Blank lines are ignored.

use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, WriterBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct Section<T> {
    pub name: String,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Publication<T> {
    pub name: String,
    pub sections: Vec<Section<T>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Corpus<T> {
    pub publications: Vec<Publication<T>>,
}

impl<T> Default for Corpus<T> {
    fn default() -> Self {
        Self {
            publications: Vec::new(),
        }
    }
}

impl<T> Corpus<T> {
    pub fn item_count(&self) -> usize {
        self.publications
            .iter()
            .flat_map(|p| &p.sections)
            .map(|s| s.items.len())
            .sum()
    }

    /// Keep the tree shape, mapping or dropping each leaf.
    pub fn filter_map<U>(self, mut f: impl FnMut(T) -> Option<U>) -> Corpus<U> {
        let publications = self
            .publications
            .into_iter()
            .map(|p| Publication {
                name: p.name,
                sections: p
                    .sections
                    .into_iter()
                    .map(|s| Section {
                        name: s.name,
                        items: s.items.into_iter().filter_map(&mut f).collect(),
                    })
                    .collect(),
            })
            .collect();
        Corpus { publications }
    }
}

impl<T: Serialize> Corpus<T> {
    pub fn encode<W: Write>(&self, writer: W) -> Result<(), PipelineError> {
        let mut out = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(writer);

        out.write_record([self.publications.len().to_string()])?;
        for publication in &self.publications {
            out.write_record([publication.name.as_str()])?;
            out.write_record([publication.sections.len().to_string()])?;
            for section in &publication.sections {
                out.write_record([section.name.as_str()])?;
                out.write_record([section.items.len().to_string()])?;
                for item in &section.items {
                    out.serialize(item)?;
                }
            }
        }
        out.flush()?;
        Ok(())
    }

    pub fn write_path(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        self.encode(std::io::BufWriter::new(file))
    }
}

impl<T: DeserializeOwned> Corpus<T> {
    pub fn decode<R: Read>(reader: R) -> Result<Self, PipelineError> {
        let records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_records();
        let mut cursor = Cursor {
            records,
            consumed: 0,
        };

        let publication_count = cursor.count("publication")?;
        let mut publications = Vec::with_capacity(publication_count);
        for _ in 0..publication_count {
            let name = cursor.name("publication name")?;
            let section_count = cursor.count("section")?;
            let mut sections = Vec::with_capacity(section_count);
            for _ in 0..section_count {
                let section_name = cursor.name("section name")?;
                let item_count = cursor.count("item")?;
                let mut items = Vec::with_capacity(item_count);
                for n in 0..item_count {
                    items.push(cursor.item(n, item_count)?);
                }
                sections.push(Section {
                    name: section_name,
                    items,
                });
            }
            publications.push(Publication { name, sections });
        }

        cursor.finish()?;
        Ok(Corpus { publications })
    }

    pub fn read_path(path: &Path) -> Result<Self, PipelineError> {
        let file = std::fs::File::open(path)?;
        Self::decode(std::io::BufReader::new(file))
    }
}

struct Cursor<R: Read> {
    records: StringRecordsIntoIter<R>,
    consumed: u64,
}

impl<R: Read> Cursor<R> {
    fn malformed(&self, reason: String) -> PipelineError {
        PipelineError::MalformedHierarchy {
            record: self.consumed,
            reason,
        }
    }

    fn next(&mut self, expected: &str) -> Result<StringRecord, PipelineError> {
        match self.records.next() {
            Some(record) => {
                self.consumed += 1;
                Ok(record?)
            }
            None => Err(PipelineError::MalformedHierarchy {
                record: self.consumed + 1,
                reason: format!("stream ended while expecting {expected}"),
            }),
        }
    }

    fn single(&mut self, expected: &str) -> Result<String, PipelineError> {
        let record = self.next(expected)?;
        if record.len() != 1 {
            return Err(self.malformed(format!(
                "expected {expected}, found a record with {} fields",
                record.len()
            )));
        }
        Ok(record[0].to_string())
    }

    fn count(&mut self, level: &str) -> Result<usize, PipelineError> {
        let raw = self.single(&format!("{level} count"))?;
        raw.trim()
            .parse::<usize>()
            .map_err(|_| self.malformed(format!("{level} count {raw:?} is not a number")))
    }

    fn name(&mut self, expected: &str) -> Result<String, PipelineError> {
        self.single(expected)
    }

    fn item<T: DeserializeOwned>(&mut self, n: usize, declared: usize) -> Result<T, PipelineError> {
        let record = match self.records.next() {
            Some(record) => {
                self.consumed += 1;
                record?
            }
            None => {
                return Err(PipelineError::MalformedHierarchy {
                    record: self.consumed + 1,
                    reason: format!("declared {declared} items, stream ended after {n}"),
                });
            }
        };
        record
            .deserialize::<T>(None)
            .map_err(|e| self.malformed(format!("item {} of {declared} is malformed: {e}", n + 1)))
    }

    fn finish(mut self) -> Result<(), PipelineError> {
        match self.records.next() {
            None => Ok(()),
            Some(_) => {
                self.consumed += 1;
                Err(self.malformed("unexpected record after the declared tree".into()))
            }
        }
    }
}
