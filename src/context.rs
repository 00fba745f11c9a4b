//! Read-only lookups shared by the pipeline stages.
//!
//! Everything here is built once from files under the data directory, on
//! first use, and handed out by reference; nothing mutates it afterwards.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::articles::Article;
use crate::config::{Config, Layout};
use crate::error::PipelineError;
use crate::hierarchy::Corpus;

/// One row of `publications.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublicationInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "State/Country")]
    pub state: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "Link", default)]
    pub link: String,
}

/// Publication name → location.
#[derive(Debug, Clone, Default)]
pub struct PublicationDirectory {
    by_name: HashMap<String, PublicationInfo>,
}

impl PublicationDirectory {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut entries = Vec::new();
        for (n, row) in reader.deserialize::<PublicationInfo>().enumerate() {
            match row {
                Ok(info) => entries.push(info),
                Err(e) => warn!(row = n + 2, error = %e, "skipping unreadable publication row"),
            }
        }
        debug!(publications = entries.len(), "loaded publication directory");
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = PublicationInfo>) -> Self {
        Self {
            by_name: entries
                .into_iter()
                .map(|info| (info.name.clone(), info))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PublicationInfo> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleText {
    pub headline: String,
    pub body: String,
}

/// URL → headline and body of the abridged corpus.
#[derive(Debug, Clone, Default)]
pub struct ArticleIndex {
    by_url: HashMap<String, ArticleText>,
}

impl ArticleIndex {
    /// First occurrence of a URL wins.
    pub fn from_corpus(corpus: &Corpus<Article>) -> Self {
        let mut by_url = HashMap::with_capacity(corpus.item_count());
        for article in corpus
            .publications
            .iter()
            .flat_map(|p| &p.sections)
            .flat_map(|s| &s.items)
        {
            by_url
                .entry(article.url.clone())
                .or_insert_with(|| ArticleText {
                    headline: article.headline.clone(),
                    body: article.body.clone(),
                });
        }
        Self { by_url }
    }

    pub fn get(&self, url: &str) -> Option<&ArticleText> {
        self.by_url.get(url)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}

/// Configuration, derived paths, and the lookups built from the data
/// directory, fixed for the life of a run.
#[derive(Debug)]
pub struct PipelineContext {
    pub config: Config,
    pub layout: Layout,
    corpus: OnceLock<Corpus<Article>>,
    index: OnceLock<ArticleIndex>,
    publications: OnceLock<PublicationDirectory>,
}

impl PipelineContext {
    pub fn new(config: Config) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            corpus: OnceLock::new(),
            index: OnceLock::new(),
            publications: OnceLock::new(),
        }
    }

    /// The abridged corpus, read on first use.
    pub fn abridged_corpus(&self) -> Result<&Corpus<Article>, PipelineError> {
        if let Some(corpus) = self.corpus.get() {
            return Ok(corpus);
        }
        let path = self.layout.abridged_corpus();
        let corpus = Corpus::read_path(&path)?;
        debug!(path = %path.display(), articles = corpus.item_count(), "loaded abridged corpus");
        Ok(self.corpus.get_or_init(|| corpus))
    }

    pub fn article_index(&self) -> Result<&ArticleIndex, PipelineError> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let index = ArticleIndex::from_corpus(self.abridged_corpus()?);
        Ok(self.index.get_or_init(|| index))
    }

    /// The publication directory; empty, with a warning, when the file is
    /// absent.
    pub fn publications(&self) -> Result<&PublicationDirectory, PipelineError> {
        if let Some(directory) = self.publications.get() {
            return Ok(directory);
        }
        let path = self.layout.publications();
        let directory = if path.exists() {
            PublicationDirectory::load(&path)?
        } else {
            warn!(path = %path.display(), "no publication directory");
            PublicationDirectory::default()
        };
        Ok(self.publications.get_or_init(|| directory))
    }
}
