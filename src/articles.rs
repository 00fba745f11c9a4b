//! Article records and the correlation key that round-trips through the
//! batch endpoint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::hierarchy::{Corpus, Publication, Section};

/// Separator between the components of a correlation key.
pub const KEY_DELIMITER: char = '|';

/// Leaf record of a scraped corpus, in on-disk column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub headline: String,
    pub date: String,
    pub body: String,
}

/// Flat article tuple handed over by the scraping collaborator, in its
/// column order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceArticle {
    pub publication: String,
    pub section: String,
    pub url: String,
    pub headline: String,
    pub body: String,
}

impl SourceArticle {
    pub fn key(&self) -> Result<CorrelationKey, PipelineError> {
        CorrelationKey::new(&self.publication, &self.section, &self.url)
    }
}

/// `publication|section|url`.
///
/// The URL is last so it may itself contain the delimiter; publication and
/// section may not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationKey {
    pub publication: String,
    pub section: String,
    pub url: String,
}

impl CorrelationKey {
    pub fn new(publication: &str, section: &str, url: &str) -> Result<Self, PipelineError> {
        if publication.contains(KEY_DELIMITER) || section.contains(KEY_DELIMITER) {
            return Err(PipelineError::InvalidCorrelationKey(format!(
                "publication {publication:?} or section {section:?} contains '{KEY_DELIMITER}'"
            )));
        }
        if url.is_empty() {
            return Err(PipelineError::InvalidCorrelationKey(format!(
                "empty url for {publication}/{section}"
            )));
        }
        Ok(Self {
            publication: publication.to_string(),
            section: section.to_string(),
            url: url.to_string(),
        })
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_DELIMITER}{}{KEY_DELIMITER}{}",
            self.publication, self.section, self.url
        )
    }
}

impl FromStr for CorrelationKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, KEY_DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(publication), Some(section), Some(url)) => {
                CorrelationKey::new(publication, section, url)
            }
            _ => Err(PipelineError::InvalidCorrelationKey(s.to_string())),
        }
    }
}

impl Corpus<Article> {
    /// Publication/section/article order, as written.
    pub fn flatten(&self) -> Vec<SourceArticle> {
        let mut out = Vec::with_capacity(self.item_count());
        for publication in &self.publications {
            for section in &publication.sections {
                for article in &section.items {
                    out.push(SourceArticle {
                        publication: publication.name.clone(),
                        section: section.name.clone(),
                        url: article.url.clone(),
                        headline: article.headline.clone(),
                        body: article.body.clone(),
                    });
                }
            }
        }
        out
    }

    /// Group flat tuples by publication, then section, in first-seen order.
    /// `date` is not part of the scraper tuple and is left empty.
    pub fn from_flat(articles: impl IntoIterator<Item = SourceArticle>) -> Self {
        let mut corpus = Corpus::default();
        for a in articles {
            let pi = match corpus
                .publications
                .iter()
                .position(|p| p.name == a.publication)
            {
                Some(i) => i,
                None => {
                    corpus.publications.push(Publication {
                        name: a.publication.clone(),
                        sections: Vec::new(),
                    });
                    corpus.publications.len() - 1
                }
            };
            let publication = &mut corpus.publications[pi];
            let si = match publication
                .sections
                .iter()
                .position(|s| s.name == a.section)
            {
                Some(i) => i,
                None => {
                    publication.sections.push(Section {
                        name: a.section.clone(),
                        items: Vec::new(),
                    });
                    publication.sections.len() - 1
                }
            };
            let section = &mut publication.sections[si];
            section.items.push(Article {
                url: a.url,
                headline: a.headline,
                date: String::new(),
                body: a.body,
            });
        }
        corpus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(publication: &str, section: &str, url: &str) -> SourceArticle {
        SourceArticle {
            publication: publication.into(),
            section: section.into(),
            url: url.into(),
            headline: format!("H {url}"),
            body: format!("B {url}"),
        }
    }

    #[test]
    fn key_display_and_parse() {
        let key = CorrelationKey::new("Ledger", "News", "https://l.example/a").unwrap();
        assert_eq!(key.to_string(), "Ledger|News|https://l.example/a");
        assert_eq!(key.to_string().parse::<CorrelationKey>().unwrap(), key);
    }

    #[test]
    fn url_may_contain_delimiter() {
        let key: CorrelationKey = "Ledger|News|https://l.example/?q=a|b".parse().unwrap();
        assert_eq!(key.url, "https://l.example/?q=a|b");
    }

    #[test]
    fn delimiter_in_group_is_rejected() {
        assert!(CorrelationKey::new("Led|ger", "News", "u").is_err());
        assert!(CorrelationKey::new("Ledger", "Ne|ws", "u").is_err());
    }

    #[test]
    fn short_key_is_rejected() {
        assert!("Ledger|News".parse::<CorrelationKey>().is_err());
        assert!("Ledger|News|".parse::<CorrelationKey>().is_err());
    }

    #[test]
    fn flat_round_trip_groups_in_first_seen_order() {
        let flat = vec![
            source("Ledger", "News", "a"),
            source("Ledger", "Sports", "b"),
            source("Review", "News", "c"),
            source("Ledger", "News", "d"),
        ];
        let corpus = Corpus::from_flat(flat);
        assert_eq!(corpus.publications.len(), 2);
        assert_eq!(corpus.publications[0].name, "Ledger");
        assert_eq!(corpus.publications[0].sections[0].items.len(), 2);

        let urls: Vec<String> = corpus.flatten().into_iter().map(|a| a.url).collect();
        assert_eq!(urls, vec!["a", "d", "b", "c"]);
    }
}
