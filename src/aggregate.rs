//! Rolling article scores up into publication, city, state and topic figures.
//!
//! Publication ratings use a signed root-mean-square so that a few strongly
//! rated articles are not averaged away by many mild ones. Cities average
//! their publications' ratings with a plain mean. Both return `None` for an
//! empty input.
//!
//! Every roll-up is recomputed from the results stores on each run; rows are
//! first collapsed to one per correlation key, last write winning.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::context::PublicationDirectory;
use crate::store::ResultRow;
use crate::tasks::{lean_or_neutral, parse_topic};

/// `sign(S) * sqrt(|S|)` with `S = (Σ p² − Σ n²) / len`, where `p` are the
/// non-negative ratings and `n` the negative ones.
pub fn signed_rms(ratings: &[f64]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let s = ratings
        .iter()
        .map(|&r| if r < 0.0 { -(r * r) } else { r * r })
        .sum::<f64>()
        / ratings.len() as f64;
    if s == 0.0 {
        return Some(0.0);
    }
    Some(s.signum() * s.abs().sqrt())
}

pub fn mean(ratings: &[f64]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
}

/// Publication name → signed RMS of its articles' lean ratings.
pub fn publication_ratings(lean_rows: &[ResultRow]) -> BTreeMap<String, f64> {
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in lean_rows {
        grouped
            .entry(row.publication.clone())
            .or_default()
            .push(lean_or_neutral(&row.response));
    }
    grouped
        .into_iter()
        .filter_map(|(name, ratings)| signed_rms(&ratings).map(|r| (name, r)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CityRating {
    pub state: String,
    pub city: String,
    pub rating: f64,
    pub publications: usize,
}

/// State → its publications and their ratings.
pub type StateTable = BTreeMap<String, Vec<(String, f64)>>;

/// Group publication ratings by state and city through the directory.
/// Publications missing from the directory are left out.
fn by_location(
    publications: &BTreeMap<String, f64>,
    directory: &PublicationDirectory,
) -> BTreeMap<(String, String), Vec<(String, f64)>> {
    let mut grouped: BTreeMap<(String, String), Vec<(String, f64)>> = BTreeMap::new();
    for (name, &rating) in publications {
        match directory.get(name) {
            Some(info) => grouped
                .entry((info.state.clone(), info.city.clone()))
                .or_default()
                .push((name.clone(), rating)),
            None => warn!(publication = %name, "publication not in directory; skipping"),
        }
    }
    grouped
}

pub fn city_ratings(
    publications: &BTreeMap<String, f64>,
    directory: &PublicationDirectory,
) -> Vec<CityRating> {
    by_location(publications, directory)
        .into_iter()
        .filter_map(|((state, city), pubs)| {
            let ratings: Vec<f64> = pubs.iter().map(|(_, r)| *r).collect();
            mean(&ratings).map(|rating| CityRating {
                state,
                city,
                rating,
                publications: pubs.len(),
            })
        })
        .collect()
}

pub fn state_table(
    publications: &BTreeMap<String, f64>,
    directory: &PublicationDirectory,
) -> StateTable {
    let mut table = StateTable::new();
    for ((state, _city), pubs) in by_location(publications, directory) {
        table.entry(state).or_default().extend(pubs);
    }
    table
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStat {
    pub topic: String,
    /// Topic-classified articles that also have a lean rating.
    pub count: usize,
    pub mean_lean: f64,
}

/// Frequency and mean lean per topic, dropping topics seen fewer than
/// `min_count` times.
pub fn category_stats(
    topic_rows: &[ResultRow],
    lean_rows: &[ResultRow],
    min_count: usize,
) -> Vec<CategoryStat> {
    let leans: HashMap<(&str, &str, &str), f64> = lean_rows
        .iter()
        .map(|r| {
            (
                (r.publication.as_str(), r.section.as_str(), r.url.as_str()),
                lean_or_neutral(&r.response),
            )
        })
        .collect();

    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in topic_rows {
        let Ok(topic) = parse_topic(&row.response) else {
            continue;
        };
        let key = (row.publication.as_str(), row.section.as_str(), row.url.as_str());
        if let Some(&lean) = leans.get(&key) {
            grouped.entry(topic).or_default().push(lean);
        }
    }

    grouped
        .into_iter()
        .filter(|(_, ratings)| ratings.len() >= min_count)
        .filter_map(|(topic, ratings)| {
            mean(&ratings).map(|mean_lean| CategoryStat {
                topic,
                count: ratings.len(),
                mean_lean,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PublicationInfo;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn row(publication: &str, url: &str, response: &str) -> ResultRow {
        ResultRow {
            publication: publication.into(),
            section: "News".into(),
            url: url.into(),
            response: response.into(),
        }
    }

    fn directory() -> PublicationDirectory {
        let info = |name: &str, state: &str, city: &str| PublicationInfo {
            name: name.into(),
            state: state.into(),
            city: city.into(),
            link: String::new(),
        };
        PublicationDirectory::from_entries([
            info("Ledger", "NE", "Lincoln"),
            info("Star", "NE", "Lincoln"),
            info("Review", "IA", "Ames"),
        ])
    }

    #[test]
    fn signed_rms_edge_cases() {
        assert_eq!(signed_rms(&[]), None);
        assert!(close(signed_rms(&[7.5]).unwrap(), 7.5));
        assert!(close(signed_rms(&[-7.5]).unwrap(), -7.5));
        assert_eq!(signed_rms(&[5.0, -5.0]), Some(0.0));
    }

    #[test]
    fn signed_rms_weights_extremes() {
        // Mean would be (−3·4 + 12) / 5 = 0; RMS keeps the strong right lean.
        let ratings = [-3.0, -3.0, -3.0, -3.0, 12.0];
        assert!(close(mean(&ratings).unwrap(), 0.0));
        let expected = ((144.0 - 36.0) / 5.0f64).sqrt();
        assert!(close(signed_rms(&ratings).unwrap(), expected));
    }

    #[test]
    fn mean_edge_cases() {
        assert_eq!(mean(&[]), None);
        assert!(close(mean(&[10.0, -10.0, 20.0]).unwrap(), 20.0 / 3.0));
    }

    #[test]
    fn publication_ratings_use_neutral_for_unreadable() {
        let rows = vec![
            row("Ledger", "a", "6 | firm"),
            row("Ledger", "b", "garbled"),
            row("Review", "c", "-4 | mild"),
        ];
        let ratings = publication_ratings(&rows);
        assert!(close(ratings["Ledger"], (36.0f64 / 2.0).sqrt()));
        assert!(close(ratings["Review"], -4.0));
    }

    #[test]
    fn city_ratings_average_publications() {
        let pubs = BTreeMap::from([
            ("Ledger".to_string(), 4.0),
            ("Star".to_string(), -2.0),
            ("Review".to_string(), 1.0),
            ("Nowhere Daily".to_string(), 30.0),
        ]);
        let cities = city_ratings(&pubs, &directory());
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0].city, "Ames");
        let lincoln = &cities[1];
        assert_eq!((lincoln.state.as_str(), lincoln.publications), ("NE", 2));
        assert!(close(lincoln.rating, 1.0));
    }

    #[test]
    fn state_table_lists_publications() {
        let pubs = BTreeMap::from([("Ledger".to_string(), 4.0), ("Star".to_string(), -2.0)]);
        let table = state_table(&pubs, &directory());
        assert_eq!(
            table["NE"],
            vec![("Ledger".to_string(), 4.0), ("Star".to_string(), -2.0)]
        );
        assert!(!table.contains_key("IA"));
    }

    #[test]
    fn category_stats_join_topics_to_leans() {
        let lean = vec![
            row("Ledger", "a", "10 | x"),
            row("Ledger", "b", "-4 | y"),
            row("Ledger", "c", "3 | z"),
        ];
        let topics = vec![
            row("Ledger", "a", "economy"),
            row("Ledger", "b", "economy."),
            row("Ledger", "c", "crime"),
            row("Ledger", "d", "crime"),
        ];

        let stats = category_stats(&topics, &lean, 1);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].topic, "crime");
        assert_eq!(stats[0].count, 1);
        assert_eq!(stats[1].topic, "economy");
        assert_eq!(stats[1].count, 2);
        assert!(close(stats[1].mean_lean, 3.0));

        assert_eq!(category_stats(&topics, &lean, 2).len(), 1);
    }
}
