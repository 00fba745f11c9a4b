//! Output tables for the reporting side, written as headerless CSV.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;

use crate::aggregate::{CategoryStat, CityRating, StateTable};
use crate::config::Layout;
use crate::error::PipelineError;

pub const PUBLICATION_TABLE: &str = "pub_politics";
pub const CITY_TABLE: &str = "city_politics";
pub const STATE_TABLE: &str = "state_politics";
pub const CATEGORY_TABLE: &str = "category_stats";

/// Everything one aggregation run produces.
#[derive(Debug, Clone, Default)]
pub struct AggregateReport {
    pub publications: BTreeMap<String, f64>,
    pub cities: Vec<CityRating>,
    pub states: StateTable,
    pub categories: Vec<CategoryStat>,
}

fn writer<W: Write>(out: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(out)
}

/// `name,rating`
pub fn write_publications<W: Write>(
    out: W,
    publications: &BTreeMap<String, f64>,
) -> Result<(), PipelineError> {
    let mut w = writer(out);
    for (name, rating) in publications {
        w.write_record([name.clone(), rating.to_string()])?;
    }
    w.flush()?;
    Ok(())
}

/// `state,city,rating`
pub fn write_cities<W: Write>(out: W, cities: &[CityRating]) -> Result<(), PipelineError> {
    let mut w = writer(out);
    for c in cities {
        w.write_record([c.state.clone(), c.city.clone(), c.rating.to_string()])?;
    }
    w.flush()?;
    Ok(())
}

/// `state,pub,rating,pub,rating,...`
pub fn write_states<W: Write>(out: W, states: &StateTable) -> Result<(), PipelineError> {
    let mut w = writer(out);
    for (state, pubs) in states {
        let mut record = vec![state.clone()];
        for (name, rating) in pubs {
            record.push(name.clone());
            record.push(rating.to_string());
        }
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

/// `topic,count,mean_lean`
pub fn write_categories<W: Write>(
    out: W,
    categories: &[CategoryStat],
) -> Result<(), PipelineError> {
    let mut w = writer(out);
    for c in categories {
        w.write_record([c.topic.clone(), c.count.to_string(), c.mean_lean.to_string()])?;
    }
    w.flush()?;
    Ok(())
}

fn create(path: &Path) -> Result<std::io::BufWriter<std::fs::File>, PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::io::BufWriter::new(std::fs::File::create(path)?))
}

impl AggregateReport {
    /// Overwrite the four tables under `results/`.
    pub fn write(&self, layout: &Layout) -> Result<(), PipelineError> {
        write_publications(create(&layout.report(PUBLICATION_TABLE))?, &self.publications)?;
        write_cities(create(&layout.report(CITY_TABLE))?, &self.cities)?;
        write_states(create(&layout.report(STATE_TABLE))?, &self.states)?;
        write_categories(create(&layout.report(CATEGORY_TABLE))?, &self.categories)?;
        Ok(())
    }
}
