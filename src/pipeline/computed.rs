use crate::csv_source::{CensusReader, CensusRow, GEO_LEVEL_COUNTRY};
use crate::error::Result;
use crate::types::ComputedValues;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// Name fragments marking a characteristic as already computed (a rate,
/// percentage, average or dollar figure rather than a raw count).
const COMPUTED_NAME_MARKERS: &[&str] =
    &["Average", "Median", " %", "(%)", "index", " rate", "($)"];

/// Country-level counts below this are too small to divide by.
const SMALL_TOTAL_THRESHOLD: f64 = 10_000.0;

fn is_computed_name(name: &str) -> bool {
    COMPUTED_NAME_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Classifies country-level characteristics with two independent scans.
///
/// The keyword scan flags computed values and propagates an unindented
/// match to every indented row beneath it, until the next unindented
/// non-matching row resets the running header. The threshold scan flags
/// characteristics whose country count is too small to serve as a
/// denominator.
pub fn classify<I>(rows: I) -> Result<ComputedValues>
where
    I: IntoIterator<Item = Result<CensusRow>>,
{
    let mut values = ComputedValues::default();
    let mut under_computed_header = false;

    for row in rows {
        let row = row?;
        if row.geo_level != GEO_LEVEL_COUNTRY {
            continue;
        }

        let name = &row.characteristic_name;
        if is_computed_name(name) {
            values.computed_ids.insert(row.characteristic_id);
            if row.indentation() == 0 {
                under_computed_header = true;
            }
        } else if row.indentation() > 0 && under_computed_header {
            values.computed_ids.insert(row.characteristic_id);
        } else {
            under_computed_header = false;
        }

        if let Some(count) = row.count_total() {
            if count < SMALL_TOTAL_THRESHOLD {
                values.small_total_ids.insert(row.characteristic_id);
            }
        }
    }

    Ok(values)
}

/// Reads a census export and writes the classifier output.
pub fn run(input: &Path, output: &Path) -> Result<ComputedValues> {
    info!(input = %input.display(), "classifying computed values");

    let mut reader = CensusReader::open(input)?;
    let values = classify(reader.rows())?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer_pretty(writer, &values)?;

    info!(
        computed = values.computed_ids.len(),
        small_totals = values.small_total_ids.len(),
        output = %output.display(),
        "computed values written"
    );
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u32, name: &str, geo_level: &str, count: &str) -> Result<CensusRow> {
        Ok(CensusRow {
            characteristic_id: id,
            characteristic_name: name.to_string(),
            geo_level: geo_level.to_string(),
            c1_count_total: count.to_string(),
            dguid: String::new(),
        })
    }

    #[test]
    fn keyword_names_are_flagged() {
        let values = classify(vec![
            row(1, "Average age", GEO_LEVEL_COUNTRY, "40000"),
            row(2, "Median income ($)", GEO_LEVEL_COUNTRY, "40000"),
            row(3, "Population", GEO_LEVEL_COUNTRY, "40000"),
        ])
        .unwrap();

        assert!(values.computed_ids.contains(&1));
        assert!(values.computed_ids.contains(&2));
        assert!(!values.computed_ids.contains(&3));
    }

    #[test]
    fn computed_header_propagates_to_children() {
        let values = classify(vec![
            row(1, "Participation rate", GEO_LEVEL_COUNTRY, "40000"),
            row(2, "  Men", GEO_LEVEL_COUNTRY, "40000"),
            row(3, "  Women", GEO_LEVEL_COUNTRY, "40000"),
            row(4, "Population", GEO_LEVEL_COUNTRY, "40000"),
            row(5, "  0 to 14 years", GEO_LEVEL_COUNTRY, "40000"),
        ])
        .unwrap();

        assert!(values.computed_ids.contains(&2));
        assert!(values.computed_ids.contains(&3));
        // Header reset on the unindented "Population" row
        assert!(!values.computed_ids.contains(&4));
        assert!(!values.computed_ids.contains(&5));
    }

    #[test]
    fn indented_keyword_match_does_not_become_a_header() {
        let values = classify(vec![
            row(1, "Population", GEO_LEVEL_COUNTRY, "40000"),
            row(2, "  Average household size", GEO_LEVEL_COUNTRY, "40000"),
            row(3, "  0 to 14 years", GEO_LEVEL_COUNTRY, "40000"),
        ])
        .unwrap();

        assert!(values.computed_ids.contains(&2));
        assert!(!values.computed_ids.contains(&3));
    }

    #[test]
    fn small_country_totals_are_flagged() {
        let values = classify(vec![
            row(1, "Population", GEO_LEVEL_COUNTRY, "36991981"),
            row(2, "Farm operators", GEO_LEVEL_COUNTRY, "9500"),
            row(3, "Suppressed", GEO_LEVEL_COUNTRY, ".."),
        ])
        .unwrap();

        assert!(!values.small_total_ids.contains(&1));
        assert!(values.small_total_ids.contains(&2));
        // Unparseable counts are skipped rather than flagged
        assert!(!values.small_total_ids.contains(&3));
    }

    #[test]
    fn non_country_rows_are_ignored() {
        let values = classify(vec![
            row(1, "Average age", "Province", "100"),
            row(2, "Average age", "Dissemination area", "100"),
        ])
        .unwrap();

        assert!(values.computed_ids.is_empty());
        assert!(values.small_total_ids.is_empty());
    }
}
