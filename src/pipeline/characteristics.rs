use crate::csv_source::{CensusReader, CensusRow};
use crate::error::Result;
use crate::types::Characteristic;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// Resolves the characteristic hierarchy out of the indentation encoding.
///
/// Every unindented row resets the running total id; indented rows reference
/// the most recent one. Ids repeat once per geography in the exports, so the
/// first occurrence wins and the rest are dropped.
pub fn parse_characteristics<I>(rows: I) -> Result<Vec<Characteristic>>
where
    I: IntoIterator<Item = Result<CensusRow>>,
{
    let mut characteristics = Vec::new();
    let mut current_total: Option<u32> = None;
    let mut added_ids = HashSet::new();

    for row in rows {
        let row = row?;
        let indentation = row.indentation();

        if indentation == 0 {
            current_total = Some(row.characteristic_id);
        }

        if !added_ids.insert(row.characteristic_id) {
            continue;
        }

        // Unindented characteristics are their own universe rather than a
        // proportion of some parent.
        let total_variable = if indentation == 0 { None } else { current_total };

        characteristics.push(Characteristic {
            characteristic_name: row.trimmed_name().to_string(),
            indentation,
            total_variable,
            characteristic_id: row.characteristic_id,
        });
    }

    Ok(characteristics)
}

/// Reads a census export and writes the resolved characteristic list.
pub fn run(input: &Path, output: &Path) -> Result<Vec<Characteristic>> {
    info!(input = %input.display(), "parsing characteristic hierarchy");

    let mut reader = CensusReader::open(input)?;
    let characteristics = parse_characteristics(reader.rows())?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer_pretty(writer, &characteristics)?;

    info!(
        count = characteristics.len(),
        output = %output.display(),
        "characteristic list written"
    );
    Ok(characteristics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u32, name: &str) -> Result<CensusRow> {
        Ok(CensusRow {
            characteristic_id: id,
            characteristic_name: name.to_string(),
            geo_level: "Country".to_string(),
            c1_count_total: String::new(),
            dguid: String::new(),
        })
    }

    #[test]
    fn unindented_rows_have_no_total_reference() {
        let parsed = parse_characteristics(vec![row(1, "Total"), row(2, " Sub A")]).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].characteristic_id, 1);
        assert_eq!(parsed[0].total_variable, None);
        assert_eq!(parsed[1].characteristic_id, 2);
        assert_eq!(parsed[1].total_variable, Some(1));
    }

    #[test]
    fn indented_rows_reference_the_nearest_preceding_header() {
        let parsed = parse_characteristics(vec![
            row(1, "Total - Age"),
            row(2, "  0 to 14 years"),
            row(3, "  15 to 64 years"),
            row(10, "Total - Income"),
            row(11, "  Median income"),
        ])
        .unwrap();

        assert_eq!(parsed[1].total_variable, Some(1));
        assert_eq!(parsed[2].total_variable, Some(1));
        assert_eq!(parsed[3].total_variable, None);
        assert_eq!(parsed[4].total_variable, Some(10));
    }

    #[test]
    fn duplicate_ids_keep_the_first_occurrence() {
        let parsed = parse_characteristics(vec![
            row(1, "Total - Age"),
            row(2, "  0 to 14 years"),
            // Same block repeated for the next geography
            row(1, "Total - Age"),
            row(2, "  0 to 14 years"),
        ])
        .unwrap();

        assert_eq!(parsed.len(), 2);
        let ids: Vec<u32> = parsed.iter().map(|c| c.characteristic_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn names_are_trimmed_and_depth_is_recorded() {
        let parsed = parse_characteristics(vec![row(1, "Total - Age"), row(2, "    25 to 34")]).unwrap();
        assert_eq!(parsed[1].characteristic_name, "25 to 34");
        assert_eq!(parsed[1].indentation, 4);
    }
}
