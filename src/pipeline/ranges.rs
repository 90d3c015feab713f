use crate::csv_source::{CensusReader, GEO_LEVEL_DISSEMINATION_AREA};
use crate::error::{Result, PrepError};
use crate::pipeline::menu::load_menu;
use crate::types::{Menu, Range};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Census export file names all share this fragment.
const CENSUS_FILE_MARKER: &str = "English_CSV_data";

/// Trim 5% from each end of the sorted values; fall back to 1%, then to the
/// raw extremes, when trimming squashes the maximum below one.
const INITIAL_TRIM: f64 = 0.05;
const SECONDARY_TRIM: f64 = 0.01;

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn census_files(census_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(census_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.contains(CENSUS_FILE_MARKER))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(PrepError::Config(format!(
            "no census exports matching '{}' under {}",
            CENSUS_FILE_MARKER,
            census_dir.display()
        )));
    }
    Ok(files)
}

fn trim_slice(values: &[f64], trim: f64) -> &[f64] {
    let cut = (values.len() as f64 * trim).floor() as usize;
    &values[cut..values.len() - cut]
}

/// Min/max of the sorted, trimmed value set. `None` when no finite values
/// survive.
fn trimmed_extent(mut values: Vec<f64>) -> Option<Range> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let initial = trim_slice(&values, INITIAL_TRIM);
    let chosen = if *initial.last()? < 1.0 {
        let secondary = trim_slice(&values, SECONDARY_TRIM);
        if *secondary.last()? < 1.0 {
            &values[..]
        } else {
            secondary
        }
    } else {
        initial
    };

    Some(Range { min: chosen[0], max: *chosen.last()? })
}

/// Computes each menu item's display range across dissemination areas.
///
/// Raw counts are collected keyed by geography and characteristic; items
/// with a divisor are then expressed as one-decimal percentages of the
/// divisor's count in the same geography before the extremes are taken.
pub fn compute_ranges(census_dir: &Path, menu: &Menu) -> Result<BTreeMap<u32, Range>> {
    let divisors: HashMap<u32, Option<u32>> = menu
        .values()
        .flatten()
        .map(|item| (item.id, item.divisor))
        .collect();

    // First pass: raw counts per (geography, characteristic).
    let mut counts: HashMap<(String, u32), f64> = HashMap::new();
    for file in census_files(census_dir)? {
        info!(file = %file.display(), "collecting dissemination-area counts");
        let mut reader = CensusReader::open(&file)?;
        for row in reader.rows() {
            let row = row?;
            if row.geo_level != GEO_LEVEL_DISSEMINATION_AREA
                || !divisors.contains_key(&row.characteristic_id)
            {
                continue;
            }
            if let Some(count) = row.count_total() {
                counts.insert((row.dguid.clone(), row.characteristic_id), count);
            }
        }
    }

    // Second pass: apply divisors and bucket the display values per item.
    let mut values_by_id: HashMap<u32, Vec<f64>> = HashMap::new();
    for ((dguid, id), count) in &counts {
        let divisor_value = divisors
            .get(id)
            .copied()
            .flatten()
            .and_then(|divisor| counts.get(&(dguid.clone(), divisor)))
            .copied()
            // A zero divisor means the universe is empty here; keep the raw count.
            .filter(|v| *v != 0.0);

        let value = match divisor_value {
            Some(divisor) => round_one_decimal(100.0 * count / divisor),
            None => *count,
        };
        values_by_id.entry(*id).or_default().push(value);
    }

    // Ranges come out in menu order so the log reads like the menu.
    let mut ranges = BTreeMap::new();
    for item in menu.values().flatten() {
        if let Some(values) = values_by_id.remove(&item.id) {
            if let Some(range) = trimmed_extent(values) {
                debug!(name = %item.name, min = range.min, max = range.max, "range computed");
                ranges.insert(item.id, range);
            }
        }
    }

    Ok(ranges)
}

/// Reads the menu and the census exports, writes the range table.
pub fn run(census_dir: &Path, menu_path: &Path, output: &Path) -> Result<BTreeMap<u32, Range>> {
    info!(census_dir = %census_dir.display(), "computing display ranges");

    let menu = load_menu(menu_path)?;
    let ranges = compute_ranges(census_dir, &menu)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer_pretty(writer, &ranges)?;

    info!(count = ranges.len(), output = %output.display(), "range table written");
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MenuItem;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn five_percent_trim_applies_when_max_stays_above_one() {
        // 100 values 1.0..=100.0: the 5% trim drops 5 from each end
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let range = trimmed_extent(values).unwrap();
        assert_eq!(range.min, 6.0);
        assert_eq!(range.max, 95.0);
    }

    #[test]
    fn sub_one_values_fall_back_to_raw_extremes() {
        let values: Vec<f64> = (0..100).map(|v| v as f64 / 1000.0).collect();
        let range = trimmed_extent(values).unwrap();
        assert_eq!(range.min, 0.0);
        assert_eq!(range.max, 0.099);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let range = trimmed_extent(vec![f64::NAN, 2.0, f64::INFINITY, 4.0]).unwrap();
        assert_eq!(range.min, 2.0);
        assert_eq!(range.max, 4.0);
    }

    #[test]
    fn empty_input_yields_no_range() {
        assert!(trimmed_extent(vec![]).is_none());
        assert!(trimmed_extent(vec![f64::NAN]).is_none());
    }

    #[test]
    fn divisor_items_become_percentages() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("t_English_CSV_data.csv");
        let mut file = std::fs::File::create(&csv_path).unwrap();
        writeln!(file, "DGUID,GEO_LEVEL,CHARACTERISTIC_ID,CHARACTERISTIC_NAME,C1_COUNT_TOTAL").unwrap();
        writeln!(file, "A1,Dissemination area,1,Total - Age,200").unwrap();
        writeln!(file, "A1,Dissemination area,2,  0 to 14 years,50").unwrap();
        writeln!(file, "A2,Dissemination area,1,Total - Age,400").unwrap();
        writeln!(file, "A2,Dissemination area,2,  0 to 14 years,100").unwrap();
        drop(file);

        let mut menu = Menu::new();
        menu.insert(
            "Age".to_string(),
            vec![
                MenuItem { id: 1, name: "Age".to_string(), divisor: None },
                MenuItem { id: 2, name: "0 to 14 years".to_string(), divisor: Some(1) },
            ],
        );

        let ranges = compute_ranges(dir.path(), &menu).unwrap();
        // Raw counts for the total, 25% of it for the child in both areas
        assert_eq!(ranges[&1], Range { min: 200.0, max: 400.0 });
        assert_eq!(ranges[&2], Range { min: 25.0, max: 25.0 });
    }

    #[test]
    fn zero_divisor_keeps_the_raw_count() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("t_English_CSV_data.csv");
        let mut file = std::fs::File::create(&csv_path).unwrap();
        writeln!(file, "DGUID,GEO_LEVEL,CHARACTERISTIC_ID,CHARACTERISTIC_NAME,C1_COUNT_TOTAL").unwrap();
        writeln!(file, "A1,Dissemination area,1,Total - Age,0").unwrap();
        writeln!(file, "A1,Dissemination area,2,  0 to 14 years,7").unwrap();
        drop(file);

        let mut menu = Menu::new();
        menu.insert(
            "Age".to_string(),
            vec![
                MenuItem { id: 1, name: "Age".to_string(), divisor: None },
                MenuItem { id: 2, name: "0 to 14 years".to_string(), divisor: Some(1) },
            ],
        );

        let ranges = compute_ranges(dir.path(), &menu).unwrap();
        assert_eq!(ranges[&2], Range { min: 7.0, max: 7.0 });
    }

    #[test]
    fn rows_outside_dissemination_areas_are_ignored() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("t_English_CSV_data.csv");
        let mut file = std::fs::File::create(&csv_path).unwrap();
        writeln!(file, "DGUID,GEO_LEVEL,CHARACTERISTIC_ID,CHARACTERISTIC_NAME,C1_COUNT_TOTAL").unwrap();
        writeln!(file, "C1,Country,1,Total - Age,36991981").unwrap();
        writeln!(file, "A1,Dissemination area,1,Total - Age,250").unwrap();
        drop(file);

        let mut menu = Menu::new();
        menu.insert(
            "Age".to_string(),
            vec![MenuItem { id: 1, name: "Age".to_string(), divisor: None }],
        );

        let ranges = compute_ranges(dir.path(), &menu).unwrap();
        assert_eq!(ranges[&1], Range { min: 250.0, max: 250.0 });
    }

    #[test]
    fn missing_exports_directory_content_is_an_error() {
        let dir = tempdir().unwrap();
        let menu = Menu::new();
        assert!(compute_ranges(dir.path(), &menu).is_err());
    }
}
