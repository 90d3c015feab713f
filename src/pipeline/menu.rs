use crate::csv_source::{CensusReader, CensusRow};
use crate::error::Result;
use crate::types::{ComputedValues, Menu, MenuItem, AGGREGATE_SECTION};
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{info, warn};

/// Section headers are labeled without the "Total - " prefix the exports use.
const TOTAL_PREFIX: &str = "Total - ";

fn section_label(trimmed_name: &str) -> &str {
    trimmed_name.strip_prefix(TOTAL_PREFIX).unwrap_or(trimmed_name)
}

/// Groups the deduplicated characteristic sequence into menu sections.
///
/// An unindented row followed by indented rows heads its own section and
/// becomes that section's divisor; one without children is filed under the
/// "Aggregate" catch-all. Computed characteristics never carry a divisor,
/// their values are already rates.
pub fn build_menu<I>(rows: I, computed_ids: &BTreeSet<u32>) -> Result<Menu>
where
    I: IntoIterator<Item = Result<CensusRow>>,
{
    // Dedup first: the exports repeat every characteristic once per
    // geography, and the lookahead below must see the unique sequence.
    let mut unique: Vec<(u32, String, usize)> = Vec::new();
    let mut seen = HashSet::new();
    for row in rows {
        let row = row?;
        if seen.insert(row.characteristic_id) {
            let indentation = row.indentation();
            unique.push((row.characteristic_id, row.trimmed_name().to_string(), indentation));
        }
    }

    let mut menu = Menu::new();
    let mut current_section: Option<(String, u32)> = None;

    for (index, (id, name, indentation)) in unique.iter().enumerate() {
        if *indentation == 0 {
            let heads_section = unique
                .get(index + 1)
                .map(|(_, _, next_indentation)| *next_indentation > 0)
                .unwrap_or(false);

            let label = section_label(name).to_string();
            if heads_section {
                menu.entry(label.clone()).or_default().push(MenuItem {
                    id: *id,
                    name: label.clone(),
                    divisor: None,
                });
                current_section = Some((label, *id));
            } else {
                menu.entry(AGGREGATE_SECTION.to_string())
                    .or_default()
                    .push(MenuItem {
                        id: *id,
                        name: label,
                        divisor: None,
                    });
                current_section = None;
            }
            continue;
        }

        match &current_section {
            Some((label, divisor_id)) => {
                let divisor = if computed_ids.contains(id) {
                    None
                } else {
                    Some(*divisor_id)
                };
                menu.entry(label.clone()).or_default().push(MenuItem {
                    id: *id,
                    name: name.clone(),
                    divisor,
                });
            }
            None => {
                // Indented row with no header above it; the exports should
                // not produce this, but a truncated extract can.
                warn!(id = *id, name = %name, "indented characteristic without a section header");
                menu.entry(AGGREGATE_SECTION.to_string())
                    .or_default()
                    .push(MenuItem {
                        id: *id,
                        name: name.clone(),
                        divisor: None,
                    });
            }
        }
    }

    Ok(menu)
}

/// Keeps only the menu items `keep` accepts, dropping sections that empty
/// out. Returns the filtered menu and the removed ids.
pub fn retain_menu_ids<F>(menu: Menu, keep: F) -> (Menu, BTreeSet<u32>)
where
    F: Fn(u32) -> bool,
{
    let mut filtered = Menu::new();
    let mut removed_ids = BTreeSet::new();

    for (heading, items) in menu {
        let (kept, dropped): (Vec<MenuItem>, Vec<MenuItem>) =
            items.into_iter().partition(|item| keep(item.id));
        removed_ids.extend(dropped.into_iter().map(|item| item.id));
        if !kept.is_empty() {
            filtered.insert(heading, kept);
        }
    }

    (filtered, removed_ids)
}

pub fn load_menu(path: &Path) -> Result<Menu> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn save_menu(menu: &Menu, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, menu)?;
    Ok(())
}

/// Reads a census export plus the classifier output and writes the menu.
pub fn run(input: &Path, computed: Option<&Path>, output: &Path) -> Result<Menu> {
    info!(input = %input.display(), "building menu sections");

    let computed_ids = match computed {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            let values: ComputedValues = serde_json::from_reader(reader)?;
            values.computed_ids
        }
        None => {
            warn!("no computed-values file given; all items will carry divisors");
            BTreeSet::new()
        }
    };

    let mut reader = CensusReader::open(input)?;
    let menu = build_menu(reader.rows(), &computed_ids)?;
    save_menu(&menu, output)?;

    let item_count: usize = menu.values().map(Vec::len).sum();
    info!(
        sections = menu.len(),
        items = item_count,
        output = %output.display(),
        "menu written"
    );
    Ok(menu)
}
