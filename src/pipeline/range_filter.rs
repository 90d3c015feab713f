use crate::error::Result;
use crate::pipeline::menu::{load_menu, retain_menu_ids, save_menu};
use crate::types::{Menu, Range};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

pub struct RangeFilterSummary {
    pub menu: Menu,
    pub removed_ids: std::collections::BTreeSet<u32>,
}

pub fn load_ranges(path: &Path) -> Result<BTreeMap<u32, Range>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Drops menu entries that never produced a display range, i.e. had no
/// usable value in any dissemination area.
pub fn run(menu_path: &Path, ranges_path: &Path, output_path: &Path) -> Result<RangeFilterSummary> {
    info!(menu = %menu_path.display(), ranges = %ranges_path.display(), "filtering menu against range table");

    let menu = load_menu(menu_path)?;
    let ranges = load_ranges(ranges_path)?;
    let (filtered, removed_ids) = retain_menu_ids(menu, |id| ranges.contains_key(&id));

    save_menu(&filtered, output_path)?;

    info!(
        removed = removed_ids.len(),
        sections = filtered.len(),
        output = %output_path.display(),
        "range-filtered menu written"
    );
    Ok(RangeFilterSummary { menu: filtered, removed_ids })
}
