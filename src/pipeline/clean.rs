use crate::error::Result;
use crate::pipeline::menu::{load_menu, retain_menu_ids, save_menu};
use crate::types::Menu;
use rusqlite::Connection;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::info;

/// Aggregate over the SQLite mirror: a characteristic is worth keeping only
/// if it has a nonzero count somewhere.
const VALID_IDS_SQL: &str = "\
    SELECT CHARACTERISTIC_ID, SUM(C1_COUNT_TOTAL)
    FROM census_data
    GROUP BY CHARACTERISTIC_ID
    HAVING SUM(C1_COUNT_TOTAL) > 0";

pub struct CleanSummary {
    pub menu: Menu,
    pub removed_ids: BTreeSet<u32>,
}

/// Ids with a nonzero aggregate count in the census mirror.
pub fn valid_ids(db_path: &Path) -> Result<HashSet<u32>> {
    info!(db = %db_path.display(), "querying valid characteristic ids");

    let conn = Connection::open(db_path)?;
    let mut stmt = conn.prepare(VALID_IDS_SQL)?;
    let mut rows = stmt.query([])?;

    let mut ids = HashSet::new();
    while let Some(row) = rows.next()? {
        let id: u32 = row.get(0)?;
        ids.insert(id);
    }

    info!(count = ids.len(), "valid ids fetched");
    Ok(ids)
}

/// Drops menu entries whose id never aggregates to a nonzero count.
pub fn run(menu_path: &Path, db_path: &Path, output_path: &Path) -> Result<CleanSummary> {
    info!(menu = %menu_path.display(), "filtering menu against database");

    let menu = load_menu(menu_path)?;
    let valid = valid_ids(db_path)?;
    let (filtered, removed_ids) = retain_menu_ids(menu, |id| valid.contains(&id));

    save_menu(&filtered, output_path)?;

    info!(
        removed = removed_ids.len(),
        sections = filtered.len(),
        output = %output_path.display(),
        "filtered menu written"
    );
    Ok(CleanSummary { menu: filtered, removed_ids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MenuItem;
    use tempfile::tempdir;

    fn seed_db(path: &Path, rows: &[(u32, f64)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE census_data (
                CHARACTERISTIC_ID INTEGER NOT NULL,
                C1_COUNT_TOTAL REAL
            )",
        )
        .unwrap();
        for (id, count) in rows {
            conn.execute(
                "INSERT INTO census_data (CHARACTERISTIC_ID, C1_COUNT_TOTAL) VALUES (?1, ?2)",
                rusqlite::params![id, count],
            )
            .unwrap();
        }
    }

    #[test]
    fn zero_sum_ids_are_invalid() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("census.db");
        seed_db(&db_path, &[(1, 10.0), (1, 5.0), (2, 0.0), (2, 0.0), (3, 0.5)]);

        let ids = valid_ids(&db_path).unwrap();
        assert!(ids.contains(&1));
        assert!(!ids.contains(&2));
        assert!(ids.contains(&3));
    }

    #[test]
    fn run_filters_menu_and_reports_removed_ids() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("census.db");
        seed_db(&db_path, &[(1, 10.0)]);

        let mut menu = Menu::new();
        menu.insert(
            "Aggregate".to_string(),
            vec![
                MenuItem { id: 1, name: "A".to_string(), divisor: None },
                MenuItem { id: 3, name: "C".to_string(), divisor: None },
            ],
        );
        let menu_path = dir.path().join("menu_list.json");
        save_menu(&menu, &menu_path).unwrap();

        let summary = run(&menu_path, &db_path, &menu_path).unwrap();
        assert_eq!(summary.menu["Aggregate"].len(), 1);
        assert_eq!(summary.menu["Aggregate"][0].id, 1);
        assert_eq!(summary.removed_ids, [3].into_iter().collect());

        // Filtering the already-filtered file again removes nothing
        let again = run(&menu_path, &db_path, &menu_path).unwrap();
        assert_eq!(again.menu, summary.menu);
        assert!(again.removed_ids.is_empty());
    }
}
