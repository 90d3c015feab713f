use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One entry of the flat characteristic list, with its hierarchy resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub characteristic_name: String,
    pub indentation: usize,
    /// Id of the nearest preceding unindented characteristic. `None` for
    /// unindented rows, which are their own universe.
    pub total_variable: Option<u32>,
    pub characteristic_id: u32,
}

/// One selectable entry of the dropdown menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: u32,
    pub name: String,
    /// Id of the total the value is divided by for display. Absent for
    /// headers, aggregate entries, and characteristics that are already
    /// rates or averages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divisor: Option<u32>,
}

/// Section label -> ordered items. Section order must survive the JSON
/// round trip, hence the insertion-ordered map.
pub type Menu = IndexMap<String, Vec<MenuItem>>;

/// Label for unindented characteristics that head no section of their own.
pub const AGGREGATE_SECTION: &str = "Aggregate";

/// Ids flagged by the country-level classifier pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedValues {
    /// Characteristics already expressed as a rate, percentage or average.
    pub computed_ids: BTreeSet<u32>,
    /// Characteristics whose country-level count is too small to serve as a
    /// proportion denominator.
    pub small_total_ids: BTreeSet<u32>,
}

/// Display range of a characteristic across dissemination areas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}
