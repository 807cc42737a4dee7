use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fits::header::{name_keyword_for, Header};

// ---------------------------------------------------------------------------
// Filter configuration
// ---------------------------------------------------------------------------

/// Column filter criteria. An empty set or a `false` flag disables that
/// criterion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Units whose columns are dropped.
    #[serde(rename = "exclude_unit_filter", default, deserialize_with = "nullable_set")]
    pub excluded_units: BTreeSet<String>,
    /// A column is kept only if its name contains one of these.
    #[serde(rename = "data_name_filter", default, deserialize_with = "nullable_set")]
    pub included_name_substrings: BTreeSet<String>,
    /// Keep only calibration columns (names ending in `_CAL`).
    #[serde(rename = "calibration_filter", default)]
    pub calibration_only: bool,
}

fn nullable_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}

pub const CALIBRATION_SUFFIX: &str = "_CAL";

pub fn is_calibration(name: &str) -> bool {
    name.ends_with(CALIBRATION_SUFFIX)
}

impl FilterConfig {
    /// Whether a column with `name` and `unit` survives every active criterion.
    pub fn accepts(&self, name: &str, unit: &str) -> bool {
        if !self.excluded_units.is_empty() && self.excluded_units.contains(unit) {
            return false;
        }
        if !self.included_name_substrings.is_empty()
            && !self
                .included_name_substrings
                .iter()
                .any(|label| name.contains(label.as_str()))
        {
            return false;
        }
        if self.calibration_only && !is_calibration(name) {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Column selection table
// ---------------------------------------------------------------------------

/// One selected column: which record group it lives in, its name and unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub group: usize,
    pub name: String,
    pub unit: String,
}

/// Selected columns in header-scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionTable {
    pub entries: Vec<SelectionEntry>,
}

impl SelectionTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct record-group indices, ascending.
    pub fn groups(&self) -> Vec<usize> {
        self.entries
            .iter()
            .map(|e| e.group)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Column names selected from `group`, in selection order.
    pub fn names_for(&self, group: usize) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.group == group)
            .map(|e| e.name.clone())
            .collect()
    }
}

impl fmt::Display for SelectionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>5}  {:<24} unit", "index", "data_name")?;
        for e in &self.entries {
            writeln!(f, "{:>5}  {:<24} {}", e.group, e.name, e.unit)?;
        }
        Ok(())
    }
}

/// Build the selection table from the headers of one reference file.
///
/// Every keyword containing `UNIT` is a candidate; its column name is read
/// from the matching `TTYPE` keyword. A unit keyword without a name keyword
/// yields an empty name.
pub fn compile(headers: &[Header], config: &FilterConfig) -> SelectionTable {
    let mut entries = Vec::new();
    for (group, header) in headers.iter().enumerate() {
        for (keyword, unit) in header.iter() {
            if !keyword.contains("UNIT") {
                continue;
            }
            let name = header.get(&name_keyword_for(keyword)).unwrap_or("");
            if config.accepts(name, unit) {
                entries.push(SelectionEntry {
                    group,
                    name: name.to_string(),
                    unit: unit.to_string(),
                });
            }
        }
    }
    SelectionTable { entries }
}
