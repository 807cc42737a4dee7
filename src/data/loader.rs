use std::path::Path;

use log::info;
use serde::Deserialize;

use super::filter::FilterConfig;
use super::model::parse_timestamp;
use crate::catalog::{Catalog, CatalogEntry};
use crate::error::{HkError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load the coverage catalog. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`  – header row with `observation_start_time`,
///   `observation_end_time` and `data_access_url`; other columns ignored
/// * `.json` – `[{ "observation_start_time": ..., ... }, ...]`
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let records = match extension(path).as_str() {
        "csv" => catalog_csv(path)?,
        "json" => catalog_json(path)?,
        other => {
            return Err(HkError::Config(format!(
                "unsupported catalog extension: .{other}"
            )))
        }
    };
    let entries = records
        .into_iter()
        .map(CatalogRecord::into_entry)
        .collect::<Result<Vec<_>>>()?;
    info!("loaded {} catalog entries from {}", entries.len(), path.display());
    Catalog::new(entries)
}

/// Load filter criteria from `.yaml`/`.yml` or `.json`.
///
/// ```yaml
/// exclude_unit_filter: [COUNT]
/// data_name_filter:            # empty or null disables the criterion
/// calibration_filter: true
/// ```
pub fn load_filter_config(path: &Path) -> Result<FilterConfig> {
    let text = std::fs::read_to_string(path)?;
    match extension(path).as_str() {
        "yaml" | "yml" => serde_yaml_ng::from_str(&text)
            .map_err(|e| HkError::Config(format!("{}: {e}", path.display()))),
        "json" => serde_json::from_str(&text)
            .map_err(|e| HkError::Config(format!("{}: {e}", path.display()))),
        other => Err(HkError::Config(format!(
            "unsupported filter extension: .{other}"
        ))),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CatalogRecord {
    observation_start_time: String,
    observation_end_time: String,
    data_access_url: String,
}

impl CatalogRecord {
    fn into_entry(self) -> Result<CatalogEntry> {
        Ok(CatalogEntry {
            start: parse_timestamp(&self.observation_start_time)?,
            end: parse_timestamp(&self.observation_end_time)?,
            id: self.data_access_url,
        })
    }
}

fn catalog_csv(path: &Path) -> Result<Vec<CatalogRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| HkError::Config(format!("opening {}: {e}", path.display())))?;
    reader
        .deserialize::<CatalogRecord>()
        .enumerate()
        .map(|(row, record)| {
            record.map_err(|e| HkError::Config(format!("{} row {row}: {e}", path.display())))
        })
        .collect()
}

fn catalog_json(path: &Path) -> Result<Vec<CatalogRecord>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| HkError::Config(format!("{}: {e}", path.display())))
}
