use serde::{Deserialize, Serialize};

use crate::data::model::{Timestamp, Window};
use crate::error::{HkError, Result};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One archival file and the observation interval it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Access locator, e.g. the archive URL of the observation directory.
    pub id: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Coverage catalog sorted ascending by start (and end) time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Validate ordering and per-entry bounds.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.start > e.end) {
            return Err(HkError::Config(format!(
                "catalog entry {} starts after it ends",
                bad.id
            )));
        }
        if let Some(pair) = entries
            .windows(2)
            .find(|w| w[0].start > w[1].start || w[0].end > w[1].end)
        {
            return Err(HkError::Config(format!(
                "catalog not sorted by time at entry {}",
                pair[1].id
            )));
        }
        Ok(Catalog { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries bracketing `window`, in catalog order.
    ///
    /// The slice runs from the last entry starting at or before the window
    /// start to the first entry ending at or after the window end.
    pub fn resolve(&self, window: &Window) -> Result<&[CatalogEntry]> {
        let first = self
            .entries
            .partition_point(|e| e.start <= window.start)
            .checked_sub(1)
            .ok_or_else(|| {
                HkError::Range(format!(
                    "window starts at {} before catalog coverage",
                    window.start
                ))
            })?;
        let last = self.entries.partition_point(|e| e.end < window.end);
        if last == self.entries.len() {
            return Err(HkError::Range(format!(
                "window ends at {} after catalog coverage",
                window.end
            )));
        }
        if first > last {
            return Err(HkError::Range(format!(
                "catalog entries bracketing {window} are out of order"
            )));
        }
        Ok(&self.entries[first..=last])
    }
}

/// Map an archive locator to the housekeeping file name:
/// `…/100018010/` → `ae100018010.hk`.
pub fn url2filename(url: &str) -> String {
    let segment = url.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    format!("ae{segment}.hk")
}
