use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{debug, info};
use rayon::prelude::*;

use super::filter::SelectionTable;
use super::model::{TimeTable, Timestamp};
use crate::error::{HkError, Result};
use crate::fits::{ColumnData, RecordGroup, TableReader};

/// Field holding the calendar date as an 8-digit `YYYYMMDD` integer.
pub const DATE_FIELD: &str = "YYYYMMDD";
/// Field holding the time of day as an `HHMMSS` integer (leading zeros dropped).
pub const TIME_FIELD: &str = "HHMMSS";

type Row = (Timestamp, Vec<Option<f64>>);

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag checked before every file read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Timestamp parsing
// ---------------------------------------------------------------------------

/// Combine a `YYYYMMDD` date token and an `HHMMSS` time token.
/// The time token is zero-padded to six digits first.
pub fn parse_hk_time(date: &str, time: &str) -> Option<Timestamp> {
    if date.len() != 8 || time.len() > 6 {
        return None;
    }
    let text = format!("{date}{time:0>6}");
    NaiveDateTime::parse_from_str(&text, "%Y%m%d%H%M%S").ok()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Reads the selected columns of every record group out of a list of files.
///
/// `files` must be in catalog order: rows sharing a timestamp keep the one
/// read from the earliest file.
pub struct Extractor<'a> {
    reader: &'a dyn TableReader,
    jobs: usize,
    cancel: CancelToken,
}

impl<'a> Extractor<'a> {
    pub fn new(reader: &'a dyn TableReader, jobs: usize, cancel: CancelToken) -> Self {
        Self {
            reader,
            jobs: jobs.max(1),
            cancel,
        }
    }

    /// One deduplicated, time-sorted series per selected record group.
    pub fn extract(
        &self,
        files: &[PathBuf],
        selection: &SelectionTable,
    ) -> Result<BTreeMap<usize, TimeTable>> {
        let groups = selection.groups();
        let total = groups.len();
        let started = AtomicUsize::new(0);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| HkError::Config(format!("cannot start worker pool: {e}")))?;

        let series = pool.install(|| {
            groups
                .par_iter()
                .map(|&group| {
                    let n = started.fetch_add(1, Ordering::Relaxed) + 1;
                    info!("processing record group {group} ({n}/{total})");
                    let names = selection.names_for(group);
                    self.extract_group(files, group, &names)
                        .map(|table| (group, table))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(series.into_iter().collect())
    }

    fn extract_group(&self, files: &[PathBuf], group: usize, names: &[String]) -> Result<TimeTable> {
        // Collected in file order regardless of which worker finishes first.
        let per_file = files
            .par_iter()
            .map(|path| self.read_rows(path, group, names))
            .collect::<Result<Vec<_>>>()?;

        let mut rows: Vec<Row> = per_file.into_iter().flatten().collect();
        let read = rows.len();
        rows.sort_by_key(|(t, _)| *t);
        rows.dedup_by_key(|(t, _)| *t);
        debug!(
            "record group {group}: {read} rows read, {} after removing duplicate timestamps",
            rows.len()
        );
        Ok(TimeTable::from_rows(names, rows))
    }

    fn read_rows(&self, path: &Path, group: usize, names: &[String]) -> Result<Vec<Row>> {
        if self.cancel.is_cancelled() {
            return Err(HkError::Cancelled);
        }
        let record = self.reader.read_group(path, group)?;
        let date = field(&record, path, group, DATE_FIELD)?;
        let time = field(&record, path, group, TIME_FIELD)?;
        let columns = names
            .iter()
            .map(|name| {
                field(&record, path, group, name)?.to_f64().ok_or_else(|| {
                    HkError::data_access(
                        path,
                        format!("column {name} in record group {group} is not numeric"),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        (0..record.rows)
            .map(|r| -> Result<Row> {
                let t = date
                    .token(r)
                    .zip(time.token(r))
                    .and_then(|(d, t)| parse_hk_time(&d, &t))
                    .ok_or_else(|| {
                        HkError::data_access(
                            path,
                            format!("malformed timestamp in record group {group}, row {r}"),
                        )
                    })?;
                let cells: Vec<Option<f64>> = columns
                    .iter()
                    .map(|c| c.get(r).copied().flatten())
                    .collect();
                Ok((t, cells))
            })
            .collect()
    }
}

fn field<'r>(record: &'r RecordGroup, path: &Path, group: usize, name: &str) -> Result<&'r ColumnData> {
    record.field(name).ok_or_else(|| {
        HkError::data_access(path, format!("record group {group} has no column {name}"))
    })
}
