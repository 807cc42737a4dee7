use std::fmt;

use chrono::NaiveDateTime;

use crate::error::{HkError, Result};

pub type Timestamp = NaiveDateTime;

// ---------------------------------------------------------------------------
// Window – the requested observation range
// ---------------------------------------------------------------------------

/// Observation window; both bounds are inclusive when clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if start >= end {
            return Err(HkError::Config(format!(
                "window start {start} is not before end {end}"
            )));
        }
        Ok(Window { start, end })
    }

    pub fn contains(&self, t: &Timestamp) -> bool {
        self.start <= *t && *t <= self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Parse the timestamp forms accepted in catalogs and on the command line.
pub fn parse_timestamp(s: &str) -> Result<Timestamp> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| HkError::Config(format!("unrecognised timestamp '{s}'")))
}

// ---------------------------------------------------------------------------
// Column / TimeTable – timestamp-indexed table with nullable cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// One cell per index entry; `None` is a null cell.
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Sample variance (n - 1) over the non-null cells.
    /// `None` when fewer than two cells are present.
    pub fn variance(&self) -> Option<f64> {
        let present: Vec<f64> = self.values.iter().flatten().copied().collect();
        if present.len() < 2 {
            return None;
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
        Some(ss / (n - 1.0))
    }
}

/// A timestamp-indexed table. Used both for one record group's series and for
/// the merged result.
///
/// Invariant: every column holds exactly `index.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeTable {
    pub index: Vec<Timestamp>,
    pub columns: Vec<Column>,
}

impl TimeTable {
    pub fn new(index: Vec<Timestamp>, columns: Vec<Column>) -> Self {
        debug_assert!(columns.iter().all(|c| c.values.len() == index.len()));
        TimeTable { index, columns }
    }

    /// Build a table from rows: each row is a timestamp and one cell per name.
    pub fn from_rows(names: &[String], rows: Vec<(Timestamp, Vec<Option<f64>>)>) -> Self {
        let mut index = Vec::with_capacity(rows.len());
        let mut columns: Vec<Column> = names
            .iter()
            .map(|n| Column::new(n.clone(), Vec::with_capacity(rows.len())))
            .collect();
        for (t, cells) in rows {
            index.push(t);
            for (column, cell) in columns.iter_mut().zip(cells) {
                column.values.push(cell);
            }
        }
        TimeTable { index, columns }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Cells of row `i`, in column order.
    pub fn row(&self, i: usize) -> Vec<Option<f64>> {
        self.columns.iter().map(|c| c.values[i]).collect()
    }

    /// Keep only the rows whose position satisfies `keep`.
    pub fn retain_rows(&self, keep: impl Fn(usize, &Timestamp) -> bool) -> TimeTable {
        let positions: Vec<usize> = self
            .index
            .iter()
            .enumerate()
            .filter(|(i, t)| keep(*i, t))
            .map(|(i, _)| i)
            .collect();
        self.take(&positions)
    }

    /// Rows at `positions`, in that order.
    pub fn take(&self, positions: &[usize]) -> TimeTable {
        TimeTable {
            index: positions.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), positions.iter().map(|&i| c.values[i]).collect()))
                .collect(),
        }
    }

    /// Stable sort of rows by timestamp.
    pub fn sorted(&self) -> TimeTable {
        let mut positions: Vec<usize> = (0..self.len()).collect();
        positions.sort_by_key(|&i| self.index[i]);
        self.take(&positions)
    }

    pub fn is_sorted_unique(&self) -> bool {
        self.index.windows(2).all(|w| w[0] < w[1])
    }
}
