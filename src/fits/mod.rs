/// Binary-table access: the reading capability the pipeline depends on, and a
/// native FITS implementation of it.
///
/// ```text
///   ae<id>.hk  (FITS: primary HDU + BINTABLE extensions)
///        │
///        ▼
///   ┌────────────┐
///   │ FitsReader  │  headers of every HDU, or one HDU's columns
///   └────────────┘
///        │   TableReader
///        ▼
///   Header / RecordGroup  →  filter compiler, column extractor
/// ```
pub mod header;
pub mod reader;
pub mod writer;

use std::path::Path;

use crate::error::Result;

pub use header::Header;
pub use reader::FitsReader;
pub use writer::{BinTable, FitsWriter, TableColumn};

// ---------------------------------------------------------------------------
// ColumnData – one decoded field of a record group
// ---------------------------------------------------------------------------

/// Column values decoded from a binary table.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Integer cells; `None` where the cell equals the declared TNULL value.
    Int(Vec<Option<i64>>),
    Float(Vec<f64>),
    Bool(Vec<Option<bool>>),
    Text(Vec<String>),
    /// A field whose layout is not decoded (vector, bit or complex columns).
    Unsupported { tform: String, rows: usize },
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Unsupported { rows, .. } => *rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view of the column. NaN cells become `None`.
    /// Returns `None` for text and undecoded columns.
    pub fn to_f64(&self) -> Option<Vec<Option<f64>>> {
        match self {
            ColumnData::Int(v) => Some(v.iter().map(|c| c.map(|i| i as f64)).collect()),
            ColumnData::Float(v) => Some(
                v.iter()
                    .map(|f| if f.is_nan() { None } else { Some(*f) })
                    .collect(),
            ),
            ColumnData::Bool(v) => Some(
                v.iter()
                    .map(|c| c.map(|b| if b { 1.0 } else { 0.0 }))
                    .collect(),
            ),
            ColumnData::Text(_) | ColumnData::Unsupported { .. } => None,
        }
    }

    /// Cell rendered as an integer-like token, used for date/time fields.
    pub fn token(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Int(v) => v.get(row).copied().flatten().map(|i| i.to_string()),
            ColumnData::Float(v) => v
                .get(row)
                .filter(|f| f.is_finite())
                .map(|f| (f.trunc() as i64).to_string()),
            ColumnData::Text(v) => v.get(row).map(|s| s.trim().to_string()),
            ColumnData::Bool(_) | ColumnData::Unsupported { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordGroup – one HDU with its header and decoded fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RecordGroup {
    pub header: Header,
    pub rows: usize,
    pub fields: Vec<(String, ColumnData)>,
}

impl RecordGroup {
    pub fn field(&self, name: &str) -> Option<&ColumnData> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data)
    }
}

/// Capability to read multi-table binary files.
///
/// Implementations must release any file handle before returning, on success
/// and on error alike.
pub trait TableReader: Send + Sync {
    /// Headers of every record group in file order.
    fn read_headers(&self, path: &Path) -> Result<Vec<Header>>;

    /// Header and fields of the record group at `index`.
    fn read_group(&self, path: &Path, index: usize) -> Result<RecordGroup>;
}
