use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;

use super::model::TimeTable;
use crate::error::{HkError, Result};

/// Name of the timestamp column in exported tables.
pub const TIME_COLUMN: &str = "TIME";

const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn export_err(e: impl std::fmt::Display) -> HkError {
    HkError::Export(e.to_string())
}

impl TimeTable {
    /// Arrow view: a `TIME` timestamp column followed by nullable Float64
    /// columns in table order.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = vec![Field::new(
            TIME_COLUMN,
            DataType::Timestamp(TimeUnit::Second, None),
            false,
        )];
        let seconds: Vec<i64> = self.index.iter().map(|t| t.and_utc().timestamp()).collect();
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(TimestampSecondArray::from(seconds))];
        for column in &self.columns {
            fields.push(Field::new(&column.name, DataType::Float64, true));
            arrays.push(Arc::new(Float64Array::from(column.values.clone())));
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(export_err)
    }
}

/// Write the table to a file. Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` / `.pq`
/// * `.csv` – `TIME` as `YYYY-MM-DD HH:MM:SS`, empty cells for nulls
pub fn write_table(table: &TimeTable, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "parquet" | "pq" => write_parquet(table, path)?,
        "csv" => write_csv(table, path)?,
        other => return Err(HkError::Export(format!("unsupported output extension: .{other}"))),
    }
    info!(
        "wrote {} rows x {} columns to {}",
        table.len(),
        table.columns.len(),
        path.display()
    );
    Ok(())
}

fn write_parquet(table: &TimeTable, path: &Path) -> Result<()> {
    let batch = table.to_record_batch()?;
    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).map_err(export_err)?;
    writer.write(&batch).map_err(export_err)?;
    writer.close().map_err(export_err)?;
    Ok(())
}

fn write_csv(table: &TimeTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(export_err)?;
    let mut header = vec![TIME_COLUMN.to_string()];
    header.extend(table.columns.iter().map(|c| c.name.clone()));
    writer.write_record(&header).map_err(export_err)?;
    for (i, t) in table.index.iter().enumerate() {
        let mut record = vec![t.format(CSV_TIME_FORMAT).to_string()];
        record.extend(
            table
                .row(i)
                .into_iter()
                .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record).map_err(export_err)?;
    }
    writer.flush()?;
    Ok(())
}
