use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::header::{end_card, format_card, CardValue, BLOCK_LEN, CARD_LEN};
use super::ColumnData;

// ---------------------------------------------------------------------------
// Table description
// ---------------------------------------------------------------------------

/// One field of a binary table to be written.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: String,
    pub unit: Option<String>,
    pub data: ColumnData,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            unit: None,
            data,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// (TFORM, byte width) used when encoding this column.
    fn layout(&self) -> (String, usize) {
        match &self.data {
            ColumnData::Int(_) => ("1K".into(), 8),
            ColumnData::Float(_) => ("1D".into(), 8),
            ColumnData::Bool(_) => ("1L".into(), 1),
            ColumnData::Text(values) => {
                let width = values.iter().map(String::len).max().unwrap_or(0).max(1);
                (format!("{width}A"), width)
            }
            ColumnData::Unsupported { .. } => ("0A".into(), 0),
        }
    }
}

/// A BINTABLE extension: named fields plus extra header cards.
#[derive(Debug, Clone)]
pub struct BinTable {
    pub extname: String,
    pub columns: Vec<TableColumn>,
    pub cards: Vec<(String, CardValue)>,
}

impl BinTable {
    pub fn new(extname: impl Into<String>) -> Self {
        Self {
            extname: extname.into(),
            columns: Vec::new(),
            cards: Vec::new(),
        }
    }

    pub fn column(mut self, column: TableColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn card(mut self, keyword: impl Into<String>, value: CardValue) -> Self {
        self.cards.push((keyword.into(), value));
        self
    }

    fn rows(&self) -> usize {
        self.columns.iter().map(|c| c.data.len()).max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// FitsWriter
// ---------------------------------------------------------------------------

/// Writes an empty primary HDU followed by BINTABLE extensions.
pub struct FitsWriter;

impl FitsWriter {
    pub fn write(path: &Path, tables: &[BinTable]) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        write_header(
            &mut out,
            &[
                ("SIMPLE".into(), CardValue::Logical(true)),
                ("BITPIX".into(), CardValue::Int(8)),
                ("NAXIS".into(), CardValue::Int(0)),
                ("EXTEND".into(), CardValue::Logical(true)),
            ],
        )?;
        for table in tables {
            write_table(&mut out, table)?;
        }
        out.flush()
    }
}

fn write_header<W: Write>(out: &mut W, cards: &[(String, CardValue)]) -> io::Result<()> {
    for (keyword, value) in cards {
        out.write_all(&format_card(keyword, value))?;
    }
    out.write_all(&end_card())?;
    let written = (cards.len() + 1) * CARD_LEN;
    pad(out, written, b' ')
}

fn pad<W: Write>(out: &mut W, written: usize, fill: u8) -> io::Result<()> {
    let rem = written % BLOCK_LEN;
    if rem != 0 {
        out.write_all(&vec![fill; BLOCK_LEN - rem])?;
    }
    Ok(())
}

fn write_table<W: Write>(out: &mut W, table: &BinTable) -> io::Result<()> {
    let rows = table.rows();
    let layouts: Vec<(String, usize)> = table.columns.iter().map(TableColumn::layout).collect();
    let row_len: usize = layouts.iter().map(|(_, w)| w).sum();

    let mut cards: Vec<(String, CardValue)> = vec![
        ("XTENSION".into(), CardValue::Str("BINTABLE".into())),
        ("BITPIX".into(), CardValue::Int(8)),
        ("NAXIS".into(), CardValue::Int(2)),
        ("NAXIS1".into(), CardValue::Int(row_len as i64)),
        ("NAXIS2".into(), CardValue::Int(rows as i64)),
        ("PCOUNT".into(), CardValue::Int(0)),
        ("GCOUNT".into(), CardValue::Int(1)),
        ("TFIELDS".into(), CardValue::Int(table.columns.len() as i64)),
    ];
    for (n, (column, (tform, _))) in table.columns.iter().zip(&layouts).enumerate() {
        let n = n + 1;
        cards.push((format!("TTYPE{n}"), CardValue::Str(column.name.clone())));
        cards.push((format!("TFORM{n}"), CardValue::Str(tform.clone())));
        if let Some(unit) = &column.unit {
            cards.push((format!("TUNIT{n}"), CardValue::Str(unit.clone())));
        }
        if matches!(&column.data, ColumnData::Int(v) if v.iter().any(Option::is_none)) {
            cards.push((format!("TNULL{n}"), CardValue::Int(i64::MIN)));
        }
    }
    cards.push(("EXTNAME".into(), CardValue::Str(table.extname.clone())));
    cards.extend(table.cards.iter().cloned());
    write_header(out, &cards)?;

    for row in 0..rows {
        for (column, (_, width)) in table.columns.iter().zip(&layouts) {
            encode_cell(out, &column.data, row, *width)?;
        }
    }
    pad(out, row_len * rows, 0)
}

fn encode_cell<W: Write>(out: &mut W, data: &ColumnData, row: usize, width: usize) -> io::Result<()> {
    match data {
        ColumnData::Int(v) => {
            let cell = v.get(row).copied().flatten().unwrap_or(i64::MIN);
            out.write_all(&cell.to_be_bytes())
        }
        ColumnData::Float(v) => {
            let cell = v.get(row).copied().unwrap_or(f64::NAN);
            out.write_all(&cell.to_be_bytes())
        }
        ColumnData::Bool(v) => {
            let cell = match v.get(row).copied().flatten() {
                Some(true) => b'T',
                Some(false) => b'F',
                None => 0,
            };
            out.write_all(&[cell])
        }
        ColumnData::Text(v) => {
            let mut cell = vec![b' '; width];
            if let Some(s) = v.get(row) {
                for (slot, byte) in cell.iter_mut().zip(s.bytes()) {
                    *slot = byte;
                }
            }
            out.write_all(&cell)
        }
        ColumnData::Unsupported { .. } => Ok(()),
    }
}
