use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use super::header::{parse_card, Card, Header, BLOCK_LEN, CARD_LEN};
use super::{ColumnData, RecordGroup, TableReader};
use crate::error::{HkError, Result};

// ---------------------------------------------------------------------------
// FitsReader
// ---------------------------------------------------------------------------

/// Reads FITS files: the primary HDU plus any BINTABLE extensions.
///
/// Only the headers are walked to reach an HDU; data blocks of other HDUs are
/// skipped with a seek. The file handle lives for the duration of one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitsReader;

impl TableReader for FitsReader {
    fn read_headers(&self, path: &Path) -> Result<Vec<Header>> {
        let mut file = open(path)?;
        let mut headers = Vec::new();
        while let Some(header) = read_header(&mut file, path)? {
            skip_data(&mut file, &header, path)?;
            headers.push(header);
        }
        debug!("{}: {} HDUs", path.display(), headers.len());
        Ok(headers)
    }

    fn read_group(&self, path: &Path, index: usize) -> Result<RecordGroup> {
        let mut file = open(path)?;
        for _ in 0..index {
            let header = read_header(&mut file, path)?.ok_or_else(|| missing_hdu(path, index))?;
            skip_data(&mut file, &header, path)?;
        }
        let header = read_header(&mut file, path)?.ok_or_else(|| missing_hdu(path, index))?;
        if header.get("XTENSION") != Some("BINTABLE") {
            skip_data(&mut file, &header, path)?;
            return Ok(RecordGroup {
                header,
                rows: 0,
                fields: Vec::new(),
            });
        }
        decode_bintable(&mut file, header, path)
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| HkError::data_access(path, format!("open failed: {e}")))
}

fn missing_hdu(path: &Path, index: usize) -> HkError {
    HkError::data_access(path, format!("record group {index} does not exist"))
}

fn io_err(path: &Path, e: std::io::Error) -> HkError {
    HkError::data_access(path, e.to_string())
}

// ---------------------------------------------------------------------------
// Header blocks
// ---------------------------------------------------------------------------

/// Read one header. `Ok(None)` on a clean end of file.
fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<Option<Header>> {
    let mut header = Header::new();
    let mut block = [0u8; BLOCK_LEN];
    let mut first = true;
    loop {
        if let Err(e) = reader.read_exact(&mut block) {
            if first && e.kind() == ErrorKind::UnexpectedEof {
                return Ok(None);
            }
            return Err(io_err(path, e));
        }
        first = false;
        for raw in block.chunks(CARD_LEN) {
            match parse_card(raw) {
                Some(Card::End) => return Ok(Some(header)),
                Some(Card::Commentary) => {}
                Some(Card::Value(k, v)) => header.push(k, v),
                None => return Err(HkError::data_access(path, "truncated header card")),
            }
        }
    }
}

fn required(header: &Header, keyword: &str, path: &Path) -> Result<i64> {
    header
        .get_int(keyword)
        .ok_or_else(|| HkError::data_access(path, format!("header lacks {keyword}")))
}

fn overflow(path: &Path, what: &str) -> HkError {
    HkError::data_access(path, format!("{what} overflows"))
}

/// Size in bytes of the data unit, including heap, before block padding.
fn data_len(header: &Header, path: &Path) -> Result<u64> {
    let bitpix = required(header, "BITPIX", path)?;
    if !matches!(bitpix, 8 | 16 | 32 | 64 | -32 | -64) {
        return Err(HkError::data_access(path, format!("invalid BITPIX {bitpix}")));
    }
    let naxis = required(header, "NAXIS", path)?;
    if naxis == 0 {
        return Ok(0);
    }
    let mut elements: u64 = 1;
    for axis in 1..=naxis {
        let len = required(header, &format!("NAXIS{axis}"), path)?.max(0) as u64;
        elements = elements
            .checked_mul(len)
            .ok_or_else(|| overflow(path, "data size"))?;
    }
    let pcount = header.get_int("PCOUNT").unwrap_or(0).max(0) as u64;
    let gcount = header.get_int("GCOUNT").unwrap_or(1).max(0) as u64;
    pcount
        .checked_add(elements)
        .and_then(|n| n.checked_mul(gcount))
        .and_then(|n| n.checked_mul(bitpix.unsigned_abs() / 8))
        .ok_or_else(|| overflow(path, "data size"))
}

/// `len` rounded up to whole blocks.
fn padded(len: u64, path: &Path) -> Result<u64> {
    len.div_ceil(BLOCK_LEN as u64)
        .checked_mul(BLOCK_LEN as u64)
        .ok_or_else(|| overflow(path, "data size"))
}

fn seek_forward<R: Seek>(reader: &mut R, len: u64, path: &Path) -> Result<()> {
    let len = i64::try_from(len).map_err(|_| overflow(path, "seek offset"))?;
    reader
        .seek(SeekFrom::Current(len))
        .map_err(|e| io_err(path, e))?;
    Ok(())
}

fn skip_data<R: Seek>(reader: &mut R, header: &Header, path: &Path) -> Result<()> {
    let len = padded(data_len(header, path)?, path)?;
    seek_forward(reader, len, path)
}

// ---------------------------------------------------------------------------
// BINTABLE decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tform {
    repeat: usize,
    code: char,
}

impl Tform {
    fn parse(raw: &str) -> Option<Tform> {
        let raw = raw.trim();
        let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
        let code = raw[digits.len()..].chars().next()?;
        let repeat = if digits.is_empty() { 1 } else { digits.parse().ok()? };
        Some(Tform { repeat, code })
    }

    /// Width in bytes of this field within a row.
    fn width(&self) -> Option<usize> {
        let unit: usize = match self.code {
            'L' | 'B' | 'A' => 1,
            'I' => 2,
            'J' | 'E' => 4,
            'K' | 'D' | 'C' | 'P' => 8,
            'M' | 'Q' => 16,
            'X' => return Some(self.repeat.div_ceil(8)),
            _ => return None,
        };
        unit.checked_mul(self.repeat)
    }
}

fn decode_bintable<R: Read + Seek>(
    reader: &mut R,
    header: Header,
    path: &Path,
) -> Result<RecordGroup> {
    let row_len = required(&header, "NAXIS1", path)?.max(0) as usize;
    let rows = required(&header, "NAXIS2", path)?.max(0) as usize;
    let tfields = header.get_int("TFIELDS").unwrap_or(0).max(0) as usize;

    let table_len = row_len
        .checked_mul(rows)
        .ok_or_else(|| overflow(path, "table size"))?;
    let unit_len = padded(data_len(&header, path)?, path)?;
    if table_len as u64 > unit_len {
        return Err(HkError::data_access(path, "table larger than its data unit"));
    }
    // Read through `take` so a lying header cannot force a huge allocation.
    let mut table = Vec::new();
    reader
        .by_ref()
        .take(table_len as u64)
        .read_to_end(&mut table)
        .map_err(|e| io_err(path, e))?;
    if table.len() != table_len {
        return Err(HkError::data_access(
            path,
            format!("table truncated: {} of {table_len} bytes", table.len()),
        ));
    }

    let mut fields = Vec::new();
    let mut offset = 0usize;
    for n in 1..=tfields {
        let raw_form = header
            .get(&format!("TFORM{n}"))
            .ok_or_else(|| HkError::data_access(path, format!("header lacks TFORM{n}")))?
            .to_string();
        let form = Tform::parse(&raw_form).ok_or_else(|| {
            HkError::data_access(path, format!("unparseable TFORM{n} '{raw_form}'"))
        })?;
        let width = form.width().ok_or_else(|| {
            HkError::data_access(path, format!("unsupported TFORM{n} '{raw_form}'"))
        })?;
        if width > row_len - offset {
            return Err(HkError::data_access(
                path,
                format!("field {n} overruns the {row_len}-byte row"),
            ));
        }
        let name = header
            .get(&format!("TTYPE{n}"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("COL{n}"));
        let scaling = Scaling {
            scale: header.get_float(&format!("TSCAL{n}")).unwrap_or(1.0),
            zero: header.get_float(&format!("TZERO{n}")).unwrap_or(0.0),
            null: header.get_int(&format!("TNULL{n}")),
        };
        let cells = (0..rows).map(|r| &table[r * row_len + offset..r * row_len + offset + width]);
        let data = decode_field(form, &raw_form, cells, rows, &scaling);
        fields.push((name, data));
        offset += width;
    }

    // Heap and padding follow the table.
    seek_forward(reader, unit_len - table_len as u64, path)?;

    Ok(RecordGroup {
        header,
        rows,
        fields,
    })
}

struct Scaling {
    scale: f64,
    zero: f64,
    null: Option<i64>,
}

impl Scaling {
    fn keeps_integers(&self) -> bool {
        self.scale == 1.0 && self.zero.fract() == 0.0
    }

    fn int_column(&self, raw: impl Iterator<Item = i64>) -> ColumnData {
        let masked = raw.map(|v| if Some(v) == self.null { None } else { Some(v) });
        if self.keeps_integers() {
            let zero = self.zero as i64;
            ColumnData::Int(masked.map(|c| c.and_then(|v| v.checked_add(zero))).collect())
        } else {
            ColumnData::Float(
                masked
                    .map(|c| c.map_or(f64::NAN, |v| v as f64 * self.scale + self.zero))
                    .collect(),
            )
        }
    }

    fn float_column(&self, raw: impl Iterator<Item = f64>) -> ColumnData {
        ColumnData::Float(raw.map(|v| v * self.scale + self.zero).collect())
    }
}

fn decode_field<'a>(
    form: Tform,
    raw_form: &str,
    cells: impl Iterator<Item = &'a [u8]>,
    rows: usize,
    scaling: &Scaling,
) -> ColumnData {
    if form.code == 'A' {
        return ColumnData::Text(
            cells
                .map(|c| {
                    String::from_utf8_lossy(c)
                        .trim_end_matches(['\0', ' '])
                        .to_string()
                })
                .collect(),
        );
    }
    if form.repeat != 1 {
        return ColumnData::Unsupported {
            tform: raw_form.to_string(),
            rows,
        };
    }
    match form.code {
        'L' => ColumnData::Bool(
            cells
                .map(|c| match c[0] {
                    b'T' => Some(true),
                    b'F' => Some(false),
                    _ => None,
                })
                .collect(),
        ),
        'B' => scaling.int_column(cells.map(|c| c[0] as i64)),
        'I' => scaling.int_column(cells.map(|c| i16::from_be_bytes([c[0], c[1]]) as i64)),
        'J' => scaling.int_column(
            cells.map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as i64),
        ),
        'K' => scaling.int_column(cells.map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            i64::from_be_bytes(b)
        })),
        'E' => scaling.float_column(
            cells.map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64),
        ),
        'D' => scaling.float_column(cells.map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            f64::from_be_bytes(b)
        })),
        _ => ColumnData::Unsupported {
            tform: raw_form.to_string(),
            rows,
        },
    }
}
