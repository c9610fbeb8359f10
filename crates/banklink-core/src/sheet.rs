//! Bank sheet reader
//!
//! Bank uploads arrive as xlsx workbooks (first worksheet) or CSV files with a
//! header row. Columns are looked up by name once, here, and every data row is
//! mapped onto [`InputRow`]. Downstream code never sees column names.
//!
//! Recognised headers (case-insensitive, surrounding whitespace ignored):
//!
//! | Header        | Field       | Required |
//! |---------------|-------------|----------|
//! | `EMAIL`       | `email`     | no       |
//! | `MOBILE_NO`   | `mobile_no` | no       |
//! | `NAME`        | `name`      | no       |
//! | `ADDRESS`     | `address`   | no       |
//! | `TAX_ID`      | `tax_id`    | no       |
//! | `TIN`         | `tin`       | no       |
//! | `RC`          | `rc`        | no       |
//! | `TRXN_AMOUNT` | `amount`    | yes      |
//! | `TRXN_DATE`   | `date`      | yes      |
//!
//! An optional column that is missing behaves like a column of blank cells.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use csv::ReaderBuilder;
use tracing::debug;

use crate::error::{Error, Result};

/// A single non-blank cell, normalised across xlsx and CSV sources
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Build a cell from raw text; blank text is no cell at all
    pub fn from_text(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self::Text(trimmed.to_string()))
        }
    }

    /// Text rendering used by the identifier parser
    ///
    /// Integral floats drop their fractional part so a phone number stored as
    /// a numeric cell reads back as digits only.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Numeric value of the cell, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => parse_number(s),
            _ => None,
        }
    }
}

/// Parse numeric text, tolerating thousands separators
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert an Excel serial date (days since 1899-12-30) into a cell
///
/// Serials outside chrono's calendar keep their raw number instead of
/// becoming a date.
pub fn excel_serial_to_cell(serial: f64) -> Option<CellValue> {
    if !serial.is_finite() {
        return None;
    }
    Some(serial_to_datetime(serial).unwrap_or(CellValue::Float(serial)))
}

fn serial_to_datetime(serial: f64) -> Option<CellValue> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = TimeDelta::try_days(serial.trunc() as i64)?;
    let date = base.checked_add_signed(days)?;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    if seconds == 0 {
        Some(CellValue::Date(date))
    } else {
        let dt = date
            .and_hms_opt(0, 0, 0)?
            .checked_add_signed(TimeDelta::try_seconds(seconds)?)?;
        Some(CellValue::DateTime(dt))
    }
}

/// One spreadsheet data row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRow {
    pub email: Option<CellValue>,
    pub mobile_no: Option<CellValue>,
    pub name: Option<CellValue>,
    pub address: Option<CellValue>,
    pub tax_id: Option<CellValue>,
    pub tin: Option<CellValue>,
    pub rc: Option<CellValue>,
    pub amount: Option<CellValue>,
    pub date: Option<CellValue>,
}

impl InputRow {
    /// Transaction amount; a blank cell is a missing amount, non-numeric
    /// content is an error
    pub fn transaction_amount(&self) -> Result<Option<f64>> {
        match &self.amount {
            None => Ok(None),
            Some(cell) => cell.as_f64().map(Some).ok_or_else(|| {
                Error::InvalidData(format!(
                    "TRXN_AMOUNT is not a number: {}",
                    cell.to_text()
                ))
            }),
        }
    }

    /// Transaction date as text (ISO for date cells)
    pub fn transaction_date(&self) -> Option<String> {
        self.date.as_ref().map(CellValue::to_text)
    }

    fn is_blank(&self) -> bool {
        *self == InputRow::default()
    }
}

/// Supported sheet encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Csv,
}

impl SheetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }

    /// Format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" => Some(Self::Xlsx),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Column positions resolved from the header row
#[derive(Debug, Default)]
struct ColumnMap {
    email: Option<usize>,
    mobile_no: Option<usize>,
    name: Option<usize>,
    address: Option<usize>,
    tax_id: Option<usize>,
    tin: Option<usize>,
    rc: Option<usize>,
    amount: usize,
    date: usize,
}

impl ColumnMap {
    fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut map = ColumnMap::default();
        let mut amount = None;
        let mut date = None;

        for (i, header) in headers.into_iter().enumerate() {
            let slot = match header.trim().to_ascii_uppercase().as_str() {
                "EMAIL" => &mut map.email,
                "MOBILE_NO" => &mut map.mobile_no,
                "NAME" => &mut map.name,
                "ADDRESS" => &mut map.address,
                "TAX_ID" => &mut map.tax_id,
                "TIN" => &mut map.tin,
                "RC" => &mut map.rc,
                "TRXN_AMOUNT" => &mut amount,
                "TRXN_DATE" => &mut date,
                _ => continue,
            };
            // First occurrence wins on duplicated headers
            if slot.is_none() {
                *slot = Some(i);
            }
        }

        map.amount = amount
            .ok_or_else(|| Error::InvalidData("Missing required column TRXN_AMOUNT".into()))?;
        map.date =
            date.ok_or_else(|| Error::InvalidData("Missing required column TRXN_DATE".into()))?;
        Ok(map)
    }

    fn build_row<F>(&self, cell: F) -> InputRow
    where
        F: Fn(usize) -> Option<CellValue>,
    {
        let opt = |idx: Option<usize>| idx.and_then(&cell);
        InputRow {
            email: opt(self.email),
            mobile_no: opt(self.mobile_no),
            name: opt(self.name),
            address: opt(self.address),
            tax_id: opt(self.tax_id),
            tin: opt(self.tin),
            rc: opt(self.rc),
            amount: cell(self.amount),
            date: cell(self.date),
        }
    }
}

/// Read every data row of a sheet
///
/// Completely blank rows are skipped; they are formatting residue, not
/// transactions.
pub fn read_rows(bytes: &[u8], format: SheetFormat) -> Result<Vec<InputRow>> {
    let rows = match format {
        SheetFormat::Xlsx => read_xlsx(bytes)?,
        SheetFormat::Csv => read_csv(bytes)?,
    };
    debug!(format = format.as_str(), rows = rows.len(), "Read sheet");
    Ok(rows)
}

fn read_csv(bytes: &[u8]) -> Result<Vec<InputRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = rdr.headers()?.clone();
    let columns = ColumnMap::from_headers(headers.iter())?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row = columns.build_row(|i| record.get(i).and_then(CellValue::from_text));
        if !row.is_blank() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn read_xlsx(bytes: &[u8]) -> Result<Vec<InputRow>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::InvalidData("Workbook has no worksheets".into()))??;

    let mut sheet_rows = range.rows();
    let header_row = sheet_rows
        .next()
        .ok_or_else(|| Error::InvalidData("Worksheet is empty".into()))?;
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| xlsx_cell(c).map(|v| v.to_text()).unwrap_or_default())
        .collect();
    let columns = ColumnMap::from_headers(headers.iter().map(String::as_str))?;

    let mut rows = Vec::new();
    for sheet_row in sheet_rows {
        let row = columns.build_row(|i| sheet_row.get(i).and_then(xlsx_cell));
        if !row.is_blank() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Map a calamine cell onto [`CellValue`]
fn xlsx_cell(data: &Data) -> Option<CellValue> {
    match data {
        Data::String(s) => CellValue::from_text(s),
        Data::Int(i) => Some(CellValue::Int(*i)),
        Data::Float(f) => Some(CellValue::Float(*f)),
        Data::Bool(b) => Some(CellValue::Bool(*b)),
        Data::DateTime(dt) => excel_serial_to_cell(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from_text(s),
        _ => None,
    }
}
