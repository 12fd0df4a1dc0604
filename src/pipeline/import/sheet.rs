//! Grid extraction from spreadsheet uploads.
//!
//! Every format is flattened into a rectangular-ish `Grid` of `CellValue`s
//! indexed from the sheet's top-left corner (A1), so row and column numbers
//! match what an operator sees in Excel.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::{NaiveDateTime, Timelike};

use super::format::SheetFormat;
use super::ImportError;

/// One cell, reduced to the types the normalizer cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

static EMPTY: CellValue = CellValue::Empty;

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display form used for headers and free-text fields.
    ///
    /// Whole-number floats lose their fractional part so identifiers read
    /// back as `24001234567` rather than `24001234567.0`.
    pub fn display(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::DateTime(dt) => {
                if dt.time().num_seconds_from_midnight() == 0 {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// First worksheet of an upload as rows of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<CellValue>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> &[CellValue] {
        self.rows.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Display text of each cell in a row, for header matching.
    pub fn row_text(&self, index: usize) -> Vec<String> {
        self.row(index).iter().map(CellValue::display).collect()
    }
}

/// Read the first worksheet (or the CSV body) into a `Grid`.
pub fn read_grid(content: &[u8], format: SheetFormat) -> Result<Grid, ImportError> {
    let grid = match format {
        SheetFormat::Csv => read_csv(content)?,
        SheetFormat::Xlsx | SheetFormat::Xls => read_workbook(content)?,
    };
    if grid.rows.iter().all(|row| row.iter().all(CellValue::is_empty)) {
        return Err(ImportError::EmptySheet);
    }
    Ok(grid)
}

fn read_workbook(content: &[u8]) -> Result<Grid, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| ImportError::FileReadError(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::EmptySheet)?
        .map_err(|e| ImportError::FileReadError(e.to_string()))?;

    // calamine trims leading empty rows/columns; pad them back so indices are absolute
    let (start_row, start_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); start_row];
    for source in range.rows() {
        let mut row = vec![CellValue::Empty; start_col];
        row.extend(source.iter().map(cell_from_data));
        rows.push(row);
    }
    Ok(Grid::new(rows))
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::Text(cell.to_string()),
        },
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

fn read_csv(content: &[u8]) -> Result<Grid, ImportError> {
    let body = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(Grid::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    #[test]
    fn csv_rows_are_read_verbatim() {
        let csv = "\u{feff}Lab. no.,IM Lab. no.,Patient name\n24IG001731,IM662,\"Chan, Tai Man\"\n,IM663\n";
        let grid = read_grid(csv.as_bytes(), SheetFormat::Csv).unwrap();
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.row_text(0), vec!["Lab. no.", "IM Lab. no.", "Patient name"]);
        assert_eq!(grid.cell(1, 2), &CellValue::Text("Chan, Tai Man".into()));
        assert_eq!(grid.cell(2, 0), &CellValue::Empty);
        assert_eq!(grid.cell(2, 2), &CellValue::Empty);
    }

    #[test]
    fn blank_csv_is_empty_sheet() {
        assert!(matches!(
            read_grid(b",,\n,,\n", SheetFormat::Csv),
            Err(ImportError::EmptySheet)
        ));
    }

    #[test]
    fn xlsx_cells_keep_types_and_positions() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let date_format = Format::new().set_num_format("dd/mm/yyyy");
        sheet.write_string(1, 1, "Lab. no.").unwrap();
        sheet.write_string(1, 2, "DOB").unwrap();
        sheet.write_number(2, 1, 24001234567.0).unwrap();
        let dob = ExcelDateTime::from_ymd(1990, 4, 12).unwrap();
        sheet.write_datetime_with_format(2, 2, &dob, &date_format).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let grid = read_grid(&bytes, SheetFormat::Xlsx).unwrap();
        assert_eq!(grid.cell(1, 1).display(), "Lab. no.");
        assert_eq!(grid.cell(2, 1).display(), "24001234567");
        assert_eq!(
            grid.cell(2, 2),
            &CellValue::DateTime(
                NaiveDate::from_ymd_opt(1990, 4, 12)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
        assert!(grid.cell(0, 0).is_empty());
    }

    #[test]
    fn garbage_workbook_is_read_error() {
        let bytes = [0x50, 0x4B, 0x03, 0x04, 0x00, 0x00];
        assert!(matches!(
            read_grid(&bytes, SheetFormat::Xlsx),
            Err(ImportError::FileReadError(_))
        ));
    }

    #[test]
    fn number_display() {
        assert_eq!(format_number(29.0), "29");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(CellValue::Bool(true).display(), "TRUE");
        assert_eq!(CellValue::Text("  M/29 ".into()).display(), "M/29");
    }
}
