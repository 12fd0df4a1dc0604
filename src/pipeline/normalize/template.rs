//! Review-template annotator.
//!
//! Raw singleton/trio variant exports come without the curator review
//! columns. This inserts them at fixed positions and writes a fresh `.xlsx`.

use chrono::{Datelike, Timelike};
use rust_xlsxwriter::{Color, ExcelDateTime, Format, Workbook, XlsxError};
use serde::Serialize;

use super::columns::{header_key, locate_header_row, ColumnRules, HEADER_SCAN_LIMIT};
use super::summary::REPORTABLE_MARKER;
use crate::models::enums::TemplateKind;
use crate::pipeline::import::{detect_format, read_grid, CellValue, Grid, ImportError};

/// Review columns inserted after `Reportable Variant`, in sheet order.
pub const REVIEW_COLUMNS: [&str; 6] = [
    "IGV review (True / False call)",
    "Zygosity",
    "Phenotype",
    "First review and comment",
    "Second review and comment on reportable variant",
    "Special remarks",
];

const EXCEL_MAX_ROWS: usize = 1_048_576;
const EXCEL_MAX_COLS: usize = 16_384;

/// Column index (after `Reportable Variant` has been inserted at 0) where
/// the review block starts: after the variant-info block for singletons,
/// after "Flags" for trios.
pub fn review_insert_index(kind: TemplateKind) -> usize {
    match kind {
        TemplateKind::Singleton => 4,
        TemplateKind::Trio => 5,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedTemplate {
    pub kind: TemplateKind,
    pub header_row: usize,
    pub already_annotated: bool,
    pub file_name: String,
    #[serde(skip)]
    pub workbook: Vec<u8>,
}

/// Output name for an annotated upload: `{stem}_review.xlsx`.
pub fn annotated_file_name(original: &str) -> String {
    let stem = match original.rfind('.') {
        Some(dot) if dot > 0 => &original[..dot],
        _ => original,
    };
    format!("{stem}_review.xlsx")
}

fn has_review_columns(grid: &Grid, header_row: usize) -> bool {
    let marker = header_key(REPORTABLE_MARKER);
    grid.row_text(header_row)
        .iter()
        .any(|h| header_key(h) == marker)
}

fn insert_cells(row: &mut Vec<CellValue>, at: usize, cells: Vec<CellValue>) {
    if row.len() < at {
        row.resize(at, CellValue::Empty);
    }
    row.splice(at..at, cells);
}

/// Insert the review columns into every row. Rows above the header keep
/// their alignment with the columns below them.
pub fn annotate_grid(grid: &Grid, header_row: usize, kind: TemplateKind) -> Grid {
    let at = review_insert_index(kind);
    let rows = grid
        .rows()
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let mut row = source.clone();
            let is_header = index == header_row;

            let marker = if is_header {
                CellValue::Text(REPORTABLE_MARKER.to_string())
            } else {
                CellValue::Empty
            };
            insert_cells(&mut row, 0, vec![marker]);

            let block = REVIEW_COLUMNS
                .iter()
                .map(|title| {
                    if is_header {
                        CellValue::Text(title.to_string())
                    } else {
                        CellValue::Empty
                    }
                })
                .collect();
            // Only rows reaching the insertion point need padding; shorter
            // data rows simply end before the review block
            if is_header || row.len() > at {
                insert_cells(&mut row, at, block);
            }
            row
        })
        .collect();
    Grid::new(rows)
}

fn xlsx_error(e: XlsxError) -> ImportError {
    ImportError::WorkbookWrite(e.to_string())
}

fn excel_datetime(dt: &chrono::NaiveDateTime) -> Result<ExcelDateTime, ImportError> {
    let year = u16::try_from(dt.year())
        .map_err(|_| ImportError::WorkbookWrite(format!("date out of range: {dt}")))?;
    ExcelDateTime::from_ymd(year, dt.month() as u8, dt.day() as u8)
        .and_then(|d| d.and_hms(dt.hour() as u16, dt.minute() as u8, dt.second()))
        .map_err(xlsx_error)
}

/// Write a grid to a single-sheet workbook. `highlight` columns in the
/// header row are written bold on a pale fill.
pub fn write_workbook(
    grid: &Grid,
    header_row: usize,
    highlight: &[usize],
) -> Result<Vec<u8>, ImportError> {
    if grid.height() > EXCEL_MAX_ROWS || grid.width() > EXCEL_MAX_COLS {
        return Err(ImportError::WorkbookWrite(
            "sheet exceeds Excel row/column limits".into(),
        ));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    let header_format = Format::new().set_bold();
    let review_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xFFF2CC));

    for (r, row) in grid.rows().iter().enumerate() {
        let r = r as u32;
        for (c, cell) in row.iter().enumerate() {
            let c = c as u16;
            let is_header = r as usize == header_row;
            let format = if is_header && highlight.contains(&(c as usize)) {
                Some(&review_format)
            } else if is_header {
                Some(&header_format)
            } else {
                None
            };
            match cell {
                CellValue::Empty => {}
                CellValue::Text(s) => match format {
                    Some(f) => {
                        sheet.write_string_with_format(r, c, s, f).map_err(xlsx_error)?;
                    }
                    None => {
                        sheet.write_string(r, c, s).map_err(xlsx_error)?;
                    }
                },
                CellValue::Number(n) => {
                    sheet.write_number(r, c, *n).map_err(xlsx_error)?;
                }
                CellValue::Bool(b) => {
                    sheet.write_boolean(r, c, *b).map_err(xlsx_error)?;
                }
                CellValue::DateTime(dt) => {
                    let value = excel_datetime(dt)?;
                    let f = if dt.time().num_seconds_from_midnight() == 0 {
                        &date_format
                    } else {
                        &datetime_format
                    };
                    sheet
                        .write_datetime_with_format(r, c, &value, f)
                        .map_err(xlsx_error)?;
                }
            }
        }
    }

    for col in highlight {
        sheet
            .set_column_width(*col as u16, 22)
            .map_err(xlsx_error)?;
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

/// Annotate an uploaded variant export. Already-annotated sheets are
/// rewritten unchanged.
pub fn annotate_template(content: &[u8], file_name: &str) -> Result<AnnotatedTemplate, ImportError> {
    let format = detect_format(content)?;
    let grid = read_grid(content, format)?;

    let header_row = match locate_header_row(
        &grid,
        &ColumnRules::variant(TemplateKind::Singleton),
        HEADER_SCAN_LIMIT,
    ) {
        Ok(row) => row,
        Err(_) => {
            // Platform exports put a group-title row above the header row
            let fallback = usize::from(grid.height() > 1);
            tracing::warn!(file = %file_name, row = fallback + 1, "Header row not recognized, assuming default position");
            fallback
        }
    };
    let kind = TemplateKind::detect(&grid.row_text(header_row));
    let output_name = annotated_file_name(file_name);

    if has_review_columns(&grid, header_row) {
        tracing::info!(file = %file_name, kind = kind.as_str(), "Template already annotated");
        return Ok(AnnotatedTemplate {
            kind,
            header_row,
            already_annotated: true,
            file_name: output_name,
            workbook: write_workbook(&grid, header_row, &[])?,
        });
    }

    let annotated = annotate_grid(&grid, header_row, kind);
    let at = review_insert_index(kind);
    let mut highlight = vec![0];
    highlight.extend(at..at + REVIEW_COLUMNS.len());

    tracing::info!(
        file = %file_name,
        kind = kind.as_str(),
        header_row = header_row + 1,
        "Review columns inserted"
    );

    Ok(AnnotatedTemplate {
        kind,
        header_row,
        already_annotated: false,
        file_name: output_name,
        workbook: write_workbook(&annotated, header_row, &highlight)?,
    })
}
