pub mod format;
pub mod hash;
pub mod importer;
pub mod sheet;

pub use format::*;
pub use hash::*;
pub use importer::*;
pub use sheet::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Could not read spreadsheet: {0}")]
    FileReadError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet has no rows")]
    EmptySheet,

    #[error("No header row found in the first {scanned} rows")]
    HeaderNotFound { scanned: usize },

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid lab number format: {0}")]
    InvalidLabNumber(String),

    #[error("No lab number supplied and none found in the sheet header")]
    MissingLabNumber,

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Row {row}: duplicate patient key {key}")]
    DuplicateRejected { row: usize, key: String },

    #[error("Could not write workbook: {0}")]
    WorkbookWrite(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
