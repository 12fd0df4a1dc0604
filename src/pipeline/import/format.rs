use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ImportError;

/// Spreadsheet containers we can read
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SheetFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SheetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Csv => "csv",
        }
    }
}

pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024; // 20MB

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Detect the spreadsheet format from magic bytes, not the file extension.
pub fn detect_format(content: &[u8]) -> Result<SheetFormat, ImportError> {
    check_size(content.len() as u64)?;

    if content.starts_with(&ZIP_MAGIC) {
        return Ok(SheetFormat::Xlsx);
    }
    if content.starts_with(&OLE_MAGIC) {
        return Ok(SheetFormat::Xls);
    }
    if is_likely_text(content) {
        return Ok(SheetFormat::Csv);
    }
    Err(ImportError::UnsupportedFormat(
        "expected an .xlsx, .xls or .csv spreadsheet".into(),
    ))
}

/// Read an upload from disk, refusing oversized files before loading them.
pub fn read_upload(path: &Path) -> Result<Vec<u8>, ImportError> {
    let metadata = std::fs::metadata(path)?;
    check_size(metadata.len())?;
    Ok(std::fs::read(path)?)
}

fn check_size(size: u64) -> Result<(), ImportError> {
    if size > MAX_FILE_SIZE {
        return Err(ImportError::FileTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: MAX_FILE_SIZE / (1024 * 1024),
        });
    }
    Ok(())
}

/// Valid UTF-8 (BOM allowed) with mostly printable characters in the first 4KB
fn is_likely_text(content: &[u8]) -> bool {
    let head = &content[..content.len().min(4096)];
    if head.is_empty() {
        return false;
    }
    let text = match std::str::from_utf8(head) {
        Ok(t) => t,
        // A multi-byte character may straddle the 4KB cut
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => {
            match std::str::from_utf8(&head[..e.valid_up_to()]) {
                Ok(t) => t,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    let text = text.trim_start_matches('\u{feff}');

    let total = text.chars().count().max(1);
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable as f64 / total as f64 > 0.95
}

/// Sanitize a filename: strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    let name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let clean: String = name
        .chars()
        .filter(|c| !c.is_control())
        .take(255)
        .collect();

    if clean.trim().is_empty() || clean == "." || clean == ".." {
        "upload".to_string()
    } else {
        clean
    }
}
