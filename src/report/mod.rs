//! Patient report generation.
//!
//! Reports are rendered to PDF bytes first; callers decide whether to stream
//! them, save them under the reports directory, or both.

pub mod patient;

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::Connection;
use thiserror::Error;

use crate::db::repository::{get_patient_by_lab_number, get_variant_findings};
use crate::db::DatabaseError;

pub use patient::PatientReport;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A rendered report and the name it should be stored or downloaded under.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// `patient_info_{lab}_{YYYYmmdd_HHMMSS}.pdf`. Characters that are not safe in
/// file names are dropped from the key.
pub fn report_file_name(key: &str, at: NaiveDateTime) -> String {
    let safe: String = key
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let safe = if safe.is_empty() { "unknown".to_string() } else { safe };
    format!("patient_info_{safe}_{}.pdf", at.format("%Y%m%d_%H%M%S"))
}

/// Greedy word wrap on whitespace. Words longer than `max_chars` are kept
/// whole on their own line.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = current.chars().count() + word.chars().count() + 1;
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Load a patient with findings and render the PDF.
pub fn generate_report(
    conn: &Connection,
    key: &str,
    now: NaiveDateTime,
) -> Result<GeneratedReport, ReportError> {
    let record = get_patient_by_lab_number(conn, key)?
        .ok_or_else(|| ReportError::PatientNotFound(key.to_string()))?;
    let findings = match record.id {
        Some(id) => get_variant_findings(conn, id)?,
        None => Vec::new(),
    };

    let report = PatientReport::from_record(&record, &findings, now.date());
    let bytes = report.render_pdf()?;
    let file_name = report_file_name(record.primary_key().unwrap_or(key), now);

    tracing::info!(
        patient = %key,
        findings = findings.len(),
        bytes = bytes.len(),
        "Patient report rendered"
    );
    Ok(GeneratedReport { file_name, bytes })
}

/// Write `bytes` to `dir/file_name` atomically. The directory is created
/// when missing.
pub fn save_report(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir)?;
    let target = dir.join(file_name);

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(&target).map_err(|e| ReportError::Io(e.error))?;

    tracing::info!(path = %target.display(), "Report saved");
    Ok(target)
}
