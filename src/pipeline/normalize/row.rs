//! Cell → typed field coercion for patient-list rows.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate, NaiveDateTime};
use regex::Regex;

use super::columns::{ColumnMap, PatientField};
use crate::models::PatientRecord;
use crate::pipeline::import::{format_number, CellValue, ImportError};

/// Cell contents treated as "no value" (compared trimmed, case-insensitive).
pub const MISSING_SENTINELS: &[&str] = &["", "nan", "none", "null", "n/a", "na", "nat", "-", "--"];

/// Largest serial Excel accepts (9999-12-31).
const EXCEL_SERIAL_MAX: f64 = 2_958_465.0;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y%m%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

static LAB_NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"^IM\d{3,}$", r"^2\d{10}$", r"^\d{2}[A-Z]{2}\d{6}$"]
        .iter()
        .map(|p| Regex::new(p).expect("lab number pattern compiles"))
        .collect()
});

pub fn is_missing(raw: &str) -> bool {
    let trimmed = raw.trim();
    MISSING_SENTINELS
        .iter()
        .any(|s| trimmed.eq_ignore_ascii_case(s))
}

/// Trimmed display text, `None` for sentinels.
pub fn clean_text(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Empty => None,
        CellValue::Number(n) if n.is_nan() => None,
        other => {
            let text = other.display();
            if is_missing(&text) {
                None
            } else {
                Some(text)
            }
        }
    }
}

/// Canonical accession key: whitespace removed, upper-cased. Every stored
/// key and every lookup goes through this.
pub fn canonical_key(raw: &str) -> Option<String> {
    let key = raw.split_whitespace().collect::<String>().to_uppercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Canonical accession number of a sheet cell.
pub fn canonical_lab_number(cell: &CellValue) -> Option<String> {
    clean_text(cell).and_then(|s| canonical_key(&s))
}

/// Whether a canonical key matches one of the known accession formats.
pub fn is_known_lab_format(key: &str) -> bool {
    LAB_NUMBER_PATTERNS.iter().any(|re| re.is_match(key))
}

/// Check an accession number against the known formats and return its
/// canonical form.
pub fn validate_lab_number(raw: &str) -> Result<String, ImportError> {
    let canonical = canonical_key(raw).unwrap_or_default();
    if is_known_lab_format(&canonical) {
        Ok(canonical)
    } else {
        Err(ImportError::InvalidLabNumber(raw.trim().to_string()))
    }
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=EXCEL_SERIAL_MAX).contains(&serial) {
        return None;
    }
    // 1900 date system; the 1899-12-30 epoch absorbs the Lotus leap-year bug
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.trunc() as u64))
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
                .map(|dt| dt.date())
        })
}

/// Coerce a cell to a calendar date.
///
/// `Ok(None)` for missing values; `Err` carries the raw text of a value that
/// is present but not a recognizable date.
pub fn coerce_date(cell: &CellValue) -> Result<Option<NaiveDate>, String> {
    match cell {
        CellValue::Empty => Ok(None),
        CellValue::DateTime(dt) => Ok(Some(dt.date())),
        CellValue::Number(n) => excel_serial_to_date(*n)
            .map(Some)
            .ok_or_else(|| format_number(*n)),
        CellValue::Bool(b) => Err(b.to_string()),
        CellValue::Text(raw) => {
            let text = raw.trim();
            if is_missing(text) {
                return Ok(None);
            }
            if let Some(date) = parse_date_text(text) {
                return Ok(Some(date));
            }
            match text.parse::<f64>() {
                Ok(serial) => excel_serial_to_date(serial)
                    .map(Some)
                    .ok_or_else(|| text.to_string()),
                Err(_) => Err(text.to_string()),
            }
        }
    }
}

/// Split a combined "Sex/Age" value such as `M/29`.
///
/// Without a `/` both parts are `None`.
pub fn split_sex_age(raw: &str) -> (Option<String>, Option<String>) {
    let text = raw.trim();
    if is_missing(text) {
        return (None, None);
    }
    match text.split_once('/') {
        Some((sex, age)) => {
            let sex = Some(sex.trim().to_uppercase()).filter(|s| !is_missing(s));
            let age = Some(age.trim().to_string()).filter(|s| !is_missing(s));
            (sex, age)
        }
        None => (None, None),
    }
}

/// Result of normalizing one data row.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRow {
    /// Every cell was blank or a sentinel.
    Empty,
    Patient {
        record: PatientRecord,
        warnings: Vec<String>,
    },
}

static EMPTY_CELL: CellValue = CellValue::Empty;

fn cell_at<'a>(row: &'a [CellValue], map: &ColumnMap<PatientField>, field: PatientField) -> &'a CellValue {
    map.get(field)
        .and_then(|col| row.get(col))
        .unwrap_or(&EMPTY_CELL)
}

pub fn row_is_empty(row: &[CellValue]) -> bool {
    row.iter().all(|cell| clean_text(cell).is_none())
}

/// Build a `PatientRecord` from a data row. `row_number` is the 1-based
/// spreadsheet row, used in warnings.
pub fn normalize_patient_row(
    row: &[CellValue],
    map: &ColumnMap<PatientField>,
    row_number: usize,
) -> NormalizedRow {
    if row_is_empty(row) {
        return NormalizedRow::Empty;
    }

    let cell = |field: PatientField| cell_at(row, map, field);
    let text = |field: PatientField| clean_text(cell(field));

    let mut warnings = Vec::new();
    let mut date = |field: PatientField, label: &str| match coerce_date(cell(field)) {
        Ok(value) => value,
        Err(raw) => {
            warnings.push(format!("Row {row_number}: could not parse {label} '{raw}'"));
            None
        }
    };

    let report_date = date(PatientField::ReportDate, "reported date");
    let dob = date(PatientField::Dob, "date of birth");
    let specimen_collected = date(PatientField::SpecimenCollected, "sample collection date");
    let specimen_arrived = date(PatientField::SpecimenArrived, "sample receive date");

    let (mut sex, mut age) = text(PatientField::SexAge)
        .map(|raw| split_sex_age(&raw))
        .unwrap_or((None, None));
    if sex.is_none() {
        sex = text(PatientField::Sex).map(|s| s.to_uppercase());
    }
    if age.is_none() {
        age = text(PatientField::Age);
    }

    let record = PatientRecord {
        report_date,
        lab_number: canonical_lab_number(cell(PatientField::LabNumber)),
        im_lab_number: canonical_lab_number(cell(PatientField::ImLabNumber)),
        name: text(PatientField::Name),
        hkid: text(PatientField::Hkid),
        dob,
        sex,
        age,
        ethnicity: text(PatientField::Ethnicity),
        specimen_collected,
        specimen_arrived,
        case_history: text(PatientField::CaseHistory),
        type_of_test: text(PatientField::TypeOfTest),
        type_of_findings: text(PatientField::TypeOfFindings),
        ..Default::default()
    };

    NormalizedRow::Patient { record, warnings }
}
