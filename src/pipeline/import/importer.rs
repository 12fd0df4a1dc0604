use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::format::{detect_format, read_upload, sanitize_filename, SheetFormat};
use super::hash::compute_content_hash;
use super::sheet::{read_grid, Grid};
use super::ImportError;
use crate::db::repository::{self, ImportAuditEntry};
use crate::db::DatabaseError;
use crate::models::enums::{DuplicatePolicy, FindingClass, ImportKind, TemplateKind};
use crate::models::{PatientRecord, VariantFinding};
use crate::pipeline::normalize::{
    canonical_key, combined_summary, headline_class, locate_header_row, normalize_patient_row, scan_review,
    validate_lab_number, ColumnMap, ColumnRules, NormalizedRow, PatientField, VariantField,
    HEADER_SCAN_LIMIT, REPORTABLE_MARKER,
};

/// A data row that could not be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIssue {
    /// 1-based spreadsheet row
    pub row: usize,
    pub reason: String,
    pub patient: Option<String>,
    pub lab_number: Option<String>,
    pub im_lab_number: Option<String>,
}

impl RowIssue {
    fn for_record(row: usize, reason: impl Into<String>, record: &PatientRecord) -> Self {
        Self {
            row,
            reason: reason.into(),
            patient: record.name.clone(),
            lab_number: record.lab_number.clone(),
            im_lab_number: record.im_lab_number.clone(),
        }
    }
}

/// Patient-list import result returned to the CLI and the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub file_name: String,
    pub format: SheetFormat,
    pub content_hash: String,
    pub policy: DuplicatePolicy,
    /// 1-based spreadsheet row holding the headers
    pub header_row: usize,
    pub total_rows: usize,
    pub empty_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub errors: Vec<RowIssue>,
    pub warnings: Vec<String>,
    pub unmapped_columns: Vec<String>,
    pub previously_imported: bool,
}

impl ImportSummary {
    /// Rows that carried data (everything but blank rows).
    pub fn data_rows(&self) -> usize {
        self.total_rows - self.empty_rows
    }

    /// Rows rejected because neither accession number was present.
    pub fn missing_numbers(&self) -> impl Iterator<Item = &RowIssue> {
        self.errors
            .iter()
            .filter(|issue| issue.lab_number.is_none() && issue.im_lab_number.is_none())
    }
}

/// Variant-review application result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub file_name: String,
    pub lab_number: String,
    pub template_kind: TemplateKind,
    pub header_row: usize,
    pub rows_scanned: usize,
    pub findings: Vec<VariantFinding>,
    pub headline_class: Option<FindingClass>,
    pub summary: Option<String>,
    pub warnings: Vec<String>,
    pub previously_imported: bool,
}

const MISSING_KEYS_REASON: &str = "Both Lab No. and IM Lab No. are empty";

/// Import a patient list spreadsheet into the registry.
///
/// The whole file is applied in one transaction: a `Fail` policy duplicate
/// or a database error leaves the registry untouched.
pub fn import_patient_list(
    conn: &Connection,
    content: &[u8],
    file_name: &str,
    policy: DuplicatePolicy,
) -> Result<ImportSummary, ImportError> {
    let file_name = sanitize_filename(file_name);
    tracing::info!(file = %file_name, policy = policy.as_str(), "Starting patient list import");

    // Step 1: Format detection + grid extraction
    let format = detect_format(content)?;
    let grid = read_grid(content, format)?;
    let content_hash = compute_content_hash(content);

    // Step 2: Header row + column mapping
    let rules = ColumnRules::patient();
    let header_row = locate_header_row(&grid, &rules, HEADER_SCAN_LIMIT)?;
    let map = ColumnMap::build(&grid.row_text(header_row), &rules);
    map.require_any(&[
        (PatientField::LabNumber, "Lab. no."),
        (PatientField::ImLabNumber, "IM Lab. no."),
    ])?;
    if !map.unmapped.is_empty() {
        tracing::debug!(columns = ?map.unmapped, "Unmapped patient list columns");
    }

    let previously_imported = repository::content_hash_seen(conn, &content_hash)?;
    if previously_imported {
        tracing::info!(file = %file_name, "File content was imported before");
    }

    let mut summary = ImportSummary {
        file_name: file_name.clone(),
        format,
        content_hash: content_hash.clone(),
        policy,
        header_row: header_row + 1,
        total_rows: grid.height().saturating_sub(header_row + 1),
        empty_rows: 0,
        inserted: 0,
        updated: 0,
        duplicates: 0,
        failed: 0,
        errors: Vec::new(),
        warnings: Vec::new(),
        unmapped_columns: map.unmapped.clone(),
        previously_imported,
    };

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;

    // Step 3: Normalize + persist each row
    for (index, row) in grid.rows().iter().enumerate().skip(header_row + 1) {
        let row_number = index + 1;
        let (record, warnings) = match normalize_patient_row(row, &map, row_number) {
            NormalizedRow::Empty => {
                summary.empty_rows += 1;
                continue;
            }
            NormalizedRow::Patient { record, warnings } => (record, warnings),
        };
        summary.warnings.extend(warnings);

        if !record.has_key() {
            summary.failed += 1;
            summary
                .errors
                .push(RowIssue::for_record(row_number, MISSING_KEYS_REASON, &record));
            continue;
        }

        store_record(&tx, &record, row_number, policy, &mut summary)?;
    }

    // Step 4: Audit row, then commit
    repository::insert_import_audit(
        &tx,
        &ImportAuditEntry {
            kind: ImportKind::PatientList,
            file_name: file_name.clone(),
            content_hash,
            template_kind: None,
            total_rows: summary.total_rows as i64,
            inserted: summary.inserted as i64,
            updated: summary.updated as i64,
            duplicates: summary.duplicates as i64,
            failed: summary.failed as i64,
            imported_at: None,
        },
    )?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        file = %file_name,
        total = summary.total_rows,
        empty = summary.empty_rows,
        inserted = summary.inserted,
        updated = summary.updated,
        duplicates = summary.duplicates,
        failed = summary.failed,
        "Patient list imported"
    );
    Ok(summary)
}

fn store_record(
    conn: &Connection,
    record: &PatientRecord,
    row_number: usize,
    policy: DuplicatePolicy,
    summary: &mut ImportSummary,
) -> Result<(), ImportError> {
    let result = match policy {
        DuplicatePolicy::Update => repository::upsert_patient(conn, record).map(|(_, inserted)| inserted),
        DuplicatePolicy::Skip | DuplicatePolicy::Fail => {
            repository::insert_patient(conn, record).map(|_| true)
        }
    };

    match result {
        Ok(true) => summary.inserted += 1,
        Ok(false) => summary.updated += 1,
        Err(DatabaseError::Duplicate { key }) => match policy {
            DuplicatePolicy::Skip => {
                summary.duplicates += 1;
                summary
                    .warnings
                    .push(format!("Row {row_number}: duplicate key {key} skipped"));
            }
            DuplicatePolicy::Fail => {
                tracing::warn!(row = row_number, key = %key, "Duplicate key, aborting import");
                return Err(ImportError::DuplicateRejected { row: row_number, key });
            }
            // Lab and IM numbers point at two different stored patients
            DuplicatePolicy::Update => {
                summary.failed += 1;
                summary.errors.push(RowIssue::for_record(
                    row_number,
                    format!("Keys belong to different existing patients ({key})"),
                    record,
                ));
            }
        },
        Err(DatabaseError::ConstraintViolation(reason)) => {
            summary.failed += 1;
            summary
                .errors
                .push(RowIssue::for_record(row_number, reason, record));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Read a patient list from disk and import it.
pub fn import_patient_file(
    conn: &Connection,
    path: &Path,
    policy: DuplicatePolicy,
) -> Result<ImportSummary, ImportError> {
    let content = read_upload(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    import_patient_list(conn, &content, name, policy)
}

/// First accession number found in the rows down to the header row. Review
/// exports carry the IM number in a group-title cell such as "IM662".
fn lab_number_from_sheet(grid: &Grid, header_row: usize) -> Option<String> {
    (0..=header_row).find_map(|index| {
        grid.row(index).iter().find_map(|cell| {
            cell.display()
                .split(|c: char| c.is_whitespace() || c == '_' || c == '(' || c == ')')
                .find_map(|token| validate_lab_number(token).ok())
        })
    })
}

/// Canonical key for an operator-supplied accession number. Numbers outside
/// the known formats are accepted only when a stored record carries them,
/// so records imported under legacy numbers stay reachable.
pub fn resolve_lab_number(conn: &Connection, raw: &str) -> Result<String, ImportError> {
    let err = match validate_lab_number(raw) {
        Ok(key) => return Ok(key),
        Err(err) => err,
    };
    match canonical_key(raw) {
        Some(key) if repository::get_patient_by_lab_number(conn, &key)?.is_some() => Ok(key),
        _ => Err(err),
    }
}

/// Apply a curated variant review to a patient: store the marked findings
/// and record the headline class and summary on the patient.
pub fn apply_variant_review(
    conn: &Connection,
    content: &[u8],
    file_name: &str,
    lab_number: Option<&str>,
) -> Result<ReviewOutcome, ImportError> {
    let file_name = sanitize_filename(file_name);
    tracing::info!(file = %file_name, "Starting variant review import");

    let format = detect_format(content)?;
    let grid = read_grid(content, format)?;
    let content_hash = compute_content_hash(content);

    // Locate with singleton rules, then remap with the detected template's rules
    let header_row = locate_header_row(
        &grid,
        &ColumnRules::variant(TemplateKind::Singleton),
        HEADER_SCAN_LIMIT,
    )?;
    let headers = grid.row_text(header_row);
    let kind = TemplateKind::detect(&headers);
    let map = ColumnMap::build(&headers, &ColumnRules::variant(kind));
    map.require_any(&[(VariantField::ReportableVariant, REPORTABLE_MARKER)])?;

    let lab_number = match lab_number {
        Some(raw) => resolve_lab_number(conn, raw)?,
        None => lab_number_from_sheet(&grid, header_row).ok_or(ImportError::MissingLabNumber)?,
    };
    let patient = repository::get_patient_by_lab_number(conn, &lab_number)?
        .ok_or_else(|| ImportError::PatientNotFound(lab_number.clone()))?;
    let patient_id = patient
        .id
        .ok_or_else(|| ImportError::PatientNotFound(lab_number.clone()))?;

    let previously_imported = repository::content_hash_seen(conn, &content_hash)?;
    let scan = scan_review(&grid, header_row, &map, kind);
    let mut warnings = scan.warnings;

    let headline = headline_class(&scan.findings);
    let summary = headline.map(|_| combined_summary(&scan.findings));

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
    repository::replace_variant_findings(&tx, patient_id, &scan.findings)?;
    match (headline, summary.as_deref()) {
        (Some(class), Some(text)) => repository::update_findings(&tx, &lab_number, class, text)?,
        _ => {
            repository::clear_findings(&tx, &lab_number)?;
            warnings.push(format!("No rows marked in the {REPORTABLE_MARKER} column"));
        }
    }
    repository::insert_import_audit(
        &tx,
        &ImportAuditEntry {
            kind: ImportKind::VariantReview,
            file_name: file_name.clone(),
            content_hash,
            template_kind: Some(kind),
            total_rows: scan.rows_scanned as i64,
            inserted: scan.findings.len() as i64,
            updated: i64::from(headline.is_some()),
            duplicates: 0,
            failed: 0,
            imported_at: None,
        },
    )?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        file = %file_name,
        lab_number = %lab_number,
        kind = kind.as_str(),
        findings = scan.findings.len(),
        headline = headline.map(|c| c.as_str()).unwrap_or("-"),
        "Variant review applied"
    );

    Ok(ReviewOutcome {
        file_name,
        lab_number,
        template_kind: kind,
        header_row: header_row + 1,
        rows_scanned: scan.rows_scanned,
        findings: scan.findings,
        headline_class: headline,
        summary,
        warnings,
        previously_imported,
    })
}

/// Read a variant review from disk and apply it.
pub fn apply_variant_review_file(
    conn: &Connection,
    path: &Path,
    lab_number: Option<&str>,
) -> Result<ReviewOutcome, ImportError> {
    let content = read_upload(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    apply_variant_review(conn, &content, name, lab_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::NaiveDate;
    use rust_xlsxwriter::Workbook;

    const PATIENT_CSV: &str = "\
Patient list,,,,,,
Singe gene Reported date,Lab. no.,IM Lab. no.,Patient name,DOB,Sex/Age,Referrer
2024-01-15,24IG001731,IM662,Chan Tai Man,12/04/1990,M/34,Dr Lee
,,,,,,
15/01/2024,,IM663,Wong Siu Ming,nan,F/2,
,,,No Numbers,,,
16/01/2024,24IG001733,,Lee Ka Yan,someday,F/40,
";

    fn import(conn: &Connection, csv: &str, policy: DuplicatePolicy) -> ImportSummary {
        import_patient_list(conn, csv.as_bytes(), "patients.csv", policy).unwrap()
    }

    #[test]
    fn imports_patient_list() {
        let conn = open_memory_database().unwrap();
        let summary = import(&conn, PATIENT_CSV, DuplicatePolicy::Skip);

        assert_eq!(summary.header_row, 2);
        assert_eq!(summary.total_rows, 5);
        assert_eq!(summary.empty_rows, 1);
        assert_eq!(summary.data_rows(), 4);
        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors[0].row, 6);
        assert_eq!(summary.errors[0].reason, "Both Lab No. and IM Lab No. are empty");
        assert_eq!(summary.errors[0].patient.as_deref(), Some("No Numbers"));
        assert_eq!(summary.missing_numbers().count(), 1);
        assert_eq!(summary.unmapped_columns, vec!["Referrer".to_string()]);
        assert_eq!(
            summary.warnings,
            vec!["Row 7: could not parse date of birth 'someday'".to_string()]
        );
        assert!(!summary.previously_imported);

        let stored = repository::get_patient_by_lab_number(&conn, "IM662").unwrap().unwrap();
        assert_eq!(stored.lab_number.as_deref(), Some("24IG001731"));
        assert_eq!(stored.report_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(stored.dob, NaiveDate::from_ymd_opt(1990, 4, 12));
        assert_eq!(stored.sex.as_deref(), Some("M"));
        assert_eq!(stored.age.as_deref(), Some("34"));
    }

    #[test]
    fn reimport_skips_duplicates_and_flags_hash() {
        let conn = open_memory_database().unwrap();
        import(&conn, PATIENT_CSV, DuplicatePolicy::Skip);
        let again = import(&conn, PATIENT_CSV, DuplicatePolicy::Skip);

        assert!(again.previously_imported);
        assert_eq!(again.inserted, 0);
        assert_eq!(again.duplicates, 3);
        assert_eq!(repository::count_patients(&conn).unwrap(), 3);
        assert_eq!(repository::recent_imports(&conn, 10).unwrap().len(), 2);
    }

    #[test]
    fn update_policy_merges_rows() {
        let conn = open_memory_database().unwrap();
        import(&conn, PATIENT_CSV, DuplicatePolicy::Skip);

        let correction = "Lab. no.,IM Lab. no.,Ethnicity\n24IG001731,IM662,Chinese\n";
        let summary = import(&conn, correction, DuplicatePolicy::Update);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.inserted, 0);

        let stored = repository::get_patient_by_lab_number(&conn, "24IG001731").unwrap().unwrap();
        assert_eq!(stored.ethnicity.as_deref(), Some("Chinese"));
        assert_eq!(stored.name.as_deref(), Some("Chan Tai Man"));
    }

    #[test]
    fn fail_policy_rolls_back_whole_file() {
        let conn = open_memory_database().unwrap();
        import(&conn, "Lab. no.,Patient name\n24IG001731,Chan\n", DuplicatePolicy::Skip);

        let batch = "Lab. no.,Patient name\n24IG009999,New\n24IG001731,Chan again\n";
        let err = import_patient_list(&conn, batch.as_bytes(), "batch.csv", DuplicatePolicy::Fail)
            .unwrap_err();
        assert!(matches!(err, ImportError::DuplicateRejected { row: 3, .. }));
        assert_eq!(repository::count_patients(&conn).unwrap(), 1);
        assert_eq!(repository::recent_imports(&conn, 10).unwrap().len(), 1);
    }

    #[test]
    fn missing_key_columns_rejected() {
        let conn = open_memory_database().unwrap();
        let err = import_patient_list(
            &conn,
            b"Patient name,DOB,Sex/Age\nChan,1990-04-12,M/34\n",
            "patients.csv",
            DuplicatePolicy::Skip,
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::MissingColumns(_)));
    }

    #[test]
    fn imports_xlsx_from_disk() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["Lab. no.", "IM Lab. no.", "Patient name"].iter().enumerate() {
            sheet.write_string(1, col as u16, *header).unwrap();
        }
        sheet.write_number(2, 0, 24001234567.0).unwrap();
        sheet.write_string(2, 1, "IM700").unwrap();
        sheet.write_string(2, 2, "Ho Wing").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patients.xlsx");
        workbook.save(&path).unwrap();

        let conn = open_memory_database().unwrap();
        let summary = import_patient_file(&conn, &path, DuplicatePolicy::Skip).unwrap();
        assert_eq!(summary.format, SheetFormat::Xlsx);
        assert_eq!(summary.file_name, "patients.xlsx");
        assert_eq!(summary.inserted, 1);
        assert!(repository::get_patient_by_lab_number(&conn, "24001234567")
            .unwrap()
            .is_some());
    }

    const REVIEW_CSV: &str = "\
,Variant Info,,,IM662,
Reportable Variant,Gene Names,HGVS c. (Clinically Relevant),HGVS p. (Clinically Relevant),Zygosity,Title
N,KCNQ2,c.100C>T,p.Arg34Cys,Het,Epilepsy
,GJB2,c.35delG,p.Gly12fs,Het,Deafness
A,SCN1A,c.5536A>G,p.Lys1846Glu,Het,Dravet syndrome
";

    fn seed_patient(conn: &Connection) {
        repository::insert_patient(
            conn,
            &PatientRecord {
                lab_number: Some("24IG001731".into()),
                im_lab_number: Some("IM662".into()),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn review_updates_patient_findings() {
        let conn = open_memory_database().unwrap();
        seed_patient(&conn);

        let outcome =
            apply_variant_review(&conn, REVIEW_CSV.as_bytes(), "IM662_review.csv", None).unwrap();
        assert_eq!(outcome.lab_number, "IM662");
        assert_eq!(outcome.template_kind, TemplateKind::Singleton);
        assert_eq!(outcome.header_row, 2);
        assert_eq!(outcome.findings.len(), 2);
        assert_eq!(outcome.headline_class, Some(FindingClass::Affected));
        let summary = outcome.summary.unwrap();
        assert!(summary.starts_with("A het variant, c.5536A>G (p.Lys1846Glu), was detected in the SCN1A gene."));
        assert!(summary.contains("clinical presentation of Dravet syndrome."));

        let stored = repository::get_patient_by_lab_number(&conn, "24IG001731").unwrap().unwrap();
        assert_eq!(stored.type_of_findings.as_deref(), Some("A"));
        assert_eq!(stored.variant_summary.as_deref(), Some(summary.as_str()));
        let findings = repository::get_variant_findings(&conn, stored.id.unwrap()).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].gene.as_deref(), Some("KCNQ2"));
    }

    #[test]
    fn review_with_explicit_lab_number() {
        let conn = open_memory_database().unwrap();
        seed_patient(&conn);
        let outcome =
            apply_variant_review(&conn, REVIEW_CSV.as_bytes(), "review.csv", Some("24ig001731"))
                .unwrap();
        assert_eq!(outcome.lab_number, "24IG001731");
    }

    #[test]
    fn review_for_unknown_patient() {
        let conn = open_memory_database().unwrap();
        let err = apply_variant_review(&conn, REVIEW_CSV.as_bytes(), "review.csv", None).unwrap_err();
        assert!(matches!(err, ImportError::PatientNotFound(ref lab) if lab == "IM662"));
    }

    #[test]
    fn review_with_invalid_lab_number() {
        let conn = open_memory_database().unwrap();
        let err =
            apply_variant_review(&conn, REVIEW_CSV.as_bytes(), "review.csv", Some("XYZ")).unwrap_err();
        assert!(matches!(err, ImportError::InvalidLabNumber(_)));
    }

    #[test]
    fn unmarked_review_clears_previous_headline() {
        let conn = open_memory_database().unwrap();
        seed_patient(&conn);
        apply_variant_review(&conn, REVIEW_CSV.as_bytes(), "IM662_review.csv", None).unwrap();

        let blank = REVIEW_CSV.replacen("\nN,", "\n,", 1).replacen("\nA,", "\n,", 1);
        let outcome =
            apply_variant_review(&conn, blank.as_bytes(), "IM662_rereview.csv", None).unwrap();
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.headline_class, None);
        assert!(outcome
            .warnings
            .contains(&format!("No rows marked in the {REPORTABLE_MARKER} column")));

        let stored = repository::get_patient_by_lab_number(&conn, "IM662").unwrap().unwrap();
        assert_eq!(stored.type_of_findings, None);
        assert_eq!(stored.variant_summary, None);
        assert!(repository::get_variant_findings(&conn, stored.id.unwrap())
            .unwrap()
            .is_empty());
        assert_eq!(repository::patient_stats(&conn).unwrap().with_findings, 0);
    }

    #[test]
    fn legacy_lab_number_resolves_only_when_stored() {
        let conn = open_memory_database().unwrap();
        import(&conn, "Lab. no.,Patient name\nlegacy 42,Old Record\n", DuplicatePolicy::Skip);

        assert_eq!(resolve_lab_number(&conn, " legacy42 ").unwrap(), "LEGACY42");
        assert_eq!(resolve_lab_number(&conn, "im662").unwrap(), "IM662");
        assert!(matches!(
            resolve_lab_number(&conn, "LEGACY43").unwrap_err(),
            ImportError::InvalidLabNumber(ref raw) if raw == "LEGACY43"
        ));
    }

    #[test]
    fn review_without_marker_column() {
        let conn = open_memory_database().unwrap();
        seed_patient(&conn);
        let csv = "Gene Names,Zygosity,Title\nSCN1A,Het,Dravet\n";
        let err = apply_variant_review(&conn, csv.as_bytes(), "raw.csv", Some("IM662")).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumns(_)));
    }
}
