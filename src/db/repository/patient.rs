use rusqlite::{params, Connection, OptionalExtension};

use super::{classify_constraint, date_from_sql, date_to_sql, timestamp_from_sql};
use crate::db::DatabaseError;
use crate::models::enums::FindingClass;
use crate::models::{PatientRecord, PatientStats};

const PATIENT_COLUMNS: &str = "id, report_date, lab_number, im_lab_number, name, hkid, dob,
     sex, age, ethnicity, specimen_collected, specimen_arrived, case_history,
     type_of_test, type_of_findings, variant_summary, created_at, updated_at";

pub fn insert_patient(conn: &Connection, patient: &PatientRecord) -> Result<i64, DatabaseError> {
    let key = patient.primary_key().unwrap_or_default().to_string();
    conn.execute(
        "INSERT INTO patients (report_date, lab_number, im_lab_number, name, hkid, dob,
         sex, age, ethnicity, specimen_collected, specimen_arrived, case_history,
         type_of_test, type_of_findings, variant_summary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            date_to_sql(patient.report_date),
            patient.lab_number,
            patient.im_lab_number,
            patient.name,
            patient.hkid,
            date_to_sql(patient.dob),
            patient.sex,
            patient.age,
            patient.ethnicity,
            date_to_sql(patient.specimen_collected),
            date_to_sql(patient.specimen_arrived),
            patient.case_history,
            patient.type_of_test,
            patient.type_of_findings,
            patient.variant_summary,
        ],
    )
    .map_err(|e| classify_constraint(e, &key))?;
    Ok(conn.last_insert_rowid())
}

/// Id of the row holding either of the given keys, lab number match first.
pub fn find_patient_id(
    conn: &Connection,
    lab_number: Option<&str>,
    im_lab_number: Option<&str>,
) -> Result<Option<i64>, DatabaseError> {
    if let Some(lab) = lab_number {
        let id = conn
            .query_row(
                "SELECT id FROM patients WHERE lab_number = ?1",
                params![lab],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if id.is_some() {
            return Ok(id);
        }
    }
    if let Some(im) = im_lab_number {
        let id = conn
            .query_row(
                "SELECT id FROM patients WHERE im_lab_number = ?1",
                params![im],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        return Ok(id);
    }
    Ok(None)
}

/// Overwrite the stored row with every non-null incoming field.
pub fn merge_patient(
    conn: &Connection,
    id: i64,
    patient: &PatientRecord,
) -> Result<(), DatabaseError> {
    let key = patient.primary_key().unwrap_or_default().to_string();
    let changed = conn
        .execute(
            "UPDATE patients SET
             report_date = COALESCE(?2, report_date),
             lab_number = COALESCE(?3, lab_number),
             im_lab_number = COALESCE(?4, im_lab_number),
             name = COALESCE(?5, name),
             hkid = COALESCE(?6, hkid),
             dob = COALESCE(?7, dob),
             sex = COALESCE(?8, sex),
             age = COALESCE(?9, age),
             ethnicity = COALESCE(?10, ethnicity),
             specimen_collected = COALESCE(?11, specimen_collected),
             specimen_arrived = COALESCE(?12, specimen_arrived),
             case_history = COALESCE(?13, case_history),
             type_of_test = COALESCE(?14, type_of_test),
             type_of_findings = COALESCE(?15, type_of_findings),
             variant_summary = COALESCE(?16, variant_summary),
             updated_at = datetime('now')
             WHERE id = ?1",
            params![
                id,
                date_to_sql(patient.report_date),
                patient.lab_number,
                patient.im_lab_number,
                patient.name,
                patient.hkid,
                date_to_sql(patient.dob),
                patient.sex,
                patient.age,
                patient.ethnicity,
                date_to_sql(patient.specimen_collected),
                date_to_sql(patient.specimen_arrived),
                patient.case_history,
                patient.type_of_test,
                patient.type_of_findings,
                patient.variant_summary,
            ],
        )
        .map_err(|e| classify_constraint(e, &key))?;
    if changed == 0 {
        return Err(DatabaseError::patient_not_found(&id.to_string()));
    }
    Ok(())
}

/// Insert the record, or merge it into the row that already holds one of its
/// keys. Returns the row id and whether a new row was created.
pub fn upsert_patient(
    conn: &Connection,
    patient: &PatientRecord,
) -> Result<(i64, bool), DatabaseError> {
    match find_patient_id(
        conn,
        patient.lab_number.as_deref(),
        patient.im_lab_number.as_deref(),
    )? {
        Some(id) => {
            merge_patient(conn, id, patient)?;
            Ok((id, false))
        }
        None => Ok((insert_patient(conn, patient)?, true)),
    }
}

pub fn get_patient(conn: &Connection, id: i64) -> Result<Option<PatientRecord>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], patient_row_from_rusqlite)
        .optional()?;
    Ok(row.map(patient_from_row))
}

/// Look up a patient by either accession number.
pub fn get_patient_by_lab_number(
    conn: &Connection,
    key: &str,
) -> Result<Option<PatientRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE lab_number = ?1 OR im_lab_number = ?1
         ORDER BY id ASC LIMIT 1"
    );
    let row = conn
        .query_row(&sql, params![key.trim()], patient_row_from_rusqlite)
        .optional()?;
    Ok(row.map(patient_from_row))
}

pub fn list_patients(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<PatientRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit, offset], patient_row_from_rusqlite)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?));
    }
    Ok(patients)
}

pub fn count_patients(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
    Ok(count)
}

pub fn patient_stats(conn: &Connection) -> Result<PatientStats, DatabaseError> {
    let stats = conn.query_row(
        "SELECT COUNT(*),
                COUNT(DISTINCT lab_number),
                COUNT(DISTINCT im_lab_number),
                COUNT(variant_summary)
         FROM patients",
        [],
        |row| {
            Ok(PatientStats {
                total: row.get(0)?,
                unique_lab_numbers: row.get(1)?,
                unique_im_lab_numbers: row.get(2)?,
                with_findings: row.get(3)?,
            })
        },
    )?;
    Ok(stats)
}

/// Record the headline finding class and generated summary on a patient.
pub fn update_findings(
    conn: &Connection,
    key: &str,
    class: FindingClass,
    summary: &str,
) -> Result<(), DatabaseError> {
    set_findings(conn, key, Some(class.as_str()), Some(summary))
}

/// Drop the headline class and summary, for a review with nothing reportable.
pub fn clear_findings(conn: &Connection, key: &str) -> Result<(), DatabaseError> {
    set_findings(conn, key, None, None)
}

fn set_findings(
    conn: &Connection,
    key: &str,
    class: Option<&str>,
    summary: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET type_of_findings = ?2, variant_summary = ?3,
         updated_at = datetime('now')
         WHERE id = (SELECT id FROM patients
                     WHERE lab_number = ?1 OR im_lab_number = ?1
                     ORDER BY id ASC LIMIT 1)",
        params![key.trim(), class, summary],
    )?;
    if changed == 0 {
        return Err(DatabaseError::patient_not_found(key));
    }
    Ok(())
}

/// Operator deletion. Variant findings go with the patient via ON DELETE CASCADE.
pub fn delete_patient(conn: &Connection, key: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM patients WHERE id = (SELECT id FROM patients
         WHERE lab_number = ?1 OR im_lab_number = ?1 ORDER BY id ASC LIMIT 1)",
        params![key.trim()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::patient_not_found(key));
    }
    tracing::info!(lab_number = %key, "Patient deleted");
    Ok(())
}

// Internal row type for PatientRecord mapping
struct PatientRow {
    id: i64,
    report_date: Option<String>,
    lab_number: Option<String>,
    im_lab_number: Option<String>,
    name: Option<String>,
    hkid: Option<String>,
    dob: Option<String>,
    sex: Option<String>,
    age: Option<String>,
    ethnicity: Option<String>,
    specimen_collected: Option<String>,
    specimen_arrived: Option<String>,
    case_history: Option<String>,
    type_of_test: Option<String>,
    type_of_findings: Option<String>,
    variant_summary: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

fn patient_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PatientRow, rusqlite::Error> {
    Ok(PatientRow {
        id: row.get(0)?,
        report_date: row.get(1)?,
        lab_number: row.get(2)?,
        im_lab_number: row.get(3)?,
        name: row.get(4)?,
        hkid: row.get(5)?,
        dob: row.get(6)?,
        sex: row.get(7)?,
        age: row.get(8)?,
        ethnicity: row.get(9)?,
        specimen_collected: row.get(10)?,
        specimen_arrived: row.get(11)?,
        case_history: row.get(12)?,
        type_of_test: row.get(13)?,
        type_of_findings: row.get(14)?,
        variant_summary: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn patient_from_row(row: PatientRow) -> PatientRecord {
    PatientRecord {
        id: Some(row.id),
        report_date: date_from_sql(row.report_date),
        lab_number: row.lab_number,
        im_lab_number: row.im_lab_number,
        name: row.name,
        hkid: row.hkid,
        dob: date_from_sql(row.dob),
        sex: row.sex,
        age: row.age,
        ethnicity: row.ethnicity,
        specimen_collected: date_from_sql(row.specimen_collected),
        specimen_arrived: date_from_sql(row.specimen_arrived),
        case_history: row.case_history,
        type_of_test: row.type_of_test,
        type_of_findings: row.type_of_findings,
        variant_summary: row.variant_summary,
        created_at: timestamp_from_sql(row.created_at),
        updated_at: timestamp_from_sql(row.updated_at),
    }
}
