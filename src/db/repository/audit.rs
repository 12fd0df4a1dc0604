use std::str::FromStr;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::timestamp_from_sql;
use crate::db::DatabaseError;
use crate::models::enums::{ImportKind, TemplateKind};

/// One ingestion recorded in `import_audit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportAuditEntry {
    pub kind: ImportKind,
    pub file_name: String,
    pub content_hash: String,
    pub template_kind: Option<TemplateKind>,
    pub total_rows: i64,
    pub inserted: i64,
    pub updated: i64,
    pub duplicates: i64,
    pub failed: i64,
    #[serde(default)]
    pub imported_at: Option<chrono::NaiveDateTime>,
}

pub fn insert_import_audit(conn: &Connection, entry: &ImportAuditEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO import_audit (kind, file_name, content_hash, template_kind,
         total_rows, inserted, updated, duplicates, failed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.kind.as_str(),
            entry.file_name,
            entry.content_hash,
            entry.template_kind.map(|k| k.as_str()),
            entry.total_rows,
            entry.inserted,
            entry.updated,
            entry.duplicates,
            entry.failed,
        ],
    )?;
    Ok(())
}

/// Whether a file with this content hash was ingested before.
pub fn content_hash_seen(conn: &Connection, content_hash: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM import_audit WHERE content_hash = ?1",
        params![content_hash],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn recent_imports(conn: &Connection, limit: u32) -> Result<Vec<ImportAuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT kind, file_name, content_hash, template_kind, total_rows, inserted,
         updated, duplicates, failed, imported_at
         FROM import_audit ORDER BY imported_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                [
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                ],
                row.get::<_, Option<String>>(9)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(kind, file_name, content_hash, template, counts, imported_at)| {
            let [total_rows, inserted, updated, duplicates, failed] = counts;
            Ok(ImportAuditEntry {
                kind: ImportKind::from_str(&kind)?,
                file_name,
                content_hash,
                template_kind: template.as_deref().map(TemplateKind::from_str).transpose()?,
                total_rows,
                inserted,
                updated,
                duplicates,
                failed,
                imported_at: timestamp_from_sql(imported_at),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn entry(hash: &str) -> ImportAuditEntry {
        ImportAuditEntry {
            kind: ImportKind::PatientList,
            file_name: "patients.xlsx".into(),
            content_hash: hash.into(),
            template_kind: None,
            total_rows: 10,
            inserted: 8,
            updated: 0,
            duplicates: 1,
            failed: 1,
            imported_at: None,
        }
    }

    #[test]
    fn audit_round_trip_and_hash_lookup() {
        let conn = open_memory_database().unwrap();
        assert!(!content_hash_seen(&conn, "abc").unwrap());

        insert_import_audit(&conn, &entry("abc")).unwrap();
        let mut review = entry("def");
        review.kind = ImportKind::VariantReview;
        review.template_kind = Some(TemplateKind::Trio);
        insert_import_audit(&conn, &review).unwrap();

        assert!(content_hash_seen(&conn, "abc").unwrap());
        let recent = recent_imports(&conn, 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, ImportKind::VariantReview);
        assert_eq!(recent[0].template_kind, Some(TemplateKind::Trio));
        assert_eq!(recent[1].inserted, 8);
        assert!(recent[1].imported_at.is_some());
    }
}
