use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::FindingClass;
use crate::models::VariantFinding;

/// Replace every stored finding of a patient with `findings`.
///
/// Opens its own transaction when the connection is in autocommit mode,
/// otherwise joins the caller's.
pub fn replace_variant_findings(
    conn: &Connection,
    patient_id: i64,
    findings: &[VariantFinding],
) -> Result<usize, DatabaseError> {
    let tx = if conn.is_autocommit() {
        Some(conn.unchecked_transaction()?)
    } else {
        None
    };

    conn.execute(
        "DELETE FROM variant_findings WHERE patient_id = ?1",
        params![patient_id],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO variant_findings (patient_id, gene, omim, hgvs_c, hgvs_p, exon,
         zygosity, inheritance, parent_origin, classification, chr_pos, ref_alt, snp_id,
         phenotype, reportable_class, summary, source_row)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )?;
    for finding in findings {
        stmt.execute(params![
            patient_id,
            finding.gene,
            finding.omim,
            finding.hgvs_c,
            finding.hgvs_p,
            finding.exon,
            finding.zygosity,
            finding.inheritance,
            finding.parent_origin,
            finding.classification,
            finding.chr_pos,
            finding.ref_alt,
            finding.snp_id,
            finding.phenotype,
            finding.reportable_class.as_str(),
            finding.summary,
            finding.source_row as i64,
        ])?;
    }
    drop(stmt);

    if let Some(tx) = tx {
        tx.commit()?;
    }
    Ok(findings.len())
}

pub fn get_variant_findings(
    conn: &Connection,
    patient_id: i64,
) -> Result<Vec<VariantFinding>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT gene, omim, hgvs_c, hgvs_p, exon, zygosity, inheritance, parent_origin,
         classification, chr_pos, ref_alt, snp_id, phenotype, reportable_class, summary,
         source_row
         FROM variant_findings WHERE patient_id = ?1 ORDER BY source_row ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![patient_id], |row| {
        Ok((
            VariantFinding {
                gene: row.get(0)?,
                omim: row.get(1)?,
                hgvs_c: row.get(2)?,
                hgvs_p: row.get(3)?,
                exon: row.get(4)?,
                zygosity: row.get(5)?,
                inheritance: row.get(6)?,
                parent_origin: row.get(7)?,
                classification: row.get(8)?,
                chr_pos: row.get(9)?,
                ref_alt: row.get(10)?,
                snp_id: row.get(11)?,
                phenotype: row.get(12)?,
                reportable_class: FindingClass::NotSignificant,
                summary: row.get(14)?,
                source_row: row.get::<_, i64>(15)? as usize,
            },
            row.get::<_, String>(13)?,
        ))
    })?;

    let mut findings = Vec::new();
    for row in rows {
        let (mut finding, class) = row?;
        finding.reportable_class = FindingClass::from_str(&class)?;
        findings.push(finding);
    }
    Ok(findings)
}
