//! Patient registry endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::lab_number_param;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Pagination};
use crate::db::repository::{
    count_patients, delete_patient, get_patient, get_patient_by_lab_number, get_variant_findings,
    insert_patient, list_patients, patient_stats, recent_imports, ImportAuditEntry,
};
use crate::models::{PatientRecord, PatientStats, VariantFinding};
use crate::pipeline::normalize::canonical_key;

const RECENT_IMPORTS: u32 = 10;

#[derive(Serialize)]
pub struct PatientList {
    pub patients: Vec<PatientRecord>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Serialize)]
pub struct PatientDetail {
    pub patient: PatientRecord,
    pub findings: Vec<VariantFinding>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub patients: PatientStats,
    pub recent_imports: Vec<ImportAuditEntry>,
}

/// `GET /api/patients?limit&offset`: newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(page): Query<Pagination>,
) -> Result<Json<PatientList>, ApiError> {
    let (limit, offset) = page.resolve();
    let conn = ctx.core.open_db()?;

    Ok(Json(PatientList {
        patients: list_patients(&conn, limit, offset)?,
        total: count_patients(&conn)?,
        limit,
        offset,
    }))
}

/// `POST /api/patients`: add a single record. Keys are stored in the same
/// canonical form the importer uses.
pub async fn create(
    State(ctx): State<ApiContext>,
    Json(mut record): Json<PatientRecord>,
) -> Result<(StatusCode, Json<PatientRecord>), ApiError> {
    record.id = None;
    record.created_at = None;
    record.updated_at = None;
    for key in [&mut record.lab_number, &mut record.im_lab_number] {
        *key = key.take().and_then(|k| canonical_key(&k));
    }
    if !record.has_key() {
        return Err(ApiError::BadRequest(
            "Either lab_number or im_lab_number is required".into(),
        ));
    }

    let _guard = ctx.core.lock_writes()?;
    let conn = ctx.core.open_db()?;
    let id = insert_patient(&conn, &record)?;
    let stored = get_patient(&conn, id)?
        .ok_or_else(|| ApiError::Internal(format!("patient {id} vanished after insert")))?;

    tracing::info!(lab_number = ?stored.primary_key(), "Patient added via API");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// `GET /api/patients/:lab`: record plus stored findings.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(lab): Path<String>,
) -> Result<Json<PatientDetail>, ApiError> {
    let conn = ctx.core.open_db()?;
    let lab = lab_number_param(&conn, &lab)?;
    let patient = get_patient_by_lab_number(&conn, &lab)?
        .ok_or_else(|| ApiError::NotFound(format!("Patient not found: {lab}")))?;
    let findings = match patient.id {
        Some(id) => get_variant_findings(&conn, id)?,
        None => Vec::new(),
    };

    Ok(Json(PatientDetail { patient, findings }))
}

/// `DELETE /api/patients/:lab`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(lab): Path<String>,
) -> Result<StatusCode, ApiError> {
    let _guard = ctx.core.lock_writes()?;
    let conn = ctx.core.open_db()?;
    let lab = lab_number_param(&conn, &lab)?;
    delete_patient(&conn, &lab)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/stats`
pub async fn stats(State(ctx): State<ApiContext>) -> Result<Json<StatsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(StatsResponse {
        patients: patient_stats(&conn)?,
        recent_imports: recent_imports(&conn, RECENT_IMPORTS)?,
    }))
}
