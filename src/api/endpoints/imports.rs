//! Spreadsheet ingestion endpoints.
//!
//! Both take a multipart body with a `file` field. The file type is taken
//! from its content, never from the uploaded name.

use std::str::FromStr;

use axum::extract::{Multipart, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{read_upload_field, ApiContext};
use crate::models::enums::DuplicatePolicy;
use crate::pipeline::import::{apply_variant_review, import_patient_list, ImportSummary, ReviewOutcome};

#[derive(Debug, Deserialize)]
pub struct PolicyQuery {
    pub policy: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    pub lab_number: Option<String>,
}

fn resolve_policy(raw: Option<&str>, default: DuplicatePolicy) -> Result<DuplicatePolicy, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => DuplicatePolicy::from_str(&s.to_ascii_lowercase()).map_err(|_| {
            ApiError::BadRequest(format!(
                "Unknown duplicate policy '{s}' (expected skip, update or fail)"
            ))
        }),
        None => Ok(default),
    }
}

/// `POST /api/imports/patients?policy=skip|update|fail`
pub async fn patients(
    State(ctx): State<ApiContext>,
    Query(query): Query<PolicyQuery>,
    multipart: Multipart,
) -> Result<Json<ImportSummary>, ApiError> {
    let policy = resolve_policy(query.policy.as_deref(), ctx.core.settings.duplicate_policy)?;
    let upload = read_upload_field(multipart).await?;

    let _guard = ctx.core.lock_writes()?;
    let conn = ctx.core.open_db()?;
    let summary = import_patient_list(&conn, &upload.content, &upload.file_name, policy)?;
    Ok(Json(summary))
}

/// `POST /api/imports/review?lab_number=`: the lab number falls back to
/// the one printed in the sheet's title rows.
pub async fn review(
    State(ctx): State<ApiContext>,
    Query(query): Query<ReviewQuery>,
    multipart: Multipart,
) -> Result<Json<ReviewOutcome>, ApiError> {
    let upload = read_upload_field(multipart).await?;
    let lab_number = query
        .lab_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let _guard = ctx.core.lock_writes()?;
    let conn = ctx.core.open_db()?;
    let outcome = apply_variant_review(&conn, &upload.content, &upload.file_name, lab_number)?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_falls_back_to_default() {
        assert_eq!(
            resolve_policy(None, DuplicatePolicy::Update).unwrap(),
            DuplicatePolicy::Update
        );
        assert_eq!(
            resolve_policy(Some(" "), DuplicatePolicy::Skip).unwrap(),
            DuplicatePolicy::Skip
        );
    }

    #[test]
    fn policy_is_case_insensitive() {
        assert_eq!(
            resolve_policy(Some("FAIL"), DuplicatePolicy::Skip).unwrap(),
            DuplicatePolicy::Fail
        );
    }

    #[test]
    fn unknown_policy_rejected() {
        assert!(matches!(
            resolve_policy(Some("merge"), DuplicatePolicy::Skip),
            Err(ApiError::BadRequest(_))
        ));
    }
}
