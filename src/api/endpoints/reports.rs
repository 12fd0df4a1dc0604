//! Patient report download.

use axum::extract::{Path, State};
use axum::response::Response;

use super::{attachment, lab_number_param};
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::report::{generate_report, save_report};

/// `GET /api/reports/:lab`: renders the PDF, keeps a copy under the
/// reports directory and returns it as an attachment.
pub async fn download(
    State(ctx): State<ApiContext>,
    Path(lab): Path<String>,
) -> Result<Response, ApiError> {
    let conn = ctx.core.open_db()?;
    let lab = lab_number_param(&conn, &lab)?;
    let report = generate_report(&conn, &lab, chrono::Local::now().naive_local())?;
    save_report(&ctx.core.settings.reports_dir, &report.file_name, &report.bytes)?;

    attachment(&report.file_name, "application/pdf", report.bytes)
}
