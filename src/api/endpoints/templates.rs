//! Review-template annotation endpoint.

use axum::extract::Multipart;
use axum::http::HeaderValue;
use axum::response::Response;

use super::attachment;
use crate::api::error::ApiError;
use crate::api::types::read_upload_field;
use crate::pipeline::import::sanitize_filename;
use crate::pipeline::normalize::annotate_template;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// `POST /api/templates/annotate`: returns the annotated workbook.
///
/// The detected template kind is echoed in `X-Template-Kind`.
pub async fn annotate(multipart: Multipart) -> Result<Response, ApiError> {
    let upload = read_upload_field(multipart).await?;
    let file_name = sanitize_filename(&upload.file_name);
    let annotated = annotate_template(&upload.content, &file_name)?;

    let mut response = attachment(&annotated.file_name, XLSX_MIME, annotated.workbook)?;
    let headers = response.headers_mut();
    headers.insert("x-template-kind", HeaderValue::from_static(annotated.kind.as_str()));
    headers.insert(
        "x-already-annotated",
        HeaderValue::from_static(if annotated.already_annotated { "true" } else { "false" }),
    );
    Ok(response)
}
