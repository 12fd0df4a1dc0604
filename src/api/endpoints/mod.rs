//! API endpoint handlers, one module per resource.

pub mod health;
pub mod imports;
pub mod patients;
pub mod reports;
pub mod templates;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use rusqlite::Connection;

use crate::api::error::ApiError;
use crate::pipeline::import::resolve_lab_number;

/// Canonical lab number taken from the URL.
pub(crate) fn lab_number_param(conn: &Connection, raw: &str) -> Result<String, ApiError> {
    resolve_lab_number(conn, raw).map_err(ApiError::from)
}

/// A binary download with `Content-Disposition: attachment`.
pub(crate) fn attachment(
    file_name: &str,
    content_type: &'static str,
    bytes: Vec<u8>,
) -> Result<Response, ApiError> {
    let safe: String = file_name
        .chars()
        .filter(|c| (c.is_ascii_graphic() && *c != '"' && *c != '\\') || *c == ' ')
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .map_err(|e| ApiError::Internal(format!("Content-Disposition header: {e}")))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
