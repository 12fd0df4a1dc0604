//! Shared types for the HTTP layer.

use std::sync::Arc;

use axum::extract::Multipart;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::core_state::CoreState;

/// Default and maximum page sizes for list endpoints.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// `?limit=&offset=` query for paginated lists.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Pagination {
    /// Clamped `(limit, offset)`.
    pub fn resolve(&self) -> (u32, u32) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        (limit, self.offset.unwrap_or(0))
    }
}

/// The `file` part of a multipart upload.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Pull the `file` field out of a multipart body. Other fields are ignored.
pub async fn read_upload_field(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content = field.bytes().await?.to_vec();
        if content.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".into()));
        }
        return Ok(UploadedFile { file_name, content });
    }
    Err(ApiError::BadRequest("Missing multipart field 'file'".into()))
}
