//! HTTP API.
//!
//! JSON endpoints for the registry, multipart endpoints for spreadsheet
//! ingestion and template annotation, and a PDF download for reports.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{run_server, ServerError};
pub use types::ApiContext;
