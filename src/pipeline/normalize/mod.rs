//! Spreadsheet-to-record normalization: column mapping, row coercion,
//! variant summaries and the review template.

pub mod columns;
pub mod row;
pub mod summary;
pub mod template;

pub use columns::*;
pub use row::*;
pub use summary::*;
pub use template::*;
