//! Repository layer: entity-scoped database operations.
//!
//! Functions take a borrowed `Connection` so callers can pass either a plain
//! connection or an open `Transaction`.

mod audit;
mod patient;
mod variant;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::ErrorCode;

use super::DatabaseError;

pub use audit::*;
pub use patient::*;
pub use variant::*;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

pub(crate) fn date_from_sql(value: Option<String>) -> Option<NaiveDate> {
    value.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok())
}

pub(crate) fn timestamp_from_sql(value: Option<String>) -> Option<NaiveDateTime> {
    value.and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok())
}

/// Map a UNIQUE violation to `Duplicate`, a CHECK violation to
/// `ConstraintViolation`, and pass everything else through.
pub(crate) fn classify_constraint(err: rusqlite::Error, key: &str) -> DatabaseError {
    if let rusqlite::Error::SqliteFailure(ref failure, ref message) = err {
        if failure.code == ErrorCode::ConstraintViolation {
            return match failure.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    DatabaseError::Duplicate { key: key.to_string() }
                }
                _ => DatabaseError::ConstraintViolation(
                    message.clone().unwrap_or_else(|| failure.to_string()),
                ),
            };
        }
    }
    DatabaseError::Sqlite(err)
}
