//! Shared application state for the CLI and the HTTP server.
//!
//! SQLite connections are opened per operation. Writes (imports, deletes,
//! review application) are serialized through `write_lock` so concurrent
//! requests never race on the same keys.

use std::sync::{Mutex, MutexGuard};

use crate::config::Settings;
use crate::db::{self, DatabaseError};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct CoreState {
    pub settings: Settings,
    write_lock: Mutex<()>,
}

impl CoreState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a connection to the configured database, creating the parent
    /// directory and applying migrations on first use.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        if let Some(parent) = self.settings.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        db::sqlite::open_database(&self.settings.db_path).map_err(CoreError::Database)
    }

    /// Hold for the duration of any write.
    pub fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, CoreError> {
        self.write_lock.lock().map_err(|_| CoreError::LockPoisoned)
    }
}

/// Settings rooted in a scratch directory.
#[cfg(test)]
pub(crate) fn test_settings(dir: &std::path::Path) -> Settings {
    Settings {
        db_path: dir.join("data").join("genereport.db"),
        reports_dir: dir.join("reports"),
        bind: std::net::SocketAddr::from(([127, 0, 0, 1], 0)),
        duplicate_policy: crate::models::enums::DuplicatePolicy::Skip,
    }
}
