use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::enums::DuplicatePolicy;

/// Application-level constants
pub const APP_NAME: &str = "GeneReport";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

pub const ENV_DB: &str = "GENEREPORT_DB";
pub const ENV_REPORTS_DIR: &str = "GENEREPORT_REPORTS_DIR";
pub const ENV_BIND: &str = "GENEREPORT_BIND";
pub const ENV_DUPLICATE_POLICY: &str = "GENEREPORT_DUPLICATE_POLICY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid bind address in {var}: {value}")]
    InvalidBind { var: &'static str, value: String },

    #[error("Invalid duplicate policy in {var}: {value} (expected skip, update or fail)")]
    InvalidPolicy { var: &'static str, value: String },
}

/// Get the application data directory
/// ~/GeneReport/, or ./GeneReport when no home directory is known
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database file
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("genereport.db")
}

/// Default directory for saved PDF reports
pub fn default_reports_dir() -> PathBuf {
    app_data_dir().join("reports")
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "genereport=info,tower_http=info"
}

/// Runtime settings resolved from the environment. CLI flags override
/// individual fields after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub reports_dir: PathBuf,
    pub bind: SocketAddr,
    pub duplicate_policy: DuplicatePolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = SocketAddr::from_str(bind_raw.trim()).map_err(|_| ConfigError::InvalidBind {
            var: ENV_BIND,
            value: bind_raw.clone(),
        })?;

        let duplicate_policy = match get(ENV_DUPLICATE_POLICY) {
            Some(raw) => DuplicatePolicy::from_str(&raw.trim().to_ascii_lowercase()).map_err(|_| {
                ConfigError::InvalidPolicy {
                    var: ENV_DUPLICATE_POLICY,
                    value: raw.clone(),
                }
            })?,
            None => DuplicatePolicy::default(),
        };

        Ok(Self {
            db_path: get(ENV_DB).map(PathBuf::from).unwrap_or_else(default_db_path),
            reports_dir: get(ENV_REPORTS_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_reports_dir),
            bind,
            duplicate_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with("GeneReport"));
    }

    #[test]
    fn defaults_live_under_app_data() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert!(settings.db_path.starts_with(app_data_dir()));
        assert!(settings.reports_dir.ends_with("reports"));
        assert_eq!(settings.bind.port(), 8080);
        assert_eq!(settings.duplicate_policy, DuplicatePolicy::Skip);
    }

    #[test]
    fn env_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (ENV_DB, "/tmp/lab.db"),
            (ENV_REPORTS_DIR, "/tmp/out"),
            (ENV_BIND, "0.0.0.0:9000"),
            (ENV_DUPLICATE_POLICY, "Update"),
        ]))
        .unwrap();
        assert_eq!(settings.db_path, PathBuf::from("/tmp/lab.db"));
        assert_eq!(settings.reports_dir, PathBuf::from("/tmp/out"));
        assert_eq!(settings.bind.port(), 9000);
        assert_eq!(settings.duplicate_policy, DuplicatePolicy::Update);
    }

    #[test]
    fn blank_values_fall_back() {
        let settings = Settings::from_lookup(lookup(&[(ENV_DB, "  ")])).unwrap();
        assert_eq!(settings.db_path, default_db_path());
    }

    #[test]
    fn bad_values_rejected() {
        let err = Settings::from_lookup(lookup(&[(ENV_BIND, "localhost")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBind { .. }));

        let err = Settings::from_lookup(lookup(&[(ENV_DUPLICATE_POLICY, "merge")])).unwrap_err();
        assert!(err.to_string().contains("merge"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
