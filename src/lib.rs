pub mod api; // HTTP API
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod pipeline; // Spreadsheet ingestion + normalization
pub mod report; // PDF patient reports

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// filter. Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
