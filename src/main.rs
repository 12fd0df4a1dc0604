// GeneReport CLI
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use genereport::config::{self, Settings};
use genereport::core_state::CoreState;
use genereport::db::repository;
use genereport::models::enums::DuplicatePolicy;
use genereport::pipeline::import::{
    apply_variant_review_file, import_patient_file, read_upload, resolve_lab_number, ImportSummary,
    ReviewOutcome,
};
use genereport::pipeline::normalize::annotate_template;
use genereport::report::{generate_report, save_report};

#[derive(Parser)]
#[command(name = "genereport")]
#[command(version)]
#[command(about = "Genetic-test spreadsheet registry and report generator", long_about = None)]
struct Cli {
    /// SQLite database file (overrides GENEREPORT_DB)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Directory for saved PDF reports (overrides GENEREPORT_REPORTS_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    reports_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides GENEREPORT_BIND)
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },

    /// Import a patient list spreadsheet
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// What to do with rows whose lab number already exists: skip, update or fail
        #[arg(long, value_parser = parse_policy)]
        policy: Option<DuplicatePolicy>,
    },

    /// Apply a curated variant review to a patient
    Review {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Patient lab number; read from the sheet title rows when omitted
        #[arg(long)]
        lab_number: Option<String>,
    },

    /// Insert the review columns into a raw variant export
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output workbook (defaults to <stem>_review.xlsx next to the input)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Render a patient's PDF report
    Report {
        lab_number: String,

        /// Output file (defaults to the reports directory)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Show one patient with stored findings
    Show { lab_number: String },

    /// Delete a patient and their findings
    Delete { lab_number: String },

    /// Registry counts and recent imports
    Stats,
}

fn parse_policy(raw: &str) -> Result<DuplicatePolicy, String> {
    DuplicatePolicy::from_str(&raw.trim().to_ascii_lowercase())
        .map_err(|_| format!("unknown policy '{raw}' (expected skip, update or fail)"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_import(summary: &ImportSummary) {
    println!(
        "{}: {} data rows (header on row {})",
        summary.file_name,
        summary.data_rows(),
        summary.header_row
    );
    println!(
        "  inserted {}, updated {}, duplicates {}, failed {}",
        summary.inserted, summary.updated, summary.duplicates, summary.failed
    );
    if summary.previously_imported {
        println!("  note: this exact file was imported before");
    }
    for issue in &summary.errors {
        println!("  row {}: {}", issue.row, issue.reason);
    }
    for warning in &summary.warnings {
        println!("  warning: {warning}");
    }
    if !summary.unmapped_columns.is_empty() {
        println!("  unmapped columns: {}", summary.unmapped_columns.join(", "));
    }
}

fn print_review(outcome: &ReviewOutcome) {
    println!(
        "{}: {} ({} template, {} rows scanned)",
        outcome.file_name,
        outcome.lab_number,
        outcome.template_kind.as_str(),
        outcome.rows_scanned
    );
    match outcome.headline_class {
        Some(class) => println!("  {} finding(s), headline {}", outcome.findings.len(), class.label()),
        None => println!("  no reportable findings"),
    }
    if let Some(summary) = &outcome.summary {
        println!("  {summary}");
    }
    for warning in &outcome.warnings {
        println!("  warning: {warning}");
    }
}

fn annotate_output(input: &Path, file_name: &str) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

#[tokio::main]
async fn main() -> Result<()> {
    genereport::init_tracing();
    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(dir) = cli.reports_dir {
        settings.reports_dir = dir;
    }
    tracing::debug!(db = %settings.db_path.display(), "{} v{}", config::APP_NAME, config::APP_VERSION);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.bind = bind;
            }
            let core = Arc::new(CoreState::new(settings));
            // Fail fast on an unusable database before accepting requests
            core.open_db().context("Failed to open database")?;
            genereport::api::run_server(core).await?;
        }

        Commands::Import { file, policy } => {
            let policy = policy.unwrap_or(settings.duplicate_policy);
            let core = CoreState::new(settings);
            let conn = core.open_db()?;
            let summary = import_patient_file(&conn, &file, policy)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            if cli.json {
                print_json(&summary)?;
            } else {
                print_import(&summary);
            }
        }

        Commands::Review { file, lab_number } => {
            let core = CoreState::new(settings);
            let conn = core.open_db()?;
            let outcome = apply_variant_review_file(&conn, &file, lab_number.as_deref())
                .with_context(|| format!("Failed to apply review {}", file.display()))?;
            if cli.json {
                print_json(&outcome)?;
            } else {
                print_review(&outcome);
            }
        }

        Commands::Annotate { file, output } => {
            let content = read_upload(&file)?;
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload");
            let annotated = annotate_template(&content, name)?;
            let target = output.unwrap_or_else(|| annotate_output(&file, &annotated.file_name));
            if target == file {
                bail!("Refusing to overwrite the input file {}", file.display());
            }
            std::fs::write(&target, &annotated.workbook)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            if cli.json {
                print_json(&annotated)?;
            } else if annotated.already_annotated {
                println!("{} already has review columns, copied to {}", name, target.display());
            } else {
                println!(
                    "{} template annotated: {}",
                    annotated.kind.as_str(),
                    target.display()
                );
            }
        }

        Commands::Report { lab_number, output } => {
            let reports_dir = settings.reports_dir.clone();
            let core = CoreState::new(settings);
            let conn = core.open_db()?;
            let lab = resolve_lab_number(&conn, &lab_number)?;
            let report = generate_report(&conn, &lab, chrono::Local::now().naive_local())?;
            let path = match output {
                Some(path) => {
                    std::fs::write(&path, &report.bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    path
                }
                None => save_report(&reports_dir, &report.file_name, &report.bytes)?,
            };
            println!("{}", path.display());
        }

        Commands::Show { lab_number } => {
            let core = CoreState::new(settings);
            let conn = core.open_db()?;
            let lab = resolve_lab_number(&conn, &lab_number)?;
            let Some(patient) = repository::get_patient_by_lab_number(&conn, &lab)? else {
                bail!("Patient not found: {lab}");
            };
            let findings = match patient.id {
                Some(id) => repository::get_variant_findings(&conn, id)?,
                None => Vec::new(),
            };
            print_json(&serde_json::json!({ "patient": patient, "findings": findings }))?;
        }

        Commands::Delete { lab_number } => {
            let core = CoreState::new(settings);
            let conn = core.open_db()?;
            let lab = resolve_lab_number(&conn, &lab_number)?;
            repository::delete_patient(&conn, &lab)?;
            println!("Deleted {lab}");
        }

        Commands::Stats => {
            let core = CoreState::new(settings);
            let conn = core.open_db()?;
            let stats = repository::patient_stats(&conn)?;
            let imports = repository::recent_imports(&conn, 10)?;
            if cli.json {
                print_json(&serde_json::json!({ "patients": stats, "recent_imports": imports }))?;
            } else {
                println!(
                    "{} patients ({} lab numbers, {} IM numbers), {} with findings",
                    stats.total,
                    stats.unique_lab_numbers,
                    stats.unique_im_lab_numbers,
                    stats.with_findings
                );
                for entry in imports {
                    println!(
                        "  {} {} ({} rows, {} inserted, {} updated)",
                        entry.imported_at.map(|t| t.to_string()).unwrap_or_default(),
                        entry.file_name,
                        entry.total_rows,
                        entry.inserted,
                        entry.updated
                    );
                }
            }
        }
    }

    Ok(())
}
