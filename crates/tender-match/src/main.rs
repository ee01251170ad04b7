//! # Tender Match CLI (`tm`)
//!
//! ## Usage
//!
//! ```bash
//! tm --config ./config/tm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tm init` | Create the SQLite database and run schema migrations |
//! | `tm tender import <json>` | Upsert tender records from a JSON array |
//! | `tm tender attach <id> <file>` | Convert and index a tender document |
//! | `tm profile create <name>` | Create an empty profile |
//! | `tm profile add <id> <file>...` | Upload documents and build the profile embedding |
//! | `tm profile show <id>` | Print a profile's status and documents |
//! | `tm index <tenders\|profiles>` | Index documents that are not indexed yet |
//! | `tm rebuild <tenders\|profiles>` | Clear a collection and re-index everything |
//! | `tm search <profile_id>` | Rank tenders for a profile |
//! | `tm match <file>` | Rank tenders for a single document |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tender_match::progress::ProgressMode;
use tender_match::search::SearchOptions;
use tender_match::{config, ingest, migrate, search, tenders};
use tender_match_core::models::DocType;
use tender_match_core::search::SearchFilters;

/// Tender Match CLI: match company profiles against government tenders.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tm.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tm",
    about = "Tender Match: semantic matching of company profiles against tender documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tm.toml")]
    config: PathBuf,

    /// Log pipeline activity at info level. `RUST_LOG` takes precedence.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Progress output on stderr: `off`, `human`, or `json`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Manage tender records and documents.
    Tender {
        #[command(subcommand)]
        action: TenderAction,
    },

    /// Manage company profiles.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Index documents that have not been indexed yet.
    ///
    /// Failures are recorded on the document and the run continues.
    Index {
        /// `tenders` or `profiles`.
        doc_type: String,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Clear a collection and re-index every document of that type.
    ///
    /// Use after changing the embedding model or chunking settings.
    Rebuild {
        /// `tenders` or `profiles`.
        doc_type: String,
    },

    /// Rank tenders for a stored profile.
    Search {
        /// Profile id.
        profile_id: String,

        #[command(flatten)]
        args: SearchArgs,
    },

    /// Rank tenders for a single document without creating a profile.
    Match {
        /// PDF or text file describing the company.
        file: PathBuf,

        #[command(flatten)]
        args: SearchArgs,
    },
}

#[derive(Subcommand)]
enum TenderAction {
    /// Upsert tender records from a JSON array file.
    Import {
        /// JSON file: `[{"id": "...", "title": "...", ...}]`.
        file: PathBuf,
    },
    /// Convert a tender document, link it to a tender record, and index it.
    Attach {
        tender_id: String,
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Create an empty profile and print its id.
    Create { name: String },
    /// Upload documents to a profile and rebuild its embedding.
    Add {
        profile_id: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show a profile's status and documents.
    Show {
        profile_id: String,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct SearchArgs {
    /// Free-text query blended with the profile embedding.
    #[arg(long, short)]
    query: Option<String>,

    /// Case-insensitive substring filter on tender location.
    #[arg(long)]
    location: Option<String>,

    /// Case-insensitive substring filter on tender department.
    #[arg(long)]
    dept: Option<String>,

    /// Case-insensitive substring filter on tender deadline.
    #[arg(long)]
    deadline: Option<String>,

    /// Number of results (defaults to `retrieval.top_k`).
    #[arg(long)]
    top_k: Option<usize>,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

impl SearchArgs {
    fn into_options(self) -> SearchOptions {
        SearchOptions {
            query: self.query,
            filters: SearchFilters {
                location: self.location,
                dept: self.dept,
                deadline: self.deadline,
            },
            top_k: self.top_k,
            json: self.json,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let progress_mode = match cli.progress.as_deref() {
        Some(value) => ProgressMode::parse(value)?,
        None => ProgressMode::default_for_tty(),
    };
    let reporter = progress_mode.reporter();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Tender { action } => match action {
            TenderAction::Import { file } => {
                tenders::run_tender_import(&cfg, &file).await?;
            }
            TenderAction::Attach { tender_id, file } => {
                ingest::run_tender_attach(&cfg, &tender_id, &file, reporter.as_ref()).await?;
            }
        },
        Commands::Profile { action } => match action {
            ProfileAction::Create { name } => {
                ingest::run_profile_create(&cfg, &name).await?;
            }
            ProfileAction::Add { profile_id, files } => {
                ingest::run_profile_add(&cfg, &profile_id, &files, reporter.as_ref()).await?;
            }
            ProfileAction::Show { profile_id, json } => {
                ingest::run_profile_show(&cfg, &profile_id, json).await?;
            }
        },
        Commands::Index { doc_type, limit } => {
            let doc_type: DocType = doc_type.parse()?;
            ingest::run_index(&cfg, doc_type, limit, reporter.as_ref()).await?;
        }
        Commands::Rebuild { doc_type } => {
            let doc_type: DocType = doc_type.parse()?;
            ingest::run_rebuild(&cfg, doc_type, reporter.as_ref()).await?;
        }
        Commands::Search { profile_id, args } => {
            search::run_search(&cfg, &profile_id, &args.into_options()).await?;
        }
        Commands::Match { file, args } => {
            search::run_match(&cfg, &file, &args.into_options(), reporter.as_ref()).await?;
        }
    }

    Ok(())
}
