//! # statledger CLI
//!
//! ## Usage
//!
//! ```bash
//! statledger --config ./config/statledger.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `statledger init` | Create the SQLite database and schema |
//! | `statledger server add <code>` | Register a server to ingest under |
//! | `statledger server list` | List registered servers |
//! | `statledger ingest` | Ingest a stats directory (and optional advancements) |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use statledger::config::{self, IngestOverrides};
use statledger::{ingest, logging, migrate, servers};

/// statledger — idempotent ingestion of player statistics snapshots.
#[derive(Parser)]
#[command(name = "statledger", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/statledger.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Safe to run repeatedly; existing tables and rows are left alone.
    Init,

    /// Manage the servers that snapshots are ingested under.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },

    /// Ingest player stats files as deduplicated snapshots.
    ///
    /// Each file whose stats content is new for this server and player
    /// becomes one snapshot plus its stat and advancement facts. Unchanged
    /// files are recognized and skipped.
    Ingest {
        /// Server code to ingest under (must already be registered).
        #[arg(long = "server", env = "STATLEDGER_SERVER_CODE")]
        server_code: Option<String>,

        /// Directory of `<player>.json` stats files.
        #[arg(long, env = "STATLEDGER_STATS_DIR")]
        stats_dir: Option<PathBuf>,

        /// Directory of `<player>.json` advancements files.
        #[arg(long, env = "STATLEDGER_ADV_DIR")]
        advancements_dir: Option<PathBuf>,

        /// Source label recorded on the ingest run.
        #[arg(long)]
        source: Option<String>,

        /// Free-text notes recorded on the ingest run. Defaults to the stats directory.
        #[arg(long)]
        notes: Option<String>,

        /// Parse files and report counts without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ServerAction {
    /// Register a server code.
    Add {
        code: String,
        /// Human-readable server name.
        #[arg(long)]
        name: Option<String>,
    },
    /// List registered servers.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing("statledger=info")?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Server { action } => match action {
            ServerAction::Add { code, name } => {
                servers::run_server_add(&cfg, &code, name.as_deref()).await?;
            }
            ServerAction::List => {
                servers::run_server_list(&cfg).await?;
            }
        },
        Commands::Ingest {
            server_code,
            stats_dir,
            advancements_dir,
            source,
            notes,
            dry_run,
            limit,
        } => {
            let overrides = IngestOverrides {
                server_code,
                stats_dir,
                advancements_dir,
                source,
                notes,
            };
            ingest::run_ingest(&cfg, overrides, dry_run, limit).await?;
        }
    }

    Ok(())
}
