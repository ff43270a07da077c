//! Command-line interface.
//!
//! Parses arguments, builds [`AppServices`] once, and dispatches to the
//! command modules.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::app::AppServices;
use crate::config::Settings;
use crate::quota::OperationKind;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Book metadata resolution and catalog backfill")]
#[command(version)]
pub struct Cli {
    /// Config file path (TOML)
    #[arg(short, long, global = true, env = "FOLIO_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// List registered providers and their availability
    Providers,

    /// Inspect the metered provider's daily budget
    Quota {
        #[command(subcommand)]
        command: QuotaCommands,
    },

    /// Look up book metadata
    Book {
        #[command(subcommand)]
        command: BookCommands,
    },

    /// Manage the month-by-month catalog backfill
    Backfill {
        #[command(subcommand)]
        command: BackfillCommands,
    },
}

#[derive(Subcommand)]
enum QuotaCommands {
    /// Show today's usage
    Status,
    /// Batch size the remaining budget allows
    BatchSize {
        /// Requested maximum
        #[arg(default_value = "10")]
        max: u64,
    },
    /// Check whether an operation would be admitted (reserves nothing)
    Check {
        /// Quota units the operation needs
        amount: u64,
        #[arg(long, value_enum, default_value = "single")]
        kind: OperationKind,
    },
}

#[derive(Subcommand)]
enum BookCommands {
    /// Resolve a title (and optional author) to an ISBN
    Resolve {
        title: String,
        #[arg(short, long)]
        author: Option<String>,
    },
    /// Merge metadata from every source for an ISBN
    Enrich { isbn: String },
    /// Find a cover image
    Cover { isbn: String },
    /// Find reader ratings
    Ratings { isbn: String },
    /// Decide whether a work is in the public domain
    PublicDomain {
        title: String,
        #[arg(short, long)]
        author: Option<String>,
        #[arg(long)]
        isbn: Option<String>,
        /// First publication year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Collect identifiers in other catalogs
    Ids { isbn: String },
    /// List other editions of a work
    Editions { isbn: String },
    /// Look up an author's biography
    Author { name: String },
    /// Generate notable books for a month (YYYY-MM)
    Generate {
        month: String,
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

#[derive(Subcommand)]
enum BackfillCommands {
    /// Create pending units for every month in range
    Seed {
        /// First month (YYYY-MM), defaults to the configured start
        #[arg(long)]
        from: Option<String>,
        /// Last month (YYYY-MM), defaults to the last complete month
        #[arg(long)]
        to: Option<String>,
    },
    /// List claimable units
    Candidates {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Claim and process a batch of units
    Run {
        /// Units to claim (default: configured batch size scaled by quota)
        #[arg(short, long)]
        limit: Option<u64>,
        /// Only report which units would be claimed
        #[arg(long)]
        dry_run: bool,
        /// Run continuously
        #[arg(long)]
        daemon: bool,
        /// Seconds to wait between batches in daemon mode
        #[arg(long, default_value = "300")]
        interval: u64,
    },
    /// Show aggregate progress
    Status,
    /// Return units stuck in processing to retry
    Reclaim,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let services = AppServices::build(settings).await?;
    let json = cli.json;

    match cli.command {
        Commands::Providers => commands::providers::cmd_providers(&services, json).await,
        Commands::Quota { command } => match command {
            QuotaCommands::Status => commands::quota::cmd_status(&services, json).await,
            QuotaCommands::BatchSize { max } => {
                commands::quota::cmd_batch_size(&services, max, json).await
            }
            QuotaCommands::Check { amount, kind } => {
                commands::quota::cmd_check(&services, kind, amount, json).await
            }
        },
        Commands::Book { command } => {
            use commands::book;
            match command {
                BookCommands::Resolve { title, author } => {
                    book::cmd_resolve(&services, title, author, json).await
                }
                BookCommands::Enrich { isbn } => book::cmd_enrich(&services, &isbn, json).await,
                BookCommands::Cover { isbn } => book::cmd_cover(&services, &isbn, json).await,
                BookCommands::Ratings { isbn } => book::cmd_ratings(&services, &isbn, json).await,
                BookCommands::PublicDomain {
                    title,
                    author,
                    isbn,
                    year,
                } => book::cmd_public_domain(&services, title, author, isbn, year, json).await,
                BookCommands::Ids { isbn } => book::cmd_ids(&services, &isbn, json).await,
                BookCommands::Editions { isbn } => {
                    book::cmd_editions(&services, &isbn, json).await
                }
                BookCommands::Author { name } => book::cmd_author(&services, &name, json).await,
                BookCommands::Generate { month, count } => {
                    book::cmd_generate(&services, &month, count, json).await
                }
            }
        }
        Commands::Backfill { command } => {
            use commands::backfill;
            match command {
                BackfillCommands::Seed { from, to } => {
                    backfill::cmd_seed(&services, from, to, json).await
                }
                BackfillCommands::Candidates { limit } => {
                    backfill::cmd_candidates(&services, limit, json).await
                }
                BackfillCommands::Run {
                    limit,
                    dry_run,
                    daemon,
                    interval,
                } => backfill::cmd_run(&services, limit, dry_run, daemon, interval, json).await,
                BackfillCommands::Status => backfill::cmd_status(&services, json).await,
                BackfillCommands::Reclaim => backfill::cmd_reclaim(&services, json).await,
            }
        }
    }
}
