use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "ledgerline", about = "Personal transaction ledger", version)]
struct Cli {
    /// Path to the database file. Defaults to the platform data directory.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a bank statement CSV into the ledger.
    Import {
        file: PathBuf,
    },
    /// Bulk-import rule files.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Exchange a one-time setup token for a bank feed access URL.
    Claim {
        token: String,
    },
    /// Pull recent transactions from the bank feed into staging.
    Sync {
        /// Days of history to request.
        #[arg(long, default_value_t = 30)]
        lookback: u64,
    },
    /// Inspect and resolve staged transactions.
    Staged {
        #[command(subcommand)]
        command: StagedCommands,
    },
    /// List ledger transactions.
    List {
        #[arg(long)]
        start: Option<chrono::NaiveDate>,
        #[arg(long)]
        end: Option<chrono::NaiveDate>,
        /// Include rows hidden by exclusion rules.
        #[arg(long)]
        include_excluded: bool,
    },
    /// Re-run the current rule set over every stored transaction.
    ReapplyRules,
}

#[derive(Subcommand)]
enum RulesCommands {
    Merchants {
        file: PathBuf,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        dry_run: bool,
    },
    Categories {
        file: PathBuf,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        dry_run: bool,
    },
    Taxonomy {
        file: PathBuf,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        dry_run: bool,
    },
    Exclusions {
        file: PathBuf,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum StagedCommands {
    List,
    Approve {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    Reject {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "ledgerline", "Ledgerline")
        .context("could not determine a data directory")?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    Ok(data_dir.join("ledger.db"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let pool = ledgerline_storage::create_db(&db_path)
        .await
        .with_context(|| format!("opening database at {}", db_path.display()))?;

    match cli.command {
        Commands::Import { file } => commands::import(&pool, &file).await,
        Commands::Rules { command } => match command {
            RulesCommands::Merchants { file, replace, dry_run } => {
                commands::import_merchants(&pool, &file, replace, dry_run).await
            }
            RulesCommands::Categories { file, replace, dry_run } => {
                commands::import_categories(&pool, &file, replace, dry_run).await
            }
            RulesCommands::Taxonomy { file, replace, dry_run } => {
                commands::import_taxonomy(&pool, &file, replace, dry_run).await
            }
            RulesCommands::Exclusions { file, replace, dry_run } => {
                commands::import_exclusions(&pool, &file, replace, dry_run).await
            }
        },
        Commands::Claim { token } => commands::claim(&pool, &token).await,
        Commands::Sync { lookback } => commands::sync(&pool, lookback).await,
        Commands::Staged { command } => match command {
            StagedCommands::List => commands::staged_list(&pool).await,
            StagedCommands::Approve { ids } => commands::approve(&pool, &ids).await,
            StagedCommands::Reject { ids } => commands::reject(&pool, &ids).await,
        },
        Commands::List { start, end, include_excluded } => {
            commands::list(&pool, start, end, include_excluded).await
        }
        Commands::ReapplyRules => commands::reapply_rules(&pool).await,
    }
}
