pub mod categorize;
pub mod category;
pub mod import;
pub mod init;
pub mod report;
pub mod status;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{get_connection, init_db};
use crate::error::{BudgetError, Result};
use crate::settings::load_settings;

#[derive(Parser)]
#[command(
    name = "budget",
    about = "Import bank statement exports, categorize expenses, and see where the money goes."
)]
pub struct Cli {
    /// Database file to use instead of the one in the configured data directory
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and create the database.
    Init {
        /// Path for budget data (default: ~/Documents/budget-builder)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import a semicolon-delimited bank statement CSV.
    Import {
        /// Path to the CSV export
        file: PathBuf,
        /// Skip rows that fail to parse instead of aborting the import
        #[arg(long)]
        skip_invalid: bool,
    },
    /// Interactively assign categories to uncategorized expenses.
    Categorize {
        /// Import this CSV before categorizing
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Manage categories.
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Average monthly spend per category.
    Report {
        /// Include categories marked as fixed costs
        #[arg(long)]
        include_fixed: bool,
        /// Only report these categories (repeatable; default: all)
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Write the month x category table to a CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Show database location and expense counts.
    Status,
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Add a category (an existing name is reused).
    Add {
        name: String,
        /// Mark the category as a fixed cost
        #[arg(long)]
        fixed: bool,
    },
    /// List categories.
    List,
}

/// Database path from `--db`, or from settings.
pub(crate) fn resolve_db_path(db: Option<&Path>) -> PathBuf {
    match db {
        Some(path) => path.to_path_buf(),
        None => load_settings().db_path(),
    }
}

/// Opens the store and makes sure the schema exists. Without `--db` the
/// data directory must already have been set up by `budget init`.
pub(crate) fn open_store(db: Option<&Path>) -> Result<Connection> {
    let db_path = resolve_db_path(db);
    if db.is_none() && !db_path.exists() {
        return Err(BudgetError::Other(format!(
            "no database at {}; run `budget init` first",
            db_path.display()
        )));
    }
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    Ok(conn)
}
