mod categorizer;
mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod models;
mod reports;
mod repository;
mod settings;

use clap::Parser;

use categorizer::SessionOutcome;
use cli::{CategoryCommands, Cli, Commands};

/// Exit status when the user quits categorizing before the queue is empty.
const EXIT_QUIT: i32 = 2;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("budget=warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let db = cli.db.as_deref();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(db, data_dir).map(|_| 0),
        Commands::Import { file, skip_invalid } => {
            cli::import::run(db, &file, skip_invalid).map(|_| 0)
        }
        Commands::Categorize { file } => {
            cli::categorize::run(db, file.as_deref()).map(|outcome| match outcome {
                SessionOutcome::Done { .. } => 0,
                SessionOutcome::Quit { .. } => EXIT_QUIT,
            })
        }
        Commands::Category { command } => match command {
            CategoryCommands::Add { name, fixed } => cli::category::add(db, &name, fixed).map(|_| 0),
            CategoryCommands::List => cli::category::list(db).map(|_| 0),
        },
        Commands::Report {
            include_fixed,
            categories,
            export,
        } => cli::report::run(db, include_fixed, categories, export).map(|_| 0),
        Commands::Status => cli::status::run(db).map(|_| 0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
