use std::path::{Path, PathBuf};

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path, Settings};

pub fn run(db: Option<&Path>, data_dir: Option<String>) -> Result<()> {
    // An explicit database needs no settings.
    if let Some(db_path) = db {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        println!("Initialized database at {}", db_path.display());
        return Ok(());
    }

    let mut settings = load_settings();
    let defaults = Settings::default();

    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    } else if settings.data_dir == defaults.data_dir {
        println!("Data directory [{}]: ", settings.data_dir);
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let chosen = input.trim();
        if !chosen.is_empty() {
            settings.data_dir = shellexpand_path(chosen);
        }
    }

    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;
    tracing::info!(data_dir = %resolved.display(), "initialized data directory");

    println!("Initialized budget-builder at {}", resolved.display());
    Ok(())
}
