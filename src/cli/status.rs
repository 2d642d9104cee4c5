use std::path::Path;

use crate::error::Result;
use crate::repository::ClassificationRepo;
use crate::settings::load_settings;

use super::{open_store, resolve_db_path};

pub fn run(db: Option<&Path>) -> Result<()> {
    let db_path = resolve_db_path(db);
    if db.is_none() {
        println!("Data dir:   {}", load_settings().data_dir);
    }
    println!("Database:   {}", db_path.display());

    if db.is_none() && !db_path.exists() {
        println!();
        println!("Database not found. Run `budget init` to set up.");
        return Ok(());
    }

    let conn = open_store(db)?;
    let counts = ClassificationRepo::new(&conn).counts()?;

    println!();
    println!("Expenses:       {}", counts.expenses);
    println!("Uncategorized:  {}", counts.uncategorized);
    println!("Categories:     {}", counts.categories);
    Ok(())
}
