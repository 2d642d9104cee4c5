use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::importer::{import_file, RowPolicy};
use crate::settings::load_settings;

use super::open_store;

pub fn run(db: Option<&Path>, file: &Path, skip_invalid: bool) -> Result<()> {
    let conn = open_store(db)?;
    import_into(&conn, file, skip_invalid)
}

pub(crate) fn import_into(conn: &Connection, file: &Path, skip_invalid: bool) -> Result<()> {
    let settings = load_settings();
    let policy = if skip_invalid {
        RowPolicy::Skip
    } else {
        RowPolicy::Abort
    };

    let result = import_file(conn, file, &settings.statement, policy)?;

    println!(
        "{} imported, {} skipped (duplicates)",
        result.imported, result.duplicates
    );
    if result.invalid > 0 {
        println!("{} rows could not be parsed and were skipped", result.invalid);
    }
    Ok(())
}
