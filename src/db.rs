use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    is_fixed_cost INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY,
    hash TEXT NOT NULL UNIQUE,
    date TEXT NOT NULL,
    amount TEXT NOT NULL,
    description TEXT NOT NULL,
    category_id INTEGER,
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_expenses_uncategorized
    ON expenses (description) WHERE category_id IS NULL;
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("budget.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn schema_objects(conn: &Connection, kind: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap();
        let names = stmt
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<String>, _>>()
            .unwrap();
        names
    }

    #[test]
    fn test_schema_objects() {
        let (_dir, conn) = open_temp();
        assert_eq!(schema_objects(&conn, "table"), vec!["categories", "expenses"]);
        assert!(schema_objects(&conn, "index").contains(&"idx_expenses_uncategorized".to_string()));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let (dir, conn) = open_temp();
        conn.execute("INSERT INTO categories (name) VALUES ('Rent')", []).unwrap();
        drop(conn);

        let conn = get_connection(&dir.path().join("budget.db")).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn test_category_reference_must_exist() {
        let (_dir, conn) = open_temp();
        let result = conn.execute(
            "INSERT INTO expenses (hash, date, amount, description, category_id) \
             VALUES ('h', '2022-08-29', '-25.00', 'X', 999)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_amount_text_is_kept_verbatim() {
        let (_dir, conn) = open_temp();
        conn.execute(
            "INSERT INTO expenses (hash, date, amount, description) \
             VALUES ('h', '2022-08-29', '40385.60', 'Løn')",
            [],
        )
        .unwrap();
        let amount: String = conn.query_row("SELECT amount FROM expenses", [], |r| r.get(0)).unwrap();
        assert_eq!(amount, "40385.60");
        assert!(conn
            .execute(
                "INSERT INTO expenses (hash, date, amount, description) \
                 VALUES ('h', '2022-08-30', '1.00', 'Y')",
                [],
            )
            .is_err());
    }
}
