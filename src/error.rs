use thiserror::Error;

/// A single statement row that could not be turned into a transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid date in column {field}: {value:?}")]
    InvalidDate { field: String, value: String },

    #[error("Invalid amount in column {field}: {value:?}")]
    InvalidAmount { field: String, value: String },
}

impl ParseError {
    /// Name of the column the error refers to.
    pub fn field(&self) -> &str {
        match self {
            Self::MissingColumn(field) => field,
            Self::InvalidDate { field, .. } | Self::InvalidAmount { field, .. } => field,
        }
    }
}

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Database error: {0}")]
    Db(rusqlite::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Line {line}: {source}")]
    InvalidRow {
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for BudgetError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                BudgetError::Constraint(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            other => BudgetError::Db(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BudgetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_field() {
        let err = ParseError::InvalidAmount {
            field: "Beløb".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.field(), "Beløb");
        assert!(err.to_string().contains("Beløb"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_constraint_violation_is_distinct() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: BudgetError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, BudgetError::Constraint(_)), "got {err:?}");
    }

    #[test]
    fn test_other_sqlite_errors_stay_db() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: BudgetError = conn.execute("SELECT * FROM missing", []).unwrap_err().into();
        assert!(matches!(err, BudgetError::Db(_)));
    }
}
