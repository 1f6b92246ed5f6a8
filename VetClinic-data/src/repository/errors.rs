use rusqlite::ErrorCode;
use thiserror::Error;

use crate::database::DatabaseError;

/// Error type for repository operations
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness or referential constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A dispensed quantity exceeds what the branch has on hand
    #[error("Insufficient stock for {medication}. Available: {available}")]
    InsufficientStock {
        medication: String,
        available: i64,
    },

    /// A medication referenced by a visit is not part of the branch inventory
    #[error("Medication {0} no longer belongs to the branch inventory")]
    MedicationNotInBranch(i64),
}

impl RepositoryError {
    /// Turn constraint violations into `Conflict` with the given message,
    /// leaving every other SQLite failure untouched.
    pub fn from_constraint(err: rusqlite::Error, message: impl Into<String>) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                RepositoryError::Conflict(message.into())
            }
            _ => RepositoryError::Sqlite(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_becomes_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err();

        match RepositoryError::from_constraint(err, "duplicate name") {
            RepositoryError::Conflict(msg) => assert_eq!(msg, "duplicate name"),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_other_errors_pass_through() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing", []).unwrap_err();
        assert!(matches!(
            RepositoryError::from_constraint(err, "unused"),
            RepositoryError::Sqlite(_)
        ));
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = RepositoryError::InsufficientStock {
            medication: "Amoxicillin".to_string(),
            available: 2,
        };
        assert_eq!(err.to_string(), "Insufficient stock for Amoxicillin. Available: 2");
    }
}
