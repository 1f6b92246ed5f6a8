use thiserror::Error;

// Database modules
pub mod connection;
pub mod migrations;

// Re-export database connection functions
pub use connection::*;

/// Database error enum
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Configuration error
    #[error("Database configuration error: {0}")]
    ConfigError(String),

    /// Connection error
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// SQLite connection pool error
    #[error("SQLite connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    /// Migration error
    #[error("Database migration error: {0}")]
    MigrationError(String),
}
