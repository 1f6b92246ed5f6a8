//! Database connection module for the VetClinic application
//!
//! Every pooled SQLite connection is opened with foreign keys enforced, so
//! the cascade and restrict rules declared by the migrations hold for all
//! repositories.

use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use tracing::{error, info};

use super::migrations::run_sqlite_migrations;
use super::DatabaseError;

/// A pooled SQLite connection
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// Shared SQLite connection pool handed to every repository
#[derive(Debug, Clone)]
pub struct DatabasePool(Arc<r2d2::Pool<SqliteConnectionManager>>);

impl DatabasePool {
    /// Check a connection out of the pool
    pub fn get(&self) -> Result<SqliteConnection, r2d2::Error> {
        self.0.get()
    }

    /// Current pool statistics as (connections, idle connections)
    pub fn state(&self) -> (u32, u32) {
        let state = self.0.state();
        (state.connections, state.idle_connections)
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub sqlite_path: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Connection checkout timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "./data/vet_clinic.db".to_string(),
            max_connections: 10,
            timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration from environment variables
    pub fn from_env() -> Result<Self, DatabaseError> {
        let defaults = Self::default();

        let sqlite_path = match env::var("DB_SQLITE_PATH") {
            Ok(path) => path,
            Err(_) => {
                let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
                Path::new(&data_dir)
                    .join("vet_clinic.db")
                    .to_string_lossy()
                    .to_string()
            }
        };

        if sqlite_path.trim().is_empty() {
            return Err(DatabaseError::ConfigError("DB_SQLITE_PATH is empty".to_string()));
        }

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_connections);

        let timeout_seconds = env::var("DB_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.timeout_seconds);

        info!(
            "Database configuration: path={}, max_connections={}, timeout={}s",
            sqlite_path, max_connections, timeout_seconds
        );

        Ok(DatabaseConfig {
            sqlite_path,
            max_connections,
            timeout_seconds,
        })
    }
}

fn enforce_foreign_keys(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
}

/// Open the SQLite file pool described by `config` and bring its schema up to date
pub fn initialize_database_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    info!("Initializing SQLite database at: {}", config.sqlite_path);

    if let Some(parent) = Path::new(&config.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating parent directory: {:?}", parent);
            fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create directory {:?}: {}", parent, e);
                DatabaseError::ConnectionError(e.to_string())
            })?;
        }
    }

    let manager = SqliteConnectionManager::file(&config.sqlite_path)
        .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE)
        .with_init(enforce_foreign_keys);

    let pool = r2d2::Pool::builder()
        .max_size(config.max_connections)
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)?;

    let pool = DatabasePool(Arc::new(pool));
    run_migrations(&pool)?;

    info!("SQLite connection pool created successfully");
    Ok(pool)
}

/// Build a single-connection in-memory pool with the full schema applied.
///
/// All checkouts share the same connection, so callers must release a
/// connection before asking for another one.
pub fn initialize_in_memory_pool() -> Result<DatabasePool, DatabaseError> {
    let manager = SqliteConnectionManager::memory().with_init(enforce_foreign_keys);

    let pool = r2d2::Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_secs(5))
        .build(manager)?;

    let pool = DatabasePool(Arc::new(pool));
    run_migrations(&pool)?;
    Ok(pool)
}

/// Run database migrations
fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    info!("Running database migrations");

    let conn = pool.get()?;
    run_sqlite_migrations(&conn).map_err(DatabaseError::MigrationError)?;

    info!("Database migrations completed successfully");
    Ok(())
}

/// Round-trip a trivial query to prove the database answers
pub fn ping(pool: &DatabasePool) -> Result<(), DatabaseError> {
    let conn = pool.get()?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

/// Describe the database behind the pool
pub fn get_connection_info(pool: &DatabasePool) -> String {
    let path = pool.get().map_err(DatabaseError::from).and_then(|conn| {
        conn.query_row("PRAGMA database_list", [], |row| row.get::<_, String>(2))
            .map_err(DatabaseError::from)
    });

    let description = match path {
        Ok(path) if path.is_empty() || path == ":memory:" => "SQLite in-memory database".to_string(),
        Ok(path) => format!("SQLite database at {}", path),
        Err(e) => {
            error!("Failed to inspect SQLite connection: {}", e);
            return format!("SQLite connection error: {}", e);
        }
    };

    let (connections, idle) = pool.state();
    format!("{} (connections: active={}, idle={})", description, connections, idle)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert!(config.sqlite_path.ends_with("vet_clinic.db"));
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_in_memory_pool_is_migrated() {
        let pool = initialize_in_memory_pool().unwrap();
        assert!(ping(&pool).is_ok());

        let conn = pool.get().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_connection_info_mentions_memory() {
        let pool = initialize_in_memory_pool().unwrap();
        let info = get_connection_info(&pool);
        assert!(info.contains("in-memory"), "unexpected info: {}", info);
    }
}
