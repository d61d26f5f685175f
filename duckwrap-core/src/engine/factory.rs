//! DuckDB connection factory.
//!
//! Builds a single connection from [`WrapperConfig`]: engine flags first, then
//! the optional init SQL so callers get a ready-to-use connection.

use duckdb::{AccessMode, Config, Connection};
use tracing::{info, instrument};

use crate::config::WrapperConfig;
use crate::error::WrapperError;

/// Open a connection to the configured database file, or an in-memory one.
#[instrument(skip(config), fields(database = config.database_path.as_deref().unwrap_or(":memory:")))]
pub(crate) fn open_connection(config: &WrapperConfig) -> Result<Connection, WrapperError> {
    let mut flags = Config::default().enable_autoload_extension(config.autoload_extensions)?;
    if config.read_only {
        flags = flags.access_mode(AccessMode::ReadOnly)?;
    }
    if let Some(threads) = config.threads {
        flags = flags.threads(threads)?;
    }

    let conn = match config.database_path.as_deref() {
        Some(path) if !path.is_empty() && path != ":memory:" => {
            Connection::open_with_flags(path, flags)?
        }
        _ => Connection::open_in_memory_with_flags(flags)?,
    };

    if let Some(sql) = config.init_sql.as_deref() {
        let trimmed = sql.trim();
        if !trimmed.is_empty() {
            info!("running connection init SQL");
            conn.execute_batch(trimmed)?;
        }
    }

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_connection_runs_init_sql() {
        let config = WrapperConfig {
            init_sql: Some("CREATE TABLE seeded AS SELECT 42 AS answer;".to_string()),
            ..WrapperConfig::default()
        };
        let conn = open_connection(&config).unwrap();
        let answer: i32 = conn
            .query_row("SELECT answer FROM seeded", [], |row| row.get(0))
            .unwrap();
        assert_eq!(answer, 42);
    }

    #[test]
    fn file_database_persists_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.duckdb");
        let config = WrapperConfig::with_database_path(path.to_string_lossy());

        let conn = open_connection(&config).unwrap();
        conn.execute_batch("CREATE TABLE kept (id INTEGER); INSERT INTO kept VALUES (1), (2);")
            .unwrap();
        drop(conn);

        let conn = open_connection(&config).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM kept", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn broken_init_sql_fails_open() {
        let config = WrapperConfig {
            init_sql: Some("THIS IS NOT SQL".to_string()),
            ..WrapperConfig::default()
        };
        assert!(matches!(
            open_connection(&config),
            Err(WrapperError::DuckDb(_))
        ));
    }
}
