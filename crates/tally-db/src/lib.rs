//! # tally-db
//!
//! SQLite persistence for the reward ledger.
//!
//! ## Schema
//!
//! - WAL mode, foreign keys enforced
//! - Timestamps are Unix epoch seconds
//! - Accumulators and checkpoints are `u128` stored as 16-byte big-endian BLOBs
//! - Schema version stored in `PRAGMA user_version`
//!
//! Only pools, positions and reward balances are needed to resume a ledger.
//! The event journal is kept for audit and is never read back into the
//! engine.

pub mod migrations;
pub mod queries;
pub mod schema;
pub mod store;

use rusqlite::Connection;
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the ledger database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = FULL;",
    )?;
    Ok(())
}

/// Encode a `u128` as a sortable 16-byte BLOB.
pub(crate) fn u128_to_blob(value: u128) -> [u8; 16] {
    value.to_be_bytes()
}

/// Decode a BLOB written by [`u128_to_blob`].
pub(crate) fn blob_to_u128(blob: &[u8]) -> Result<u128> {
    let bytes: [u8; 16] = blob
        .try_into()
        .map_err(|_| DbError::Serialization(format!("expected 16-byte u128, got {}", blob.len())))?;
    Ok(u128::from_be_bytes(bytes))
}

/// Decode a 32-byte id BLOB.
pub(crate) fn blob_to_id(blob: &[u8]) -> Result<[u8; 32]> {
    blob.try_into()
        .map_err(|_| DbError::Serialization(format!("expected 32-byte id, got {}", blob.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open_memory().expect("open");
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("get foreign_keys");
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_u128_blob_round_trip() {
        let value = u128::MAX - 12345;
        assert_eq!(blob_to_u128(&u128_to_blob(value)).expect("decode"), value);
        assert!(blob_to_u128(&[0u8; 8]).is_err());
        assert!(blob_to_id(&[0u8; 31]).is_err());
    }
}
