//! Database migration system.
//!
//! Schema version stored in `PRAGMA user_version`. Migrations are forward-only.
//! A fresh database also records the accumulator scale it was written with;
//! opening a database written under a different scale is refused.

use rusqlite::{Connection, OptionalExtension};

use tally_ledger::SCALE;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Key of the accumulator scale in the `meta` table.
pub const SCALE_KEY: &str = "accumulator_scale";

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<()> {
    let current_version: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(DbError::Sqlite)?;

    if current_version == 0 {
        tracing::info!("Initializing ledger schema v{SCHEMA_VERSION}");
        conn.execute_batch(schema::SCHEMA_V1)
            .map_err(DbError::Sqlite)?;

        insert_default_meta(conn)?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(DbError::Sqlite)?;
    } else if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            tracing::info!("Running migration to v{version}");
            run_migration(conn, version)?;
            conn.pragma_update(None, "user_version", version)
                .map_err(DbError::Sqlite)?;
        }
    } else if current_version > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "Database version {current_version} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    check_scale(conn)
}

fn insert_default_meta(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)",
        rusqlite::params![SCALE_KEY, SCALE.to_string()],
    )
    .map_err(DbError::Sqlite)?;
    Ok(())
}

/// Refuse databases whose accumulators were scaled differently.
fn check_scale(conn: &Connection) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            [SCALE_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(value) if value == SCALE.to_string() => Ok(()),
        Some(value) => Err(DbError::Migration(format!(
            "database accumulator scale {value} does not match {SCALE}"
        ))),
        None => Err(DbError::NotFound(SCALE_KEY.to_string())),
    }
}

fn run_migration(_conn: &Connection, version: u32) -> Result<()> {
    Err(DbError::Migration(format!(
        "Unknown migration version: {version}"
    )))
}
