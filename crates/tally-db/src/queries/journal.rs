//! Event journal query functions.

use rusqlite::Connection;

use tally_ledger::{LedgerEvent, Timestamp, UserId};

use crate::Result;

/// Append an event to the journal.
pub fn append(conn: &Connection, at: Timestamp, event: &LedgerEvent) -> Result<()> {
    let payload = serde_json::to_string(event)?;
    conn.execute(
        "INSERT INTO event_log (event_type, user_id, payload, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            event.name(),
            event.user().map(|user| user.as_slice()),
            payload,
            at as i64,
        ],
    )?;
    Ok(())
}

/// Most recent journal entries, newest first.
pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<JournalRow>> {
    let mut stmt = conn.prepare(
        "SELECT seq, event_type, payload, timestamp
         FROM event_log ORDER BY seq DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(seq, event_type, payload, timestamp)| {
            Ok(JournalRow {
                seq: seq as u64,
                event_type,
                event: serde_json::from_str(&payload)?,
                timestamp: timestamp as u64,
            })
        })
        .collect()
}

/// Number of journal entries concerning `user`.
pub fn count_for_user(conn: &Connection, user: &UserId) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM event_log WHERE user_id = ?1",
        [user.as_slice()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// A decoded journal row.
#[derive(Debug)]
pub struct JournalRow {
    pub seq: u64,
    pub event_type: String,
    pub event: LedgerEvent,
    pub timestamp: u64,
}
