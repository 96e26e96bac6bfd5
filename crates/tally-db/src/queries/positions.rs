//! Position query functions.

use rusqlite::Connection;

use tally_ledger::{PositionKey, UserPosition};

use crate::{blob_to_id, blob_to_u128, u128_to_blob, Result};

/// Insert or overwrite a position.
pub fn upsert(conn: &Connection, key: &PositionKey, position: &UserPosition) -> Result<()> {
    conn.execute(
        "INSERT INTO positions (pool_id, user_id, staked_amount, checkpoint)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(pool_id, user_id) DO UPDATE SET
             staked_amount = excluded.staked_amount,
             checkpoint = excluded.checkpoint",
        rusqlite::params![
            key.pool_id as i64,
            key.user.as_slice(),
            position.staked_amount as i64,
            u128_to_blob(position.checkpoint).as_slice(),
        ],
    )?;
    Ok(())
}

/// Every stored position.
pub fn list(conn: &Connection) -> Result<Vec<(PositionKey, UserPosition)>> {
    let mut stmt = conn.prepare(
        "SELECT pool_id, user_id, staked_amount, checkpoint
         FROM positions ORDER BY pool_id ASC, user_id ASC",
    )?;
    let rows = stmt
        .query_map([], raw_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode).collect()
}

type RawRow = (i64, Vec<u8>, i64, Vec<u8>);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode((pool_id, user, staked, checkpoint): RawRow) -> Result<(PositionKey, UserPosition)> {
    Ok((
        PositionKey::new(blob_to_id(&user)?, pool_id as u64),
        UserPosition {
            staked_amount: staked as u64,
            checkpoint: blob_to_u128(&checkpoint)?,
        },
    ))
}
