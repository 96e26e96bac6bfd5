//! Pool query functions.

use rusqlite::{Connection, OptionalExtension};

use tally_ledger::{Pool, PoolId};

use crate::{blob_to_id, blob_to_u128, u128_to_blob, DbError, Result};

/// Insert a pool or overwrite its mutable fields.
pub fn upsert(conn: &Connection, pool_id: PoolId, pool: &Pool) -> Result<()> {
    conn.execute(
        "INSERT INTO pools (pool_id, asset, reward_rate, total_staked, accumulator, last_update_time, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(pool_id) DO UPDATE SET
             total_staked = excluded.total_staked,
             accumulator = excluded.accumulator,
             last_update_time = excluded.last_update_time",
        rusqlite::params![
            pool_id as i64,
            pool.asset.as_slice(),
            pool.reward_rate as i64,
            pool.total_staked as i64,
            u128_to_blob(pool.accumulator).as_slice(),
            pool.last_update_time as i64,
            pool.created_at as i64,
        ],
    )?;
    Ok(())
}

/// All pools in ascending id order, with their ids.
pub fn list(conn: &Connection) -> Result<Vec<(PoolId, Pool)>> {
    let mut stmt = conn.prepare(
        "SELECT pool_id, asset, reward_rate, total_staked, accumulator, last_update_time, created_at
         FROM pools ORDER BY pool_id ASC",
    )?;

    let rows = stmt
        .query_map([], raw_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(PoolRow::decode).collect()
}

/// Fetch a single pool.
pub fn get(conn: &Connection, pool_id: PoolId) -> Result<Pool> {
    let row = conn
        .query_row(
            "SELECT pool_id, asset, reward_rate, total_staked, accumulator, last_update_time, created_at
             FROM pools WHERE pool_id = ?1",
            [pool_id as i64],
            raw_row,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("pool {pool_id}")))?;

    let (_, pool) = row.decode()?;
    Ok(pool)
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PoolRow> {
    Ok(PoolRow {
        pool_id: row.get::<_, i64>(0)? as u64,
        asset: row.get(1)?,
        reward_rate: row.get::<_, i64>(2)? as u64,
        total_staked: row.get::<_, i64>(3)? as u64,
        accumulator: row.get(4)?,
        last_update_time: row.get::<_, i64>(5)? as u64,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

/// A raw pool row.
struct PoolRow {
    pool_id: u64,
    asset: Vec<u8>,
    reward_rate: u64,
    total_staked: u64,
    accumulator: Vec<u8>,
    last_update_time: u64,
    created_at: u64,
}

impl PoolRow {
    fn decode(self) -> Result<(PoolId, Pool)> {
        Ok((
            self.pool_id,
            Pool {
                asset: blob_to_id(&self.asset)?,
                reward_rate: self.reward_rate,
                total_staked: self.total_staked,
                accumulator: blob_to_u128(&self.accumulator)?,
                last_update_time: self.last_update_time,
                created_at: self.created_at,
            },
        ))
    }
}
