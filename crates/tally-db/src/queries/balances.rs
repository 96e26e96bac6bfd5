//! Reward balance query functions.

use rusqlite::{Connection, OptionalExtension};

use tally_ledger::{Amount, UserId};

use crate::{blob_to_id, Result};

/// Set a user's claimable balance.
pub fn upsert(conn: &Connection, user: &UserId, balance: Amount) -> Result<()> {
    conn.execute(
        "INSERT INTO reward_balances (user_id, balance) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET balance = excluded.balance",
        rusqlite::params![user.as_slice(), balance as i64],
    )?;
    Ok(())
}

/// A user's claimable balance; 0 if none is stored.
pub fn get(conn: &Connection, user: &UserId) -> Result<Amount> {
    let balance: Option<i64> = conn
        .query_row(
            "SELECT balance FROM reward_balances WHERE user_id = ?1",
            [user.as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(balance.map_or(0, |b| b as u64))
}

/// Every stored balance.
pub fn list(conn: &Connection) -> Result<Vec<(UserId, Amount)>> {
    let mut stmt = conn.prepare("SELECT user_id, balance FROM reward_balances")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(user, balance)| Ok((blob_to_id(&user)?, balance as u64)))
        .collect()
}
