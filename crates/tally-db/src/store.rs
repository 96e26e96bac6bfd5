//! Whole-ledger save and restore.
//!
//! [`save`] writes the full state plus any new journal entries in one SQL
//! transaction, so a crash leaves either the previous or the new state on
//! disk, never a mix. Pools are append-only and positions are never
//! removed, so upserts alone keep the tables in sync.

use rusqlite::Connection;

use tally_ledger::{LedgerEvent, LedgerState, Timestamp};

use crate::queries::{balances, journal, pools, positions};
use crate::{DbError, Result};

/// Persist `state` and append `events` atomically.
pub fn save(
    conn: &mut Connection,
    state: &LedgerState,
    events: &[(Timestamp, LedgerEvent)],
) -> Result<()> {
    let tx = conn.transaction()?;

    for (index, pool) in state.pools.iter().enumerate() {
        pools::upsert(&tx, index as u64, pool)?;
    }
    for (key, position) in &state.positions {
        positions::upsert(&tx, key, position)?;
    }
    for (user, balance) in &state.balances {
        balances::upsert(&tx, user, *balance)?;
    }
    for (at, event) in events {
        journal::append(&tx, *at, event)?;
    }

    tx.commit()?;

    tracing::debug!(
        pools = state.pools.len(),
        positions = state.positions.len(),
        balances = state.balances.len(),
        events = events.len(),
        "ledger state saved"
    );
    Ok(())
}

/// Restore the ledger state.
///
/// # Errors
///
/// - [`DbError::Constraint`] if pool ids are not contiguous from 0, or a
///   stored pool's total disagrees with its positions
pub fn load(conn: &Connection) -> Result<LedgerState> {
    let mut state = LedgerState::default();

    for (expected, (pool_id, pool)) in pools::list(conn)?.into_iter().enumerate() {
        if pool_id != expected as u64 {
            return Err(DbError::Constraint(format!(
                "pool ids not contiguous: expected {expected}, found {pool_id}"
            )));
        }
        state.pools.push(pool);
    }

    state.positions = positions::list(conn)?.into_iter().collect();
    state.balances = balances::list(conn)?.into_iter().collect();

    let violations = state.conservation_violations();
    if !violations.is_empty() {
        return Err(DbError::Constraint(format!(
            "stake totals disagree with positions in pools {violations:?}"
        )));
    }

    tracing::debug!(pools = state.pools.len(), "ledger state loaded");
    Ok(state)
}
