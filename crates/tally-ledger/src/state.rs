//! Ledger state: pools, positions and reward balances.
//!
//! This is exactly what has to survive a restart. Everything else the
//! engine reports is derived from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tally_accrual::pending_reward;

use crate::{Amount, AssetId, LedgerError, Pool, PoolId, Result, Timestamp, UserId};

/// Key of a position. Ordered by user first so that all of a user's
/// positions form one contiguous range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub user: UserId,
    pub pool_id: PoolId,
}

impl PositionKey {
    pub fn new(user: UserId, pool_id: PoolId) -> Self {
        Self { user, pool_id }
    }
}

/// A user's stake in one pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPosition {
    /// Units currently staked.
    pub staked_amount: Amount,
    /// Pool accumulator as of the user's last interaction.
    pub checkpoint: u128,
}

/// Display view of a pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub pool_id: PoolId,
    pub asset: AssetId,
    pub reward_rate: Amount,
    pub total_staked: Amount,
    /// Accumulator as last stored.
    pub accumulator: u128,
    /// Accumulator projected to the query time.
    pub projected_accumulator: u128,
    pub last_update_time: Timestamp,
    pub seconds_since_update: u64,
    /// Positions with a nonzero stake.
    pub staker_count: usize,
}

/// Full ledger state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerState {
    /// Pools indexed by id.
    pub pools: Vec<Pool>,
    /// Positions, created on first deposit and never removed.
    pub positions: BTreeMap<PositionKey, UserPosition>,
    /// Claimable reward per user.
    pub balances: BTreeMap<UserId, Amount>,
}

impl LedgerState {
    /// Index of `pool_id` in [`LedgerState::pools`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPool`] if `pool_id` is not registered
    pub fn pool_index(&self, pool_id: PoolId) -> Result<usize> {
        let pool_count = self.pools.len();
        usize::try_from(pool_id)
            .ok()
            .filter(|index| *index < pool_count)
            .ok_or(LedgerError::InvalidPool {
                pool_id,
                pool_count,
            })
    }

    /// Look up a pool.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPool`] if `pool_id` is not registered
    pub fn pool(&self, pool_id: PoolId) -> Result<&Pool> {
        let index = self.pool_index(pool_id)?;
        Ok(&self.pools[index])
    }

    /// A user's position in a pool, if they ever deposited there.
    pub fn position(&self, pool_id: PoolId, user: &UserId) -> Option<&UserPosition> {
        self.positions.get(&PositionKey::new(*user, pool_id))
    }

    /// Settled, claimable reward of `user`. Excludes accrual not yet swept.
    pub fn reward_balance(&self, user: &UserId) -> Amount {
        self.balances.get(user).copied().unwrap_or(0)
    }

    /// Reward `user` has accrued in `pool_id` since their checkpoint, as of
    /// `now`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPool`] if `pool_id` is not registered
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn pending_reward(&self, pool_id: PoolId, user: &UserId, now: Timestamp) -> Result<Amount> {
        let pool = self.pool(pool_id)?;
        let Some(position) = self.position(pool_id, user) else {
            return Ok(0);
        };
        let accumulator = pool.accumulator_at(now)?;
        Ok(pending_reward(position.staked_amount, accumulator, position.checkpoint)?)
    }

    /// What a claim would pay at `now`: the settled balance plus everything
    /// pending across the user's pools.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn claimable(&self, user: &UserId, now: Timestamp) -> Result<Amount> {
        let mut total = self.reward_balance(user);
        for (pool_id, _) in self.positions_of(user) {
            total = total
                .checked_add(self.pending_reward(pool_id, user, now)?)
                .ok_or(LedgerError::Overflow("claimable"))?;
        }
        Ok(total)
    }

    /// Display statistics for a pool as of `now`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPool`] if `pool_id` is not registered
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn pool_stats(&self, pool_id: PoolId, now: Timestamp) -> Result<PoolStats> {
        let pool = self.pool(pool_id)?;
        let staker_count = self
            .positions
            .iter()
            .filter(|(key, position)| key.pool_id == pool_id && position.staked_amount > 0)
            .count();

        Ok(PoolStats {
            pool_id,
            asset: pool.asset,
            reward_rate: pool.reward_rate,
            total_staked: pool.total_staked,
            accumulator: pool.accumulator,
            projected_accumulator: pool.accumulator_at(now)?,
            last_update_time: pool.last_update_time,
            seconds_since_update: now.saturating_sub(pool.last_update_time),
            staker_count,
        })
    }

    /// All positions held by `user`, in pool order.
    pub fn positions_of<'a>(
        &'a self,
        user: &UserId,
    ) -> impl Iterator<Item = (PoolId, &'a UserPosition)> + 'a {
        let start = PositionKey::new(*user, PoolId::MIN);
        let end = PositionKey::new(*user, PoolId::MAX);
        self.positions
            .range(start..=end)
            .map(|(key, position)| (key.pool_id, position))
    }

    /// Sum of position stakes in `pool_id`.
    pub fn staked_sum(&self, pool_id: PoolId) -> u128 {
        self.positions
            .iter()
            .filter(|(key, _)| key.pool_id == pool_id)
            .map(|(_, position)| u128::from(position.staked_amount))
            .sum()
    }

    /// Pools whose `total_staked` disagrees with the sum of their positions.
    pub fn conservation_violations(&self) -> Vec<PoolId> {
        let mut sums: BTreeMap<PoolId, u128> = BTreeMap::new();
        for (key, position) in &self.positions {
            *sums.entry(key.pool_id).or_default() += u128::from(position.staked_amount);
        }

        (0..self.pools.len())
            .filter_map(|index| {
                let pool_id = index as PoolId;
                let sum = sums.get(&pool_id).copied().unwrap_or(0);
                (sum != u128::from(self.pools[index].total_staked)).then_some(pool_id)
            })
            .collect()
    }

    /// Whether every pool's stake total matches its positions.
    pub fn is_conserved(&self) -> bool {
        self.conservation_violations().is_empty()
    }
}
