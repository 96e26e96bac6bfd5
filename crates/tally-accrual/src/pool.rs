//! Pool state and the lazy accumulator advance.
//!
//! A pool's accumulator only moves inside [`Pool::advance`]. Between
//! advances, [`Pool::accumulator_at`] projects the value an advance would
//! produce without touching the pool.

use serde::{Deserialize, Serialize};

use crate::reward::SCALE;
use crate::{AccrualError, Amount, AssetId, Result, Timestamp};

/// One staking market: a staked asset, its emission rate, and the
/// reward-per-staked-unit accumulator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Handle of the staked asset.
    pub asset: AssetId,
    /// Reward units emitted per second. Fixed at creation.
    pub reward_rate: Amount,
    /// Sum of every position's stake in this pool.
    pub total_staked: Amount,
    /// Cumulative reward per staked unit, scaled by [`SCALE`].
    pub accumulator: u128,
    /// Timestamp of the last advance.
    pub last_update_time: Timestamp,
    /// Timestamp at which the pool was registered.
    pub created_at: Timestamp,
}

impl Pool {
    /// Create an empty pool whose clock starts at `now`.
    pub fn new(asset: AssetId, reward_rate: Amount, now: Timestamp) -> Self {
        Self {
            asset,
            reward_rate,
            total_staked: 0,
            accumulator: 0,
            last_update_time: now,
            created_at: now,
        }
    }

    /// Accumulator value the pool would hold after advancing to `now`.
    ///
    /// # Errors
    ///
    /// - [`AccrualError::Overflow`] if `elapsed * rate * SCALE` or the new
    ///   accumulator exceeds `u128`
    pub fn accumulator_at(&self, now: Timestamp) -> Result<u128> {
        if now <= self.last_update_time || self.total_staked == 0 {
            return Ok(self.accumulator);
        }

        let elapsed = u128::from(now - self.last_update_time);
        let per_unit = elapsed
            .checked_mul(u128::from(self.reward_rate))
            .and_then(|reward| reward.checked_mul(SCALE))
            .ok_or(AccrualError::Overflow("emitted reward"))?
            / u128::from(self.total_staked);

        self.accumulator
            .checked_add(per_unit)
            .ok_or(AccrualError::Overflow("accumulator"))
    }

    /// Bring the accumulator up to `now`.
    ///
    /// Calls with `now <= last_update_time` are no-ops, so repeated advances
    /// within one instant never double count. An empty pool only moves its
    /// clock forward: reward emitted while nothing is staked is forfeited.
    ///
    /// # Errors
    ///
    /// - [`AccrualError::Overflow`] on arithmetic overflow; the pool is left
    ///   unchanged
    pub fn advance(&mut self, now: Timestamp) -> Result<()> {
        if now <= self.last_update_time {
            return Ok(());
        }

        let next = self.accumulator_at(now)?;

        tracing::trace!(
            from = self.last_update_time,
            to = now,
            total_staked = self.total_staked,
            growth = next - self.accumulator,
            "accrual: advanced pool"
        );

        self.accumulator = next;
        self.last_update_time = now;
        Ok(())
    }

    /// Add `amount` to the pool's total stake.
    ///
    /// # Errors
    ///
    /// - [`AccrualError::Overflow`] if the total exceeds [`Amount::MAX`]
    pub fn add_stake(&mut self, amount: Amount) -> Result<()> {
        self.total_staked = self
            .total_staked
            .checked_add(amount)
            .ok_or(AccrualError::Overflow("total staked"))?;
        Ok(())
    }

    /// Remove `amount` from the pool's total stake.
    ///
    /// # Errors
    ///
    /// - [`AccrualError::Overflow`] if `amount` exceeds the total
    pub fn remove_stake(&mut self, amount: Amount) -> Result<()> {
        self.total_staked = self
            .total_staked
            .checked_sub(amount)
            .ok_or(AccrualError::Overflow("total staked underflow"))?;
        Ok(())
    }
}
