//! Ledger engine: pool registration, deposit, withdraw and claim.
//!
//! ## Settlement
//!
//! Every user operation on a pool starts by settling the user there:
//!
//! 1. advance the pool to `now`
//! 2. credit `staked * (accumulator - checkpoint) / SCALE` to the user's
//!    reward balance
//! 3. move the checkpoint to the new accumulator
//!
//! Settlement works on copies. The copies are written back only after the
//! operation's custody transfer has succeeded, so a refused transfer leaves
//! the ledger exactly as it was.

use tracing::{info, warn};

use tally_accrual::pending_reward;

use crate::access::AdminToken;
use crate::events::{EventSink, LedgerEvent};
use crate::state::{LedgerState, PoolStats, PositionKey, UserPosition};
use crate::transfer::AssetTransfer;
use crate::{
    Amount, AssetId, LedgerError, Pool, PoolId, Result, Timestamp, UserId, REWARD_ASSET,
};

/// Staged result of settling one user in one pool.
struct Settlement {
    pool: Pool,
    position: UserPosition,
    balance: Amount,
}

/// Multi-pool reward ledger.
///
/// Generic over the custody capability `T` and the event sink `S`. All
/// mutation goes through `&mut self`; callers that share an engine must
/// serialise access to it.
#[derive(Debug)]
pub struct LedgerEngine<T, S> {
    state: LedgerState,
    transfer: T,
    sink: S,
    reward_asset: AssetId,
}

impl<T: AssetTransfer, S: EventSink> LedgerEngine<T, S> {
    /// Create an empty ledger.
    pub fn new(transfer: T, sink: S) -> Self {
        Self::from_state(LedgerState::default(), transfer, sink)
    }

    /// Resume from previously persisted state.
    pub fn from_state(state: LedgerState, transfer: T, sink: S) -> Self {
        Self {
            state,
            transfer,
            sink,
            reward_asset: REWARD_ASSET,
        }
    }

    /// Pay rewards out under `asset` instead of [`REWARD_ASSET`].
    pub fn with_reward_asset(mut self, asset: AssetId) -> Self {
        self.reward_asset = asset;
        self
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> LedgerState {
        self.state.clone()
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    pub fn transfer_mut(&mut self) -> &mut T {
        &mut self.transfer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn reward_asset(&self) -> &AssetId {
        &self.reward_asset
    }

    /// Number of registered pools.
    pub fn pool_count(&self) -> usize {
        self.state.pools.len()
    }

    /// Look up a pool.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPool`] if `pool_id` is not registered
    pub fn pool(&self, pool_id: PoolId) -> Result<&Pool> {
        self.state.pool(pool_id)
    }

    /// A user's position in a pool, if they ever deposited there.
    pub fn position(&self, pool_id: PoolId, user: &UserId) -> Option<&UserPosition> {
        self.state.position(pool_id, user)
    }

    /// Settled, claimable reward of `user`. Excludes accrual not yet swept.
    pub fn reward_balance(&self, user: &UserId) -> Amount {
        self.state.reward_balance(user)
    }

    /// Register a new pool. Ids are assigned sequentially from 0.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] if the pool id space is exhausted
    pub fn register_pool(
        &mut self,
        token: &AdminToken,
        asset: AssetId,
        reward_rate: Amount,
        now: Timestamp,
    ) -> Result<PoolId> {
        let pool_id = PoolId::try_from(self.state.pools.len())
            .map_err(|_| LedgerError::Overflow("pool id"))?;

        self.state.pools.push(Pool::new(asset, reward_rate, now));

        info!(
            pool_id,
            reward_rate,
            asset = %hex::encode(asset),
            admin = %hex::encode(token.admin()),
            "pool registered"
        );
        self.sink.emit(
            now,
            LedgerEvent::PoolRegistered {
                pool_id,
                asset,
                reward_rate,
            },
        );

        Ok(pool_id)
    }

    /// Stake `amount` of the pool's asset.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] if `amount` is 0
    /// - [`LedgerError::InvalidPool`] if `pool_id` is not registered
    /// - [`LedgerError::TransferFailed`] if custody refuses the deposit
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn deposit(
        &mut self,
        pool_id: PoolId,
        user: &UserId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let index = self.state.pool_index(pool_id)?;

        let mut settled = self.settle(index, user, now)?;
        settled.position.staked_amount = settled
            .position
            .staked_amount
            .checked_add(amount)
            .ok_or(LedgerError::Overflow("position stake"))?;
        settled.pool.add_stake(amount)?;

        if let Err(err) = self.transfer.transfer_in(&settled.pool.asset, user, amount) {
            warn!(pool_id, amount, user = %hex::encode(user), %err, "deposit transfer refused");
            return Err(err.into());
        }

        self.commit(index, user, settled);

        info!(pool_id, amount, user = %hex::encode(user), "deposited");
        self.sink.emit(
            now,
            LedgerEvent::Deposited {
                user: *user,
                pool_id,
                amount,
            },
        );
        Ok(())
    }

    /// Unstake `amount` and return it to the user.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] if `amount` is 0
    /// - [`LedgerError::InvalidPool`] if `pool_id` is not registered
    /// - [`LedgerError::InsufficientStake`] if `amount` exceeds the stake
    /// - [`LedgerError::TransferFailed`] if custody refuses the payout
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn withdraw(
        &mut self,
        pool_id: PoolId,
        user: &UserId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let index = self.state.pool_index(pool_id)?;

        let staked = self
            .position(pool_id, user)
            .map_or(0, |position| position.staked_amount);
        if staked < amount {
            return Err(LedgerError::InsufficientStake {
                requested: amount,
                staked,
            });
        }

        let mut settled = self.settle(index, user, now)?;
        settled.position.staked_amount -= amount;
        settled.pool.remove_stake(amount)?;

        if let Err(err) = self.transfer.transfer_out(&settled.pool.asset, user, amount) {
            warn!(pool_id, amount, user = %hex::encode(user), %err, "withdraw transfer refused");
            return Err(err.into());
        }

        self.commit(index, user, settled);

        info!(pool_id, amount, user = %hex::encode(user), "unstaked");
        self.sink.emit(
            now,
            LedgerEvent::Unstaked {
                user: *user,
                pool_id,
                amount,
            },
        );
        Ok(())
    }

    /// Sweep every pool the user is staked in and pay out the whole reward
    /// balance. Returns the amount paid.
    ///
    /// Positions at zero stake are skipped: their checkpoint was brought up
    /// to date when the stake last changed, so they hold nothing pending.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NoRewardsToClaim`] if the swept balance is 0
    /// - [`LedgerError::TransferFailed`] if custody refuses the payout; the
    ///   sweep and the balance reset are both discarded
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn claim_all(&mut self, user: &UserId, now: Timestamp) -> Result<Amount> {
        let mut balance = self.reward_balance(user);
        let mut swept: Vec<(usize, Pool, UserPosition)> = Vec::new();

        for (pool_id, position) in self.state.positions_of(user) {
            if position.staked_amount == 0 {
                continue;
            }
            let index = self.state.pool_index(pool_id)?;
            let mut pool = self.state.pools[index].clone();
            pool.advance(now)?;

            let pending = pending_reward(position.staked_amount, pool.accumulator, position.checkpoint)?;
            balance = balance
                .checked_add(pending)
                .ok_or(LedgerError::Overflow("reward balance"))?;

            let position = UserPosition {
                staked_amount: position.staked_amount,
                checkpoint: pool.accumulator,
            };
            swept.push((index, pool, position));
        }

        if balance == 0 {
            return Err(LedgerError::NoRewardsToClaim);
        }

        if let Err(err) = self.transfer.transfer_out(&self.reward_asset, user, balance) {
            warn!(amount = balance, user = %hex::encode(user), %err, "claim payout refused, rolled back");
            return Err(err.into());
        }

        for (index, pool, position) in swept {
            let pool_id = index as PoolId;
            self.state.pools[index] = pool;
            self.state
                .positions
                .insert(PositionKey::new(*user, pool_id), position);
        }
        self.state.balances.insert(*user, 0);

        info!(amount = balance, user = %hex::encode(user), "rewards claimed");
        self.sink.emit(
            now,
            LedgerEvent::RewardClaimed {
                user: *user,
                amount: balance,
            },
        );
        Ok(balance)
    }

    /// See [`LedgerState::pending_reward`].
    pub fn pending_reward(&self, pool_id: PoolId, user: &UserId, now: Timestamp) -> Result<Amount> {
        self.state.pending_reward(pool_id, user, now)
    }

    /// See [`LedgerState::claimable`].
    pub fn claimable(&self, user: &UserId, now: Timestamp) -> Result<Amount> {
        self.state.claimable(user, now)
    }

    /// See [`LedgerState::pool_stats`].
    pub fn pool_stats(&self, pool_id: PoolId, now: Timestamp) -> Result<PoolStats> {
        self.state.pool_stats(pool_id, now)
    }

    fn settle(&self, index: usize, user: &UserId, now: Timestamp) -> Result<Settlement> {
        let mut pool = self.state.pools[index].clone();
        pool.advance(now)?;

        let mut position = self
            .state
            .positions
            .get(&PositionKey::new(*user, index as PoolId))
            .copied()
            .unwrap_or_default();

        let pending = pending_reward(position.staked_amount, pool.accumulator, position.checkpoint)?;
        let balance = self
            .reward_balance(user)
            .checked_add(pending)
            .ok_or(LedgerError::Overflow("reward balance"))?;
        position.checkpoint = pool.accumulator;

        Ok(Settlement {
            pool,
            position,
            balance,
        })
    }

    fn commit(&mut self, index: usize, user: &UserId, settled: Settlement) {
        self.state.pools[index] = settled.pool;
        self.state
            .positions
            .insert(PositionKey::new(*user, index as PoolId), settled.position);
        self.state.balances.insert(*user, settled.balance);
    }
}
