//! # tally-ledger
//!
//! Multi-pool reward ledger built on [`tally_accrual`].
//!
//! The [`engine::LedgerEngine`] keeps one accumulator-backed pool per staked
//! asset, a stake + checkpoint per (user, pool), and a claimable reward
//! balance per user. Every operation advances the pool it touches, settles
//! the caller's pending reward, then applies its effect. Operations are
//! all-or-nothing: work happens on staged copies that are only written back
//! once the external transfer has succeeded.
//!
//! ## Modules
//!
//! - [`engine`] - deposit, withdraw, claim and pool registration
//! - [`state`] - ledger state, positions and the conservation check
//! - [`transfer`] - asset custody capability and an in-memory custodian
//! - [`access`] - admin capability for pool registration
//! - [`events`] - ledger events and sinks
//! - [`clock`] - time sources

pub mod access;
pub mod clock;
pub mod engine;
pub mod events;
pub mod state;
pub mod transfer;

pub use access::{AccessControl, AdminList, AdminToken};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::LedgerEngine;
pub use events::{EventSink, LedgerEvent, NullSink, RecordingSink};
pub use state::{LedgerState, PoolStats, PositionKey, UserPosition};
pub use tally_accrual::{AccrualError, Amount, AssetId, Pool, Timestamp, SCALE};
pub use transfer::{AssetTransfer, InMemoryCustody, TransferError};

/// Opaque 32-byte user identifier.
pub type UserId = [u8; 32];

/// Sequential pool identifier, assigned from 0 and never reused.
pub type PoolId = u64;

/// Asset handle under which reward payouts are moved by default.
pub const REWARD_ASSET: AssetId = [0u8; 32];

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No pool with this id has been registered.
    #[error("invalid pool {pool_id}: {pool_count} pools registered")]
    InvalidPool {
        /// The requested pool id.
        pool_id: PoolId,
        /// Number of registered pools.
        pool_count: usize,
    },

    /// Deposit or withdraw called with amount 0.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Withdraw exceeds the caller's stake.
    #[error("insufficient stake: requested {requested}, staked {staked}")]
    InsufficientStake {
        /// Amount requested.
        requested: Amount,
        /// Amount currently staked.
        staked: Amount,
    },

    /// Claim with a zero reward balance.
    #[error("no rewards to claim")]
    NoRewardsToClaim,

    /// The custody collaborator refused to move funds.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// Arithmetic exceeded the representable range.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Caller lacks the admin capability.
    #[error("caller {0} is not an administrator")]
    Unauthorized(String),
}

impl From<AccrualError> for LedgerError {
    fn from(err: AccrualError) -> Self {
        match err {
            AccrualError::Overflow(what) => LedgerError::Overflow(what),
        }
    }
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
