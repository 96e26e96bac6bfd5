//! # tally-accrual
//!
//! Per-pool reward accumulator.
//!
//! Each pool emits a constant number of reward units per second. Instead of
//! crediting every staker on every tick, the pool keeps a single
//! "reward per staked unit" counter that grows lazily whenever the pool is
//! touched. A staker's share of everything emitted since their last
//! interaction is then `stake * (counter_now - counter_then)`, computed in
//! O(1) no matter how many other stakers the pool has.
//!
//! ## Modules
//!
//! - [`pool`] - pool state and the lazy `advance` step
//! - [`reward`] - fixed-point scale and pending-reward formula

pub mod pool;
pub mod reward;

pub use pool::Pool;
pub use reward::{pending_reward, SCALE};

/// Opaque 32-byte handle of a staked asset.
pub type AssetId = [u8; 32];

/// Token amount (stake, reward) in the asset's smallest unit.
pub type Amount = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Error types for accumulator arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccrualError {
    /// An intermediate product or the result does not fit its integer width.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// Convenience result type for accrual operations.
pub type Result<T> = std::result::Result<T, AccrualError>;
