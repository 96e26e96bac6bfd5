//! Fixed-point scale and the pending-reward formula.
//!
//! ## Formula
//!
//! ```text
//! pending = staked * (accumulator - checkpoint) / SCALE
//! ```
//!
//! Division truncates, so each settlement may under-pay by at most one unit.
//! The remainder stays undistributed.

use crate::{AccrualError, Amount, Result};

/// Fixed-point scale applied to the reward-per-staked-unit accumulator (1e18).
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Reward earned by `staked` units between two accumulator readings.
///
/// A `checkpoint` ahead of `accumulator` cannot happen for a well-formed
/// position; it is treated as zero growth.
///
/// # Errors
///
/// - [`AccrualError::Overflow`] if the product exceeds `u128` or the result
///   does not fit an [`Amount`]
pub fn pending_reward(staked: Amount, accumulator: u128, checkpoint: u128) -> Result<Amount> {
    let growth = accumulator.saturating_sub(checkpoint);
    if staked == 0 || growth == 0 {
        return Ok(0);
    }

    let scaled = u128::from(staked)
        .checked_mul(growth)
        .ok_or(AccrualError::Overflow("pending reward product"))?;

    Amount::try_from(scaled / SCALE).map_err(|_| AccrualError::Overflow("pending reward amount"))
}
