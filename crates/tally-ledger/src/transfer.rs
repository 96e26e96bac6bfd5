//! Asset custody capability.
//!
//! The ledger never holds funds itself. Stake moves into custody on deposit
//! and back out on withdraw; rewards move out of the reward reserve on
//! claim. Implementations must be atomic: a failed transfer moves nothing.

use std::collections::HashMap;

use crate::{Amount, AssetId, UserId};

/// Reasons a custody transfer can be refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Source balance too small.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Amount requested.
        needed: Amount,
        /// Amount available at the source.
        available: Amount,
    },

    /// Custodian refused for another reason.
    #[error("rejected by custodian: {0}")]
    Rejected(String),
}

/// Moves assets between users and custody.
pub trait AssetTransfer {
    /// Move `amount` of `asset` from `from` into custody.
    fn transfer_in(&mut self, asset: &AssetId, from: &UserId, amount: Amount)
        -> Result<(), TransferError>;

    /// Move `amount` of `asset` out of custody to `to`.
    fn transfer_out(&mut self, asset: &AssetId, to: &UserId, amount: Amount)
        -> Result<(), TransferError>;
}

impl<T: AssetTransfer + ?Sized> AssetTransfer for Box<T> {
    fn transfer_in(
        &mut self,
        asset: &AssetId,
        from: &UserId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        (**self).transfer_in(asset, from, amount)
    }

    fn transfer_out(
        &mut self,
        asset: &AssetId,
        to: &UserId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        (**self).transfer_out(asset, to, amount)
    }
}

/// In-process custodian keeping wallet and custody balances in maps.
///
/// Used by tests and local runs in place of a real custody backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    wallets: HashMap<(AssetId, UserId), Amount>,
    held: HashMap<AssetId, Amount>,
    frozen: bool,
}

impl InMemoryCustody {
    /// Create an empty custodian.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a user's wallet with `amount` of `asset`.
    pub fn mint(&mut self, asset: AssetId, user: UserId, amount: Amount) {
        let entry = self.wallets.entry((asset, user)).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Top up the custody balance of `asset` (e.g. the reward reserve).
    pub fn fund(&mut self, asset: AssetId, amount: Amount) {
        let entry = self.held.entry(asset).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Refuse every transfer while frozen.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Wallet balance of `user` in `asset`.
    pub fn wallet(&self, asset: &AssetId, user: &UserId) -> Amount {
        self.wallets.get(&(*asset, *user)).copied().unwrap_or(0)
    }

    /// Custody balance of `asset`.
    pub fn held(&self, asset: &AssetId) -> Amount {
        self.held.get(asset).copied().unwrap_or(0)
    }

    fn check_open(&self) -> Result<(), TransferError> {
        if self.frozen {
            return Err(TransferError::Rejected("custody frozen".to_string()));
        }
        Ok(())
    }
}

impl AssetTransfer for InMemoryCustody {
    fn transfer_in(
        &mut self,
        asset: &AssetId,
        from: &UserId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.check_open()?;
        let available = self.wallet(asset, from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                needed: amount,
                available,
            });
        }
        let held = self
            .held(asset)
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("custody balance overflow".to_string()))?;

        self.wallets.insert((*asset, *from), available - amount);
        self.held.insert(*asset, held);
        Ok(())
    }

    fn transfer_out(
        &mut self,
        asset: &AssetId,
        to: &UserId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.check_open()?;
        let available = self.held(asset);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                needed: amount,
                available,
            });
        }
        let wallet = self
            .wallet(asset, to)
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("wallet balance overflow".to_string()))?;

        self.held.insert(*asset, available - amount);
        self.wallets.insert((*asset, *to), wallet);
        Ok(())
    }
}
