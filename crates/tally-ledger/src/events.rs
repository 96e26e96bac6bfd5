//! Ledger events.
//!
//! Delivery is best-effort and plays no part in correctness: sinks cannot
//! fail an operation.

use serde::{Deserialize, Serialize};

use crate::{Amount, AssetId, PoolId, Timestamp, UserId};

/// A completed ledger operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    PoolRegistered {
        pool_id: PoolId,
        asset: AssetId,
        reward_rate: Amount,
    },
    Deposited {
        user: UserId,
        pool_id: PoolId,
        amount: Amount,
    },
    Unstaked {
        user: UserId,
        pool_id: PoolId,
        amount: Amount,
    },
    RewardClaimed {
        user: UserId,
        amount: Amount,
    },
}

impl LedgerEvent {
    /// Stable event name, used for journaling.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::PoolRegistered { .. } => "PoolRegistered",
            LedgerEvent::Deposited { .. } => "Deposited",
            LedgerEvent::Unstaked { .. } => "Unstaked",
            LedgerEvent::RewardClaimed { .. } => "RewardClaimed",
        }
    }

    /// The user the event concerns, if any.
    pub fn user(&self) -> Option<&UserId> {
        match self {
            LedgerEvent::PoolRegistered { .. } => None,
            LedgerEvent::Deposited { user, .. }
            | LedgerEvent::Unstaked { user, .. }
            | LedgerEvent::RewardClaimed { user, .. } => Some(user),
        }
    }
}

/// Append-only receiver of ledger events.
pub trait EventSink {
    /// Accept an event that happened at `at`.
    fn emit(&mut self, at: Timestamp, event: LedgerEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _at: Timestamp, _event: LedgerEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Events in emission order.
    pub events: Vec<(Timestamp, LedgerEvent)>,
}

impl RecordingSink {
    /// Drain the recorded events.
    pub fn take(&mut self) -> Vec<(Timestamp, LedgerEvent)> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, at: Timestamp, event: LedgerEvent) {
        self.events.push((at, event));
    }
}
