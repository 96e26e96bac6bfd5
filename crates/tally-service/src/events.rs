//! Event broadcast.
//!
//! Ledger events are published to subscribers after the state change they
//! describe has been applied. Each subscriber has an independent buffer;
//! a subscriber that falls behind by more than the configured capacity
//! misses events rather than slowing the ledger down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tally_ledger::{LedgerEvent, Timestamp};

/// A published ledger event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "Deposited", "RewardClaimed").
    pub event_type: String,
    /// Position of the event in publication order, from 1.
    pub sequence: u64,
    /// Unix timestamp of the operation.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only these event types.
    pub event_types: Option<Vec<String>>,
    /// Only events concerning these hex-encoded users.
    pub users: Option<Vec<String>>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish a ledger event to all subscribers.
    pub fn publish(&self, at: Timestamp, event: &LedgerEvent) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(event = event.name(), "event payload encoding failed: {e}");
                return;
            }
        };
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(Event {
            event_type: event.name().to_string(),
            sequence,
            timestamp: at,
            payload,
        });
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Subscribe to the events that pass `filter`.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }
}

/// Receiver that only yields events matching its filter.
pub struct EventSubscription {
    receiver: broadcast::Receiver<Event>,
    filter: EventFilter,
}

impl EventSubscription {
    /// Wait for the next matching event.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Next matching event already buffered, without waiting.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == &event.event_type) {
                return false;
            }
        }

        if let Some(ref users) = self.users {
            let Some(user) = event.payload.get("user").and_then(user_hex) else {
                return false;
            };
            if !users.iter().any(|u| u.eq_ignore_ascii_case(&user)) {
                return false;
            }
        }

        true
    }
}

/// Hex-encode a user id serialized as a JSON byte array.
fn user_hex(value: &serde_json::Value) -> Option<String> {
    let bytes = value
        .as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()?;
    Some(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposited(user: u8) -> LedgerEvent {
        LedgerEvent::Deposited {
            user: [user; 32],
            pool_id: 0,
            amount: 10,
        }
    }

    #[test]
    fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(1000, &deposited(1));

        let event = rx.try_recv().expect("receive event");
        assert_eq!(event.event_type, "Deposited");
        assert_eq!(event.sequence, 1);
        assert_eq!(event.payload["type"], "deposited");
        assert_eq!(event.payload["amount"], 10);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(1, &deposited(1));
        bus.publish(2, &deposited(1));

        let mut rx = bus.subscribe();
        bus.publish(3, &deposited(1));
        assert_eq!(rx.try_recv().expect("third").sequence, 3);
    }

    #[test]
    fn test_subscription_skips_unmatched() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe_filtered(EventFilter {
            event_types: Some(vec!["Deposited".to_string()]),
            users: Some(vec![hex::encode([2u8; 32])]),
        });

        bus.publish(1, &deposited(1));
        bus.publish(
            2,
            &LedgerEvent::RewardClaimed {
                user: [2; 32],
                amount: 3,
            },
        );
        bus.publish(3, &deposited(2));

        let event = sub.try_recv().expect("matching deposit");
        assert_eq!(event.timestamp, 3);
        assert_eq!(event.sequence, 3);
        assert!(matches!(
            sub.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_subscription_recv_waits_for_match() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe_filtered(EventFilter {
            event_types: Some(vec!["RewardClaimed".to_string()]),
            users: None,
        });

        let publisher = bus.clone();
        let handle = tokio::spawn(async move {
            publisher.publish(1, &deposited(1));
            publisher.publish(
                2,
                &LedgerEvent::RewardClaimed {
                    user: [1; 32],
                    amount: 9,
                },
            );
        });

        let event = sub.recv().await.expect("claim");
        assert_eq!(event.event_type, "RewardClaimed");
        assert_eq!(event.payload["amount"], 9);
        handle.await.expect("publisher");
    }

    #[test]
    fn test_filter_by_user() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(1, &deposited(1));
        bus.publish(2, &deposited(2));
        bus.publish(
            3,
            &LedgerEvent::PoolRegistered {
                pool_id: 1,
                asset: [9; 32],
                reward_rate: 1,
            },
        );

        let filter = EventFilter {
            event_types: None,
            users: Some(vec![hex::encode([2u8; 32])]),
        };
        let matched: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| filter.matches(e))
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(matched, vec![2]);
    }

    #[test]
    fn test_filter_by_type() {
        let filter = EventFilter {
            event_types: Some(vec!["RewardClaimed".to_string()]),
            users: None,
        };
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.publish(
            1,
            &LedgerEvent::RewardClaimed {
                user: [1; 32],
                amount: 3,
            },
        );
        bus.publish(2, &deposited(1));

        assert!(filter.matches(&rx.try_recv().expect("claim")));
        assert!(!filter.matches(&rx.try_recv().expect("deposit")));
    }
}
