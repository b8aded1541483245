//! Stable event ordering and deduplication for deterministic replay.

use crate::domain::{Event, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// On-chain position of an event log: `(block_height, log_index)`.
///
/// Two events with the same key are the same event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct OrderKey {
    pub block_height: u64,
    pub log_index: u64,
}

impl OrderKey {
    pub fn new(block_height: u64, log_index: u64) -> Self {
        Self {
            block_height,
            log_index,
        }
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block_height, self.log_index)
    }
}

/// Replay ordering key for events.
///
/// Ordering: timestamp -> block_height -> log_index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventOrderingKey {
    /// Resolved block time (primary sort).
    pub timestamp: Timestamp,
    /// Log position (tie-breaker).
    pub order_key: OrderKey,
}

impl EventOrderingKey {
    pub fn from_event(event: &Event) -> Self {
        EventOrderingKey {
            timestamp: event.timestamp(),
            order_key: event.order_key(),
        }
    }
}

/// Sort events deterministically.
pub fn sort_events_deterministic(events: &mut [Event]) {
    events.sort_by_key(EventOrderingKey::from_event);
}

/// Merge historical events with not-yet-reflected ones into a single
/// chronological list without duplicates.
///
/// The first occurrence of an `OrderKey` wins; historical events are listed
/// first so a pending event the source already reports is dropped.
pub fn merge_events(historical: Vec<Event>, pending: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::with_capacity(historical.len() + pending.len());
    let mut merged: Vec<Event> = historical
        .into_iter()
        .chain(pending)
        .filter(|event| seen.insert(event.order_key()))
        .collect();
    sort_events_deterministic(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Amount, Transfer};

    fn transfer(ts: i64, block: u64, log: u64, amount: u64) -> Event {
        Event::Transfer(Transfer {
            account: Address::repeat_byte(0x11),
            token: Address::repeat_byte(0xaa),
            recipient: Address::repeat_byte(0x22),
            amount: Amount::from(amount),
            spending_cost: Amount::from(amount),
            timestamp: Timestamp::new(ts),
            order_key: OrderKey::new(block, log),
        })
    }

    #[test]
    fn test_sort_by_timestamp_then_block_then_log() {
        let mut events = vec![
            transfer(2000, 5, 0, 1),
            transfer(1000, 4, 1, 2),
            transfer(1000, 4, 0, 3),
            transfer(1000, 3, 9, 4),
        ];

        sort_events_deterministic(&mut events);

        let keys: Vec<_> = events.iter().map(|e| e.order_key()).collect();
        assert_eq!(
            keys,
            vec![
                OrderKey::new(3, 9),
                OrderKey::new(4, 0),
                OrderKey::new(4, 1),
                OrderKey::new(5, 0),
            ]
        );
    }

    #[test]
    fn test_merge_drops_duplicates_by_order_key() {
        let historical = vec![transfer(1000, 1, 0, 10), transfer(2000, 2, 0, 20)];
        let pending = vec![transfer(2000, 2, 0, 99), transfer(3000, 3, 0, 30)];

        let merged = merge_events(historical, pending);

        assert_eq!(merged.len(), 3);
        // historical copy of 2:0 is kept
        assert_eq!(merged[1].spending_cost(), Amount::from(20u64));
        assert_eq!(merged[2].order_key(), OrderKey::new(3, 0));
    }

    #[test]
    fn test_merge_dedups_within_one_batch() {
        let merged = merge_events(
            vec![transfer(1000, 1, 0, 10), transfer(1000, 1, 0, 10)],
            Vec::new(),
        );
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_order_key_display() {
        assert_eq!(OrderKey::new(12, 3).to_string(), "12:3");
    }
}
