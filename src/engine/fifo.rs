//! Per-asset FIFO queue of acquired balance with time-based expiry.

use super::{AcquiredEntry, InvariantViolation};
use crate::domain::{Amount, Timestamp};
use std::collections::VecDeque;

/// Acquired entries for one (account, asset) pair, oldest first.
///
/// Invariant: entries are in non-decreasing `acquired_at` order and every
/// entry has a non-zero amount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquiredQueue {
    entries: VecDeque<AcquiredEntry>,
}

/// Result of consuming from an [`AcquiredQueue`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consumption {
    /// Live entries (or parts of entries) that were taken, oldest first.
    pub consumed: Vec<AcquiredEntry>,
    /// Part of the request the queue could not cover. Drawn from ordinary balance.
    pub leftover: Amount,
}

impl Consumption {
    /// Sum of consumed amounts.
    pub fn total(&self) -> Amount {
        // Each consumed amount is carved out of the request, so the sum is
        // bounded by it and cannot overflow.
        self.consumed
            .iter()
            .fold(Amount::ZERO, |acc, entry| acc + entry.amount)
    }

    /// Oldest acquisition time among the consumed entries.
    pub fn oldest_acquired_at(&self) -> Option<Timestamp> {
        self.consumed.iter().map(|entry| entry.acquired_at).min()
    }
}

impl AcquiredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> impl Iterator<Item = &AcquiredEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume up to `amount` oldest-first as of `as_at`.
    ///
    /// Entries that had already expired at `as_at` are dropped on the way and
    /// are not reported as consumed.
    pub fn consume(&mut self, amount: Amount, as_at: Timestamp, window_secs: i64) -> Consumption {
        let mut remaining = amount;
        let mut consumed = Vec::new();

        while !remaining.is_zero() {
            let Some(head) = self.entries.front_mut() else {
                break;
            };

            if head.acquired_at.has_expired(as_at, window_secs) {
                self.entries.pop_front();
                continue;
            }

            if head.amount <= remaining {
                remaining -= head.amount;
                consumed.push(*head);
                self.entries.pop_front();
            } else {
                head.amount -= remaining;
                consumed.push(AcquiredEntry {
                    amount: remaining,
                    acquired_at: head.acquired_at,
                });
                remaining = Amount::ZERO;
            }
        }

        Consumption {
            consumed,
            leftover: remaining,
        }
    }

    /// Add acquired balance. Zero amounts are ignored.
    ///
    /// Entries normally arrive in time order and land at the tail. An output
    /// inheriting an older provenance timestamp is slotted in behind every
    /// entry acquired at or before it, so head-first consumption and pruning
    /// still see the oldest entry first.
    pub fn append(&mut self, amount: Amount, acquired_at: Timestamp) {
        if amount.is_zero() {
            return;
        }

        let entry = AcquiredEntry {
            amount,
            acquired_at,
        };
        match self.entries.back() {
            Some(tail) if tail.acquired_at > acquired_at => {
                let idx = self
                    .entries
                    .partition_point(|existing| existing.acquired_at <= acquired_at);
                self.entries.insert(idx, entry);
            }
            _ => self.entries.push_back(entry),
        }
    }

    /// Drop entries that expired before `now` and return what is left.
    pub fn prune_and_sum(
        &mut self,
        now: Timestamp,
        window_secs: i64,
    ) -> Result<Amount, InvariantViolation> {
        while self
            .entries
            .front()
            .is_some_and(|head| head.acquired_at.has_expired(now, window_secs))
        {
            self.entries.pop_front();
        }

        self.entries.iter().try_fold(Amount::ZERO, |acc, entry| {
            acc.checked_add(entry.amount)
                .ok_or(InvariantViolation::Overflow("summing acquired balance"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LARGE_WINDOW: i64 = 1_000_000;

    fn amt(v: u64) -> Amount {
        Amount::from(v)
    }

    fn ts(v: i64) -> Timestamp {
        Timestamp::new(v)
    }

    fn entry(amount: u64, at: i64) -> AcquiredEntry {
        AcquiredEntry {
            amount: amt(amount),
            acquired_at: ts(at),
        }
    }

    fn queue_of(items: &[(u64, i64)]) -> AcquiredQueue {
        let mut queue = AcquiredQueue::new();
        for (amount, at) in items {
            queue.append(amt(*amount), ts(*at));
        }
        queue
    }

    #[test]
    fn test_consume_is_fifo_with_partial_carve() {
        let mut queue = queue_of(&[(100, 1000), (50, 2000)]);

        let consumption = queue.consume(amt(120), ts(2500), LARGE_WINDOW);

        assert_eq!(consumption.consumed, vec![entry(100, 1000), entry(20, 2000)]);
        assert_eq!(consumption.leftover, Amount::ZERO);
        assert_eq!(consumption.total(), amt(120));
        assert_eq!(consumption.oldest_acquired_at(), Some(ts(1000)));
        assert_eq!(queue.entries().copied().collect::<Vec<_>>(), vec![entry(30, 2000)]);
    }

    #[test]
    fn test_consume_returns_leftover_when_exhausted() {
        let mut queue = queue_of(&[(40, 1000)]);

        let consumption = queue.consume(amt(100), ts(1500), LARGE_WINDOW);

        assert_eq!(consumption.total(), amt(40));
        assert_eq!(consumption.leftover, amt(60));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_consume_skips_entries_expired_at_event_time() {
        let mut queue = queue_of(&[(100, 0), (50, 150)]);

        let consumption = queue.consume(amt(70), ts(200), 100);

        assert_eq!(consumption.consumed, vec![entry(50, 150)]);
        assert_eq!(consumption.leftover, amt(20));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_consume_uses_same_edge_as_pruning() {
        let mut queue = queue_of(&[(100, 100), (100, 101)]);

        let consumption = queue.consume(amt(10), ts(200), 100);

        assert_eq!(consumption.consumed, vec![entry(10, 101)]);
        assert_eq!(queue.entries().copied().collect::<Vec<_>>(), vec![entry(90, 101)]);
    }

    #[test]
    fn test_consume_zero_is_noop() {
        let mut queue = queue_of(&[(100, 0)]);
        let consumption = queue.consume(Amount::ZERO, ts(10_000), 1);
        assert!(consumption.consumed.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_append_ignores_zero() {
        let mut queue = AcquiredQueue::new();
        queue.append(Amount::ZERO, ts(5));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_append_keeps_acquisition_order() {
        let queue = queue_of(&[(10, 1000), (20, 3000), (30, 2000), (40, 3000)]);

        let order: Vec<_> = queue.entries().map(|e| e.acquired_at.as_secs()).collect();
        assert_eq!(order, vec![1000, 2000, 3000, 3000]);
        let amounts: Vec<_> = queue.entries().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![amt(10), amt(30), amt(20), amt(40)]);
    }

    #[test]
    fn test_entry_expires_once_age_reaches_window() {
        let mut queue = queue_of(&[(100, 0)]);
        assert_eq!(queue.prune_and_sum(ts(99), 100).unwrap(), amt(100));
        assert_eq!(queue.prune_and_sum(ts(100), 100).unwrap(), Amount::ZERO);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_prune_and_sum_sums_live_entries() {
        let mut queue = queue_of(&[(5, 10), (7, 51), (11, 90)]);
        assert_eq!(queue.prune_and_sum(ts(100), 50).unwrap(), amt(18));
        assert_eq!(queue.len(), 2);
    }
}
