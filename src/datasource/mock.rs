//! Mock data source for testing without network calls.

use super::{
    BlockClock, DataSourceError, EventSource, PublishSink, ReferenceStore, ValuationSource,
};
use crate::domain::{Address, Amount, RawEvent, ReferenceSnapshot, Timestamp};
use crate::engine::PublishUpdate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock data source that returns predefined test data.
///
/// Block heights resolve to `block_times` entries, or to `block * seconds_per_block`
/// when no explicit time was set. Publishing applies the update to the held
/// reference snapshot so consecutive runs see their own writes.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    events: Vec<RawEvent>,
    block_times: HashMap<u64, Timestamp>,
    seconds_per_block: i64,
    references: Arc<Mutex<HashMap<Address, ReferenceSnapshot>>>,
    valuations: HashMap<Address, Amount>,
    published: Arc<Mutex<Vec<PublishUpdate>>>,
    unavailable: bool,
}

impl MockDataSource {
    /// Create a new mock data source with empty data.
    pub fn new() -> Self {
        Self {
            seconds_per_block: 1,
            ..Default::default()
        }
    }

    /// Add a raw event to the mock history.
    pub fn with_event(mut self, event: RawEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Add multiple raw events to the mock history.
    pub fn with_events(mut self, events: Vec<RawEvent>) -> Self {
        self.events.extend(events);
        self
    }

    /// Pin the timestamp of a block.
    pub fn with_block_time(mut self, block_height: u64, timestamp: Timestamp) -> Self {
        self.block_times.insert(block_height, timestamp);
        self
    }

    /// Set the fallback block interval.
    pub fn with_seconds_per_block(mut self, seconds: i64) -> Self {
        self.seconds_per_block = seconds;
        self
    }

    /// Register an account with its published snapshot.
    pub fn with_reference(self, account: Address, snapshot: ReferenceSnapshot) -> Self {
        self.lock_references().insert(account, snapshot);
        self
    }

    /// Set the portfolio value of an account.
    pub fn with_valuation(mut self, account: Address, value: Amount) -> Self {
        self.valuations.insert(account, value);
        self
    }

    /// Make every call fail as if the upstream were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Updates received so far.
    pub fn published(&self) -> Vec<PublishUpdate> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Current snapshot held for an account.
    pub fn reference(&self, account: &Address) -> Option<ReferenceSnapshot> {
        self.lock_references().get(account).cloned()
    }

    fn lock_references(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<Address, ReferenceSnapshot>> {
        self.references
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), DataSourceError> {
        if self.unavailable {
            return Err(DataSourceError::NetworkError("mock upstream down".to_string()));
        }
        Ok(())
    }

    fn resolve_block(&self, block_height: u64) -> Timestamp {
        self.block_times
            .get(&block_height)
            .copied()
            .unwrap_or_else(|| Timestamp::new(block_height as i64 * self.seconds_per_block))
    }
}

#[async_trait]
impl EventSource for MockDataSource {
    async fn fetch_events(
        &self,
        account: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<RawEvent>, DataSourceError> {
        self.check_available()?;

        Ok(self
            .events
            .iter()
            .filter(|e| matches!(e.account(), Ok(a) if a == *account))
            .filter(|e| {
                e.block_number
                    .map(|b| {
                        let ts = self.resolve_block(b);
                        ts >= from && ts <= to
                    })
                    // records without a block are handed through for the
                    // reconciler to reject
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BlockClock for MockDataSource {
    async fn block_timestamp(&self, block_height: u64) -> Result<Timestamp, DataSourceError> {
        self.check_available()?;
        Ok(self.resolve_block(block_height))
    }
}

#[async_trait]
impl ReferenceStore for MockDataSource {
    async fn fetch_reference(
        &self,
        account: &Address,
    ) -> Result<Option<ReferenceSnapshot>, DataSourceError> {
        self.check_available()?;
        Ok(self.reference(account))
    }

    async fn list_accounts(&self) -> Result<Vec<Address>, DataSourceError> {
        self.check_available()?;
        let mut accounts: Vec<Address> = self.lock_references().keys().copied().collect();
        accounts.sort();
        Ok(accounts)
    }
}

#[async_trait]
impl PublishSink for MockDataSource {
    async fn publish(&self, update: &PublishUpdate) -> Result<(), DataSourceError> {
        self.check_available()?;

        {
            let mut references = self.lock_references();
            let snapshot = references.get_mut(&update.account).ok_or_else(|| {
                DataSourceError::Other(format!("unknown account {}", update.account))
            })?;
            snapshot.allowance = update.allowance;
            for change in &update.balances {
                if change.balance.is_zero() {
                    snapshot.balances.remove(&change.token);
                } else {
                    snapshot.balances.insert(change.token, change.balance);
                }
            }
        }

        self.published
            .lock()
            .map_err(|_| DataSourceError::Other("publish log poisoned".to_string()))?
            .push(update.clone());
        Ok(())
    }
}

#[async_trait]
impl ValuationSource for MockDataSource {
    async fn portfolio_value(&self, account: &Address) -> Result<Amount, DataSourceError> {
        self.check_available()?;
        self.valuations
            .get(account)
            .copied()
            .ok_or_else(|| DataSourceError::Other(format!("no valuation for {}", account)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountLimits;
    use crate::engine::BalanceChange;

    fn account() -> Address {
        Address::repeat_byte(0x11)
    }

    fn raw_transfer(block: u64) -> RawEvent {
        RawEvent {
            event_type: Some("transfer".to_string()),
            account: Some(account().to_string()),
            block_number: Some(block),
            log_index: Some(0),
            token: Some(Address::repeat_byte(0xaa).to_string()),
            recipient: Some(Address::repeat_byte(0x22).to_string()),
            amount: Some("1".to_string()),
            ..Default::default()
        }
    }

    fn limits() -> AccountLimits {
        AccountLimits {
            max_spending_bps: 500,
            window_secs: 100,
        }
    }

    #[tokio::test]
    async fn test_mock_fetch_events_filters_by_account_and_time() {
        let mut other = raw_transfer(5);
        other.account = Some(Address::repeat_byte(0x33).to_string());

        let mock = MockDataSource::new()
            .with_seconds_per_block(10)
            .with_events(vec![raw_transfer(5), raw_transfer(50), other]);

        let events = mock
            .fetch_events(&account(), Timestamp::new(0), Timestamp::new(100))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, Some(5));
    }

    #[tokio::test]
    async fn test_mock_block_time_override() {
        let mock = MockDataSource::new().with_block_time(7, Timestamp::new(1234));
        assert_eq!(mock.block_timestamp(7).await.unwrap(), Timestamp::new(1234));
        assert_eq!(mock.block_timestamp(8).await.unwrap(), Timestamp::new(8));
    }

    #[tokio::test]
    async fn test_mock_publish_updates_reference() {
        let token = Address::repeat_byte(0xaa);
        let mut snapshot = ReferenceSnapshot::empty(limits(), Timestamp::new(0));
        snapshot.balances.insert(token, Amount::from(50u64));
        let mock = MockDataSource::new().with_reference(account(), snapshot);

        let update = PublishUpdate {
            account: account(),
            allowance: Amount::from(7u64),
            balances: vec![BalanceChange {
                token,
                balance: Amount::ZERO,
            }],
        };
        mock.publish(&update).await.unwrap();

        let reference = mock.reference(&account()).unwrap();
        assert_eq!(reference.allowance, Amount::from(7u64));
        assert!(reference.balances.is_empty());
        assert_eq!(mock.published(), vec![update]);
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let mock = MockDataSource::new().unavailable();
        assert!(mock.portfolio_value(&account()).await.is_err());
        assert!(mock.list_accounts().await.is_err());
    }
}
