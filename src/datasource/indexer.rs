//! HTTP indexer client implementation.

use super::{BlockClock, DataSourceError, EventSource, ValuationSource};
use crate::domain::{Address, Amount, RawEvent, Timestamp};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Indexer data source speaking the JSON query API.
#[derive(Debug, Clone)]
pub struct IndexerDataSource {
    client: Client,
    base_url: String,
}

impl IndexerDataSource {
    /// Create a new indexer data source.
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn post_query(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, DataSourceError> {
        let url = format!("{}/query", self.base_url.trim_end_matches('/'));
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl EventSource for IndexerDataSource {
    async fn fetch_events(
        &self,
        account: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<RawEvent>, DataSourceError> {
        debug!(
            "Fetching events for account={}, from={}, to={}",
            account, from, to
        );

        let payload = serde_json::json!({
            "type": "subAccountEvents",
            "account": account.to_string(),
            "startTime": from.as_secs(),
            "endTime": to.as_secs()
        });

        let response = self.post_query(payload).await?;
        parse_events(&response)
    }
}

#[async_trait]
impl BlockClock for IndexerDataSource {
    async fn block_timestamp(&self, block_height: u64) -> Result<Timestamp, DataSourceError> {
        let payload = serde_json::json!({
            "type": "blockTimestamp",
            "block": block_height
        });

        let response = self.post_query(payload).await?;
        parse_block_timestamp(&response)
    }
}

#[async_trait]
impl ValuationSource for IndexerDataSource {
    async fn portfolio_value(&self, account: &Address) -> Result<Amount, DataSourceError> {
        debug!("Fetching portfolio value for account={}", account);

        let payload = serde_json::json!({
            "type": "portfolioValue",
            "account": account.to_string()
        });

        let response = self.post_query(payload).await?;
        parse_portfolio_value(&response)
    }
}

fn parse_events(response: &serde_json::Value) -> Result<Vec<RawEvent>, DataSourceError> {
    let events_json = response
        .as_array()
        .ok_or_else(|| DataSourceError::ParseError("Expected array response".to_string()))?;

    let mut events = Vec::with_capacity(events_json.len());
    for event_json in events_json {
        match serde_json::from_value::<RawEvent>(event_json.clone()) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!("Skipping unparseable event record: {}", e);
            }
        }
    }

    Ok(events)
}

fn parse_block_timestamp(response: &serde_json::Value) -> Result<Timestamp, DataSourceError> {
    response
        .get("timestamp")
        .and_then(|v| v.as_i64())
        .map(Timestamp::new)
        .ok_or_else(|| DataSourceError::ParseError("Missing timestamp field".to_string()))
}

fn parse_portfolio_value(response: &serde_json::Value) -> Result<Amount, DataSourceError> {
    let value_str = response
        .get("value")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError("Missing value field".to_string()))?;
    Amount::from_str(value_str)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid value: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events_skips_unparseable_records() {
        let response = serde_json::json!([
            {
                "eventType": "transfer",
                "account": "0x1111111111111111111111111111111111111111",
                "blockNumber": 10,
                "logIndex": 2,
                "token": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "recipient": "0x2222222222222222222222222222222222222222",
                "amount": "100",
                "spendingCost": "100"
            },
            { "blockNumber": "not-a-number" }
        ]);

        let events = parse_events(&response).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, Some(10));
        assert_eq!(events[0].amount.as_deref(), Some("100"));
    }

    #[test]
    fn test_parse_events_requires_array() {
        let err = parse_events(&serde_json::json!({"events": []})).unwrap_err();
        assert!(matches!(err, DataSourceError::ParseError(_)));
    }

    #[test]
    fn test_parse_block_timestamp() {
        let ts = parse_block_timestamp(&serde_json::json!({"timestamp": 1_700_000_000})).unwrap();
        assert_eq!(ts, Timestamp::new(1_700_000_000));
        assert!(parse_block_timestamp(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_parse_portfolio_value() {
        let value = parse_portfolio_value(&serde_json::json!({"value": "250000000000"})).unwrap();
        assert_eq!(value, Amount::from(250_000_000_000u64));
        assert!(parse_portfolio_value(&serde_json::json!({"value": "abc"})).is_err());
    }
}
