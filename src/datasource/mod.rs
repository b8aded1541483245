//! External collaborators: event history, block times, published state,
//! publication and valuation.

use crate::domain::{Address, Amount, RawEvent, ReferenceSnapshot, Timestamp};
use crate::engine::PublishUpdate;
use async_trait::async_trait;
use std::fmt;

pub mod indexer;
pub mod mock;

pub use indexer::IndexerDataSource;
pub use mock::MockDataSource;

/// Source of historical sub-account activity.
#[async_trait]
pub trait EventSource: Send + Sync + fmt::Debug {
    /// Fetch raw events for an account whose blocks fall within a time range.
    ///
    /// # Arguments
    /// * `account` - Sub-account address
    /// * `from` - Start time (inclusive)
    /// * `to` - End time (inclusive)
    ///
    /// # Returns
    /// Raw events in any order, possibly with duplicates
    async fn fetch_events(
        &self,
        account: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<RawEvent>, DataSourceError>;
}

/// Resolves a block reference to its real-world time.
#[async_trait]
pub trait BlockClock: Send + Sync + fmt::Debug {
    async fn block_timestamp(&self, block_height: u64) -> Result<Timestamp, DataSourceError>;
}

/// Authoritative store read side.
#[async_trait]
pub trait ReferenceStore: Send + Sync + fmt::Debug {
    /// Current published state and limits, or `None` for an unknown account.
    async fn fetch_reference(
        &self,
        account: &Address,
    ) -> Result<Option<ReferenceSnapshot>, DataSourceError>;

    /// Every account with limits configured.
    async fn list_accounts(&self) -> Result<Vec<Address>, DataSourceError>;
}

/// Authoritative store write side.
#[async_trait]
pub trait PublishSink: Send + Sync + fmt::Debug {
    /// Apply one batched update atomically.
    async fn publish(&self, update: &PublishUpdate) -> Result<(), DataSourceError>;
}

/// Portfolio valuation in the common unit of account.
#[async_trait]
pub trait ValuationSource: Send + Sync + fmt::Debug {
    async fn portfolio_value(&self, account: &Address) -> Result<Amount, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    /// Local store failure
    Storage(String),
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Storage(msg) => write!(f, "Storage error: {}", msg),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

impl From<sqlx::Error> for DataSourceError {
    fn from(err: sqlx::Error) -> Self {
        DataSourceError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = DataSourceError::HttpError {
            status: 429,
            message: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 429: Too many requests");

        let err = DataSourceError::ParseError("invalid JSON".to_string());
        assert_eq!(err.to_string(), "Parse error: invalid JSON");

        let err = DataSourceError::RateLimited;
        assert_eq!(err.to_string(), "Rate limited");

        let err = DataSourceError::Storage("database is locked".to_string());
        assert_eq!(err.to_string(), "Storage error: database is locked");
    }

    #[test]
    fn test_sqlx_error_maps_to_storage() {
        let err: DataSourceError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DataSourceError::Storage(_)));
    }
}
