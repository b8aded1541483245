//! Account registration and reference snapshot reads.

use crate::datasource::{DataSourceError, ReferenceStore};
use crate::domain::{AccountLimits, Address, Amount, ReferenceSnapshot, Timestamp};
use async_trait::async_trait;
use sqlx::Row;
use std::collections::BTreeMap;

use super::{address_key, parse_address_column, parse_amount_column, Repository};

impl Repository {
    /// Register an account or update its limits.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn register_account(
        &self,
        account: &Address,
        limits: AccountLimits,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO account_limits (account, max_spending_bps, window_secs, registered_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(account) DO UPDATE SET
                max_spending_bps = excluded.max_spending_bps,
                window_secs = excluded.window_secs
            "#,
        )
        .bind(address_key(account))
        .bind(i64::from(limits.max_spending_bps))
        .bind(limits.window_secs)
        .bind(Timestamp::now().as_secs())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load limits and published state for an account.
    ///
    /// Reads are served straight from the local store, so the snapshot is
    /// stamped with the time of the read.
    ///
    /// # Errors
    /// Returns an error if a query fails or a stored value does not decode.
    pub async fn query_reference(
        &self,
        account: &Address,
    ) -> Result<Option<ReferenceSnapshot>, sqlx::Error> {
        let key = address_key(account);

        let Some(limits_row) = sqlx::query(
            "SELECT max_spending_bps, window_secs FROM account_limits WHERE account = ?",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let max_spending_bps: i64 = limits_row.get("max_spending_bps");
        let limits = AccountLimits {
            max_spending_bps: u32::try_from(max_spending_bps).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "max_spending_bps".to_string(),
                    source: Box::new(e),
                }
            })?,
            window_secs: limits_row.get("window_secs"),
        };

        let allowance = sqlx::query("SELECT allowance FROM published_allowances WHERE account = ?")
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| parse_amount_column("allowance", row.get::<&str, _>("allowance")))
            .transpose()?
            .unwrap_or(Amount::ZERO);

        let rows = sqlx::query(
            "SELECT token, balance FROM published_balances WHERE account = ? ORDER BY token ASC",
        )
        .bind(&key)
        .fetch_all(&self.pool)
        .await?;

        let mut balances = BTreeMap::new();
        for row in rows {
            let token = parse_address_column("token", row.get::<&str, _>("token"))?;
            let balance = parse_amount_column("balance", row.get::<&str, _>("balance"))?;
            balances.insert(token, balance);
        }

        Ok(Some(ReferenceSnapshot {
            limits,
            allowance,
            balances,
            last_updated: Timestamp::now(),
        }))
    }

    /// List every registered account.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_accounts(&self) -> Result<Vec<Address>, sqlx::Error> {
        let rows = sqlx::query("SELECT account FROM account_limits ORDER BY account ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| parse_address_column("account", row.get::<&str, _>("account")))
            .collect()
    }
}

#[async_trait]
impl ReferenceStore for Repository {
    async fn fetch_reference(
        &self,
        account: &Address,
    ) -> Result<Option<ReferenceSnapshot>, DataSourceError> {
        Ok(self.query_reference(account).await?)
    }

    async fn list_accounts(&self) -> Result<Vec<Address>, DataSourceError> {
        Ok(self.query_accounts().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn limits(bps: u32) -> AccountLimits {
        AccountLimits {
            max_spending_bps: bps,
            window_secs: 86_400,
        }
    }

    #[tokio::test]
    async fn test_unknown_account_has_no_reference() {
        let (repo, _temp) = setup_repo().await;
        let reference = repo
            .query_reference(&Address::repeat_byte(0x11))
            .await
            .unwrap();
        assert!(reference.is_none());
    }

    #[tokio::test]
    async fn test_registered_account_starts_empty() {
        let (repo, _temp) = setup_repo().await;
        let account = Address::repeat_byte(0x11);
        repo.register_account(&account, limits(500)).await.unwrap();

        let reference = repo.query_reference(&account).await.unwrap().unwrap();
        assert_eq!(reference.limits, limits(500));
        assert_eq!(reference.allowance, Amount::ZERO);
        assert!(reference.balances.is_empty());
    }

    #[tokio::test]
    async fn test_register_updates_limits() {
        let (repo, _temp) = setup_repo().await;
        let account = Address::repeat_byte(0x11);
        repo.register_account(&account, limits(500)).await.unwrap();
        repo.register_account(&account, limits(250)).await.unwrap();

        let reference = repo.query_reference(&account).await.unwrap().unwrap();
        assert_eq!(reference.limits.max_spending_bps, 250);
        assert_eq!(repo.query_accounts().await.unwrap(), vec![account]);
    }
}
