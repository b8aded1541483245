//! Atomic publication of account updates.

use crate::datasource::{DataSourceError, PublishSink};
use crate::domain::{Address, Amount, Timestamp};
use crate::engine::PublishUpdate;
use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use super::{address_key, parse_amount_column, Repository};

/// One applied update, as recorded in the publish log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishLogEntry {
    pub batch_id: Uuid,
    pub allowance: Amount,
    pub balance_count: i64,
    pub published_at: Timestamp,
}

impl Repository {
    /// Apply an update in a single transaction and log it.
    ///
    /// Zero balances delete their row so the published map only holds live
    /// assets.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; nothing is applied then.
    pub async fn apply_update(&self, update: &PublishUpdate) -> Result<Uuid, sqlx::Error> {
        let key = address_key(&update.account);
        let now = Timestamp::now().as_secs();
        let batch_id = Uuid::new_v4();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO published_allowances (account, allowance, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(account) DO UPDATE SET
                allowance = excluded.allowance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key)
        .bind(update.allowance.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for change in &update.balances {
            if change.balance.is_zero() {
                sqlx::query("DELETE FROM published_balances WHERE account = ? AND token = ?")
                    .bind(&key)
                    .bind(address_key(&change.token))
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO published_balances (account, token, balance, updated_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(account, token) DO UPDATE SET
                        balance = excluded.balance,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&key)
                .bind(address_key(&change.token))
                .bind(change.balance.to_string())
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO publish_log (batch_id, account, allowance, balance_count, published_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch_id.to_string())
        .bind(&key)
        .bind(update.allowance.to_string())
        .bind(update.balances.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(batch_id)
    }

    /// Publish log for an account, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_publish_log(
        &self,
        account: &Address,
    ) -> Result<Vec<PublishLogEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT batch_id, allowance, balance_count, published_at
            FROM publish_log
            WHERE account = ?
            ORDER BY published_at ASC, rowid ASC
            "#,
        )
        .bind(address_key(account))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let batch_id: String = row.get("batch_id");
                Ok(PublishLogEntry {
                    batch_id: Uuid::parse_str(&batch_id).map_err(|e| {
                        sqlx::Error::ColumnDecode {
                            index: "batch_id".to_string(),
                            source: Box::new(e),
                        }
                    })?,
                    allowance: parse_amount_column("allowance", row.get::<&str, _>("allowance"))?,
                    balance_count: row.get("balance_count"),
                    published_at: Timestamp::new(row.get("published_at")),
                })
            })
            .collect()
    }
}

#[async_trait]
impl PublishSink for Repository {
    async fn publish(&self, update: &PublishUpdate) -> Result<(), DataSourceError> {
        self.apply_update(update).await?;
        Ok(())
    }
}
