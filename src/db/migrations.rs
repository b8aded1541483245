//! Database initialization and schema setup.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the reference store and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { configure_pragmas_conn(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    apply_schema(&pool).await?;

    info!("Reference store ready at {}", db_path);
    Ok(pool)
}

/// Apply every statement of the schema. All statements are idempotent.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema_sql = include_str!("schema.sql");

    let mut applied = 0usize;
    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
            applied += 1;
        }
    }

    info!("Applied {} schema statements", applied);
    Ok(())
}

/// Configure SQLite pragmas on each new connection.
async fn configure_pragmas_conn(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("nested")
            .join("reference.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_init_db_creates_reference_tables() {
        let (pool, _temp) = open_temp().await;

        for table in [
            "account_limits",
            "published_allowances",
            "published_balances",
            "publish_log",
        ] {
            let found: (String,) =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .unwrap_or_else(|e| panic!("table {} missing: {}", table, e));
            assert_eq!(found.0, table);
        }
    }

    #[tokio::test]
    async fn test_schema_is_reapplicable() {
        let (pool, _temp) = open_temp().await;
        apply_schema(&pool).await.expect("second schema run failed");
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let (pool, _temp) = open_temp().await;
        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);
    }
}
