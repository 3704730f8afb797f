//! Postgres-backed [`PlayerStore`]: one JSONB row per (module, key).

use super::{PlayerStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::debug;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the record table if it does not exist yet.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS quest_records (
                module TEXT NOT NULL,
                key TEXT NOT NULL,
                record JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (module, key)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PlayerStore for PgStore {
    async fn get(&self, module: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT record FROM quest_records WHERE module = $1 AND key = $2")
            .bind(module)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get::<Value, _>("record")?)),
            None => Ok(None),
        }
    }

    /// Upserts the record. A single statement, so readers never see a partial write.
    async fn replace(&self, module: &str, key: &str, record: Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO quest_records (module, key, record, updated_at) VALUES ($1, $2, $3, NOW())
             ON CONFLICT (module, key) DO UPDATE SET record = EXCLUDED.record, updated_at = NOW()",
        )
        .bind(module)
        .bind(key)
        .bind(&record)
        .execute(&self.pool)
        .await?;
        debug!(target: "quest.store", module, key, "record replaced");
        Ok(())
    }

    async fn keys(&self, module: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT key FROM quest_records WHERE module = $1 ORDER BY key")
            .bind(module)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("key").map_err(StoreError::from))
            .collect()
    }
}
