//! Persistence for quest state.
//!
//! The engine talks to a [`PlayerStore`]: a key/value store of JSON records grouped by
//! module. [`pg::PgStore`] backs it with Postgres, [`memory::MemoryStore`] keeps it in
//! process. [`players::PlayerRepo`] layers schema normalization and per-key write
//! serialization on top.

pub mod memory;
pub mod models;
pub mod pg;
pub mod players;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("record {0} cannot be locked twice in one update")]
    SameKey(String),
}

/// Durable key/value storage of JSON records, grouped by module.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn get(&self, module: &str, key: &str) -> Result<Option<Value>, StoreError>;
    async fn replace(&self, module: &str, key: &str, record: Value) -> Result<(), StoreError>;
    async fn keys(&self, module: &str) -> Result<Vec<String>, StoreError>;
}
