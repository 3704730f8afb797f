//! In-process [`PlayerStore`] used by tests and by deployments without a database.

use super::{PlayerStore, StoreError};
use ahash::AHashMap;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<AHashMap<(String, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn get(&self, module: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&(module.to_string(), key.to_string())).cloned())
    }

    async fn replace(&self, module: &str, key: &str, record: Value) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert((module.to_string(), key.to_string()), record);
        Ok(())
    }

    async fn keys(&self, module: &str) -> Result<Vec<String>, StoreError> {
        let records = self.records.read().await;
        let mut keys: Vec<String> = records
            .keys()
            .filter(|(m, _)| m == module)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
