//! Player record access: normalize-on-load plus serialized read-modify-write per player.
//!
//! Every mutation goes through [`PlayerRepo::update`] (or [`PlayerRepo::update_pair`]),
//! which holds that player's entry in the lock table for the whole get/modify/replace.
//! The locks are not reentrant: never call `update` for a key from inside an `update`
//! closure for the same key.

use super::models::{PlayerRecord, normalize_player};
use super::{PlayerStore, StoreError};
use crate::config::QuestConfig;
use crate::constants::PLAYERS_MODULE;
use crate::quest::clock::Clock;
use crate::quest::leveling::XpCurve;
use ahash::AHashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Entries are pruned once the table grows past this and nobody holds them.
const LOCK_TABLE_PRUNE_AT: usize = 1024;

/// One async mutex per key, created on first use.
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: Mutex<AHashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().await;
            if table.len() > LOCK_TABLE_PRUNE_AT {
                table.retain(|_, l| Arc::strong_count(l) > 1);
            }
            table.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct PlayerRepo {
    store: Arc<dyn PlayerStore>,
    locks: KeyLocks,
    curve: XpCurve,
    base_max_energy: u32,
    clock: Arc<dyn Clock>,
}

impl PlayerRepo {
    pub fn new(store: Arc<dyn PlayerStore>, config: &QuestConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            locks: KeyLocks::default(),
            curve: XpCurve::new(&config.xp_curve_formula, config.level_cap),
            base_max_energy: config.energy.base_max_energy,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn PlayerStore> {
        &self.store
    }

    pub fn curve(&self) -> &XpCurve {
        &self.curve
    }

    fn fresh(&self, id: &str, username: &str) -> PlayerRecord {
        PlayerRecord::new(id, username, self.base_max_energy, self.clock.now())
    }

    /// Turns a stored value into a current-schema record. Never fails: bad fields fall
    /// back to their defaults one at a time, and only a value that is not a record at
    /// all is replaced by a fresh one.
    fn decode(&self, id: &str, mut raw: Value) -> PlayerRecord {
        if !raw.is_object() {
            warn!(target: "quest.store", player = id, "stored player is not a record, starting fresh");
            return self.fresh(id, "");
        }
        normalize_player(&mut raw);
        let mut record = match serde_json::from_value::<PlayerRecord>(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(target: "quest.store", player = id, error = %e, "unreadable player record, starting fresh");
                self.fresh(id, "")
            }
        };
        if record.id != id {
            record.id = id.to_string();
        }
        if record.max_energy == 0 {
            record.max_energy = self.base_max_energy;
        }
        record.energy = record.energy.min(record.max_energy);
        let derived = self.curve.level_for_xp(record.xp);
        if derived != record.level {
            debug!(target: "quest.store", player = id, stored = record.level, derived, "level recomputed from xp");
            record.level = derived;
        }
        record
    }

    async fn read(&self, id: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self
            .store
            .get(PLAYERS_MODULE, id)
            .await?
            .map(|raw| self.decode(id, raw)))
    }

    async fn write(&self, record: &PlayerRecord) -> Result<(), StoreError> {
        self.store
            .replace(PLAYERS_MODULE, &record.id, serde_json::to_value(record)?)
            .await
    }

    /// Reads a player without creating or locking it.
    pub async fn peek(&self, id: &str) -> Result<Option<PlayerRecord>, StoreError> {
        self.read(id).await
    }

    /// Returns the player, creating and persisting a default record on first access.
    pub async fn load(&self, id: &str, username: &str) -> Result<PlayerRecord, StoreError> {
        self.update(id, username, |p| p.clone()).await
    }

    /// Serialized read-modify-write of one player. A non-empty `username` refreshes the
    /// stored display name.
    pub async fn update<T, F>(&self, id: &str, username: &str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PlayerRecord) -> T + Send,
        T: Send,
    {
        let _guard = self.locks.acquire(id).await;
        let mut record = match self.read(id).await? {
            Some(record) => record,
            None => {
                debug!(target: "quest.store", player = id, "creating player record");
                self.fresh(id, username)
            }
        };
        if !username.is_empty() && record.username != username {
            record.username = username.to_string();
        }
        let out = f(&mut record);
        self.write(&record).await?;
        Ok(out)
    }

    /// Read-modify-write of two distinct players under both locks, taken in key order.
    pub async fn update_pair<T, F>(
        &self,
        first: (&str, &str),
        second: (&str, &str),
        f: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PlayerRecord, &mut PlayerRecord) -> T + Send,
        T: Send,
    {
        if first.0 == second.0 {
            return Err(StoreError::SameKey(first.0.to_string()));
        }
        let (low, high) = if first.0 < second.0 { (first.0, second.0) } else { (second.0, first.0) };
        let _low = self.locks.acquire(low).await;
        let _high = self.locks.acquire(high).await;

        let mut a = self.read(first.0).await?.unwrap_or_else(|| self.fresh(first.0, first.1));
        let mut b = self.read(second.0).await?.unwrap_or_else(|| self.fresh(second.0, second.1));
        for (record, name) in [(&mut a, first.1), (&mut b, second.1)] {
            if !name.is_empty() && record.username != name {
                record.username = name.to_string();
            }
        }
        let out = f(&mut a, &mut b);
        self.write(&a).await?;
        self.write(&b).await?;
        Ok(out)
    }

    pub async fn ids(&self) -> Result<Vec<String>, StoreError> {
        self.store.keys(PLAYERS_MODULE).await
    }

    /// Snapshot of every stored player, for leaderboards and statistics.
    pub async fn all(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        let mut players = Vec::new();
        for id in self.ids().await? {
            if let Some(record) = self.read(&id).await? {
                players.push(record);
            }
        }
        Ok(players)
    }

    /// Resolves a display name or id to a stored player id, case-insensitively.
    pub async fn find_id(&self, name_or_id: &str) -> Result<Option<String>, StoreError> {
        let wanted = name_or_id.trim_start_matches('@');
        for player in self.all().await? {
            if player.id == wanted || player.username.eq_ignore_ascii_case(wanted) {
                return Ok(Some(player.id));
            }
        }
        Ok(None)
    }
}
