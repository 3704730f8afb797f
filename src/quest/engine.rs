//! The engine object every chat command goes through.

use super::clock::{Clock, SystemClock};
use super::encounter::SlotState;
use super::{EngineError, Notifier, NullNotifier};
use crate::config::QuestConfig;
use crate::constants::DEFAULT_PREFIX;
use crate::database::PlayerStore;
use crate::database::players::PlayerRepo;
use crate::services::Scheduler;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub struct QuestEngine {
    /// Handle to ourselves for timer callbacks; never upgraded outside a task.
    pub(crate) this: Weak<QuestEngine>,
    pub(crate) prefix: String,
    pub(crate) config: Arc<QuestConfig>,
    pub(crate) players: PlayerRepo,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) scheduler: Scheduler,
    pub(crate) slot: Mutex<SlotState>,
    pub(crate) active_path: RwLock<Option<String>>,
}

pub struct EngineBuilder {
    config: QuestConfig,
    store: Arc<dyn PlayerStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    prefix: String,
}

impl EngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Builds the engine without touching the store or starting timers. The config is
    /// validated here, so hand-built configs get the same repairs as loaded ones.
    pub fn build(self) -> Arc<QuestEngine> {
        let config = self.config.validated();
        let players = PlayerRepo::new(self.store, &config, self.clock.clone());
        let active_path = config.challenges.active_path.clone();
        Arc::new_cyclic(|this| QuestEngine {
            this: this.clone(),
            prefix: self.prefix,
            config: Arc::new(config),
            players,
            clock: self.clock,
            notifier: self.notifier,
            scheduler: Scheduler::new(),
            slot: Mutex::new(SlotState::default()),
            active_path: RwLock::new(active_path),
        })
    }
}

impl QuestEngine {
    pub fn builder(config: QuestConfig, store: Arc<dyn PlayerStore>) -> EngineBuilder {
        EngineBuilder {
            config,
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NullNotifier),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Restores persisted engine state and starts the energy timer.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        self.restore_active_path().await?;
        self.restore_encounter().await?;
        self.start_energy_timer().await;
        info!(
            target: "quest.engine",
            path = ?self.active_path().await,
            energy = self.config.energy.enabled,
            "quest engine started"
        );
        Ok(())
    }

    /// Cancels every timer. Persisted state is left as is and restored by the next `start`.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        info!(target: "quest.engine", "quest engine stopped");
    }

    pub fn config(&self) -> &QuestConfig {
        &self.config
    }

    pub fn players(&self) -> &PlayerRepo {
        &self.players
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}
