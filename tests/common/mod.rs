#![allow(dead_code)]

use questbot::config::{MonsterDef, QuestConfig};
use questbot::database::memory::MemoryStore;
use questbot::quest::clock::ManualClock;
use questbot::quest::{Actor, QuestEngine, RecordingNotifier};
use std::sync::Arc;

pub struct Harness {
    pub engine: Arc<QuestEngine>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(config: QuestConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = QuestEngine::builder(config, store.clone())
        .clock(clock.clone())
        .notifier(notifier.clone())
        .build();
    Harness { engine, store, clock, notifier }
}

pub fn actor(id: &str) -> Actor {
    Actor::new(id, id, "general")
}

/// One monster for every level with a fixed reward, and no rare or drop rolls.
pub fn fixed_content(mut config: QuestConfig, xp: u64) -> QuestConfig {
    config.content.monsters = vec![MonsterDef {
        name: "Training Dummy".to_string(),
        min_level: 1,
        max_level: 30,
        xp_win_min: xp,
        xp_win_max: xp,
    }];
    config.encounter.rare_chance = 0.0;
    config.items.medkit_drop_chance = 0.0;
    config
}

pub fn always_win(mut config: QuestConfig) -> QuestConfig {
    config.combat.min_win_chance = 1.0;
    config.combat.max_win_chance = 1.0;
    config
}

pub fn always_lose(mut config: QuestConfig) -> QuestConfig {
    config.combat.min_win_chance = 0.0;
    config.combat.max_win_chance = 0.0;
    config
}
