//! Group encounters: one shared slot, a join window, one roll for the whole party.
//!
//! The slot moves Idle → Open → Resolving → Idle. Every transition happens under the
//! engine's single slot mutex: start and join only `try_lock` it and report contention,
//! while the window timer and the lazy close wait for it.

mod coordinator;
mod state;

pub use coordinator::{CloseOutcome, EncounterReport, NOBODY_JOINED};
pub(crate) use coordinator::legacy_foe;
pub use state::SlotState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterKind {
    Mob,
    Rare,
    Boss,
}

impl fmt::Display for EncounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EncounterKind::Mob => "MOB",
            EncounterKind::Rare => "RARE MOB",
            EncounterKind::Boss => "BOSS",
        })
    }
}

/// A transcended player fighting as a boss. Its odds and reward are fixed when it spawns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyFoe {
    /// Store key of the legacy record, `"{user}#{n}"`.
    pub key: String,
    pub win_chance: f64,
    pub xp_reward: u64,
    #[serde(default)]
    pub traits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foe {
    pub name: String,
    pub level: u32,
    pub xp_min: u64,
    pub xp_max: u64,
    #[serde(default)]
    pub legacy: Option<LegacyFoe>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

/// The open encounter, mirrored to the store so a restart can pick it back up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterRecord {
    pub id: u64,
    pub kind: EncounterKind,
    pub channel: String,
    pub foe: Foe,
    pub participants: Vec<Participant>,
    pub opened_at: DateTime<Utc>,
    pub close_epoch: DateTime<Utc>,
    /// Reward multiplier for rare and boss fights; 1.0 for ordinary mobs.
    pub xp_multiplier: f64,
}

impl EncounterRecord {
    pub fn is_legacy(&self) -> bool {
        self.foe.legacy.is_some()
    }

    pub fn has_participant(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }

    pub fn label(&self) -> String {
        if self.is_legacy() { "LEGACY BOSS".to_string() } else { self.kind.to_string() }
    }

    /// Opening line posted to the channel.
    pub fn announcement(&self, prefix: &str) -> String {
        match (&self.foe.legacy, self.kind) {
            (Some(legacy), _) => format!(
                "🌟 **LEGACY BOSS ENCOUNTER!** {} appears! ({})\nThis transcendent warrior challenges you! Use {prefix}join to fight! [{} XP reward]",
                self.foe.name,
                legacy.traits.iter().take(2).cloned().collect::<Vec<_>>().join(", "),
                legacy.xp_reward
            ),
            (None, EncounterKind::Boss) => format!(
                "⚠️ **BOSS ENCOUNTER!** A wild {} appears! Use {prefix}join to fight it together!",
                self.foe.name
            ),
            (None, EncounterKind::Rare) => format!(
                "✨ **RARE MOB ENCOUNTER!** A rare {} appears! Use {prefix}join to participate!",
                self.foe.name
            ),
            (None, EncounterKind::Mob) => format!(
                "⚔️ **MOB ENCOUNTER!** A {} appears! Use {prefix}join to participate!",
                self.foe.name
            ),
        }
    }
}
