//! The quest engine: progression, energy, injuries, items, combat, group encounters,
//! challenge paths and legacy bosses.
//!
//! Pure rules live in free functions over [`PlayerRecord`](crate::database::models::PlayerRecord);
//! [`engine::QuestEngine`] wires them to the store, the clock, the scheduler and the
//! notifier, and exposes one call per user action.

pub mod admin;
pub mod challenges;
pub mod clock;
pub mod combat;
pub mod encounter;
pub mod energy;
pub mod engine;
pub mod injuries;
pub mod inventory;
pub mod items;
pub mod legacy;
pub mod leveling;
pub mod registry;
pub mod solo;

use crate::database::StoreError;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

pub use engine::QuestEngine;

/// Who is acting, and where. `id` is the stable store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub channel: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, channel: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), channel: channel.into() }
    }
}

/// What an action hands back to the chat layer: a reply for the actor and any
/// channel-wide announcements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    pub reply: String,
    pub announcements: Vec<String>,
}

impl ActionResult {
    pub fn ok(reply: impl Into<String>) -> Self {
        Self { success: true, reply: reply.into(), announcements: Vec::new() }
    }

    pub fn rejected(reason: Rejection) -> Self {
        Self::failed(reason.to_string())
    }

    pub fn failed(reply: impl Into<String>) -> Self {
        Self { success: false, reply: reply.into(), announcements: Vec::new() }
    }

    pub fn with_announcement(mut self, text: impl Into<String>) -> Self {
        self.announcements.push(text.into());
        self
    }
}

impl From<Rejection> for ActionResult {
    fn from(reason: Rejection) -> Self {
        ActionResult::rejected(reason)
    }
}

/// Every way a user action can be refused. Rejections never change state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("You need {needed} energy but only have {have}. Rest a while.")]
    NotEnoughEnergy { needed: u32, have: u32 },
    #[error("You can {action} again in {wait}.")]
    OnCooldown { action: &'static str, wait: String },
    #[error("You are still recovering from {injuries}. Heal up or wait it out.")]
    Injured { injuries: String },
    #[error("You don't have any {0}s.")]
    NoItem(String),
    #[error("You already have an active {0}.")]
    AlreadyActive(String),
    #[error("Your energy is already full.")]
    EnergyFull,
    #[error("{0} has no injuries to heal.")]
    TargetNotInjured(String),
    #[error("Unknown item '{0}'. Try medkit, potion, charm, armor or scroll.")]
    UnknownItem(String),
    #[error("Unknown ability '{0}'.")]
    UnknownAbility(String),
    #[error("You don't have the '{0}' ability unlocked.")]
    AbilityLocked(String),
    #[error("That ability is on cooldown for {0}.")]
    AbilityOnCooldown(String),
    #[error("{0} had no effect.")]
    AbilityNoEffect(String),
    #[error("You have already joined this encounter.")]
    AlreadyJoined,
    #[error("The encounter is full.")]
    EncounterFull,
    #[error("There is no open encounter to join.")]
    NoOpenEncounter,
    #[error("The encounter is busy resolving. Try again in a moment.")]
    EncounterBusy,
    #[error("An encounter is already active! Join it instead.")]
    EncounterAlreadyOpen,
    #[error("A mob encounter was recently completed here. Try again in {0}.")]
    ChannelCooldown(String),
    #[error("The open encounter is in another channel.")]
    WrongChannel,
    #[error("You must reach level {0} first.")]
    NotAtLevelCap(u32),
    #[error("You are at the maximum prestige ({0}). Transcend to go further.")]
    MaxPrestige(u32),
    #[error("You must reach prestige {0} to transcend.")]
    PrestigeTooLow(u32),
    #[error("You have already transcended this cycle.")]
    AlreadyTranscended,
    #[error("No challenge path is currently available.")]
    NoActivePath,
    #[error("Unknown challenge path '{0}'. Configured paths: {1}.")]
    UnknownPath(String, String),
    #[error("{0}")]
    RequirementsNotMet(String),
    #[error("Unknown class '{0}'. Choose one of: {1}.")]
    UnknownClass(String, String),
    #[error("You are not allowed to do that.")]
    NotAuthorized,
    #[error("No player named '{0}'.")]
    UnknownPlayer(String),
    #[error("No suitable monster could be found.")]
    NoContent,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Channel-wide delivery for announcements that happen outside a command, such as a
/// timer closing an encounter. Best effort: implementations log and drop failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn announce(&self, channel: &str, text: &str);
}

/// Drops every announcement.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn announce(&self, _channel: &str, _text: &str) {}
}

/// Keeps announcements in memory instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub async fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn announce(&self, channel: &str, text: &str) {
        self.sent.lock().await.push((channel.to_string(), text.to_string()));
    }
}

/// Formats a non-negative duration as `1h 5m`, `5m 3s` or `12s`.
pub fn format_wait(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}
