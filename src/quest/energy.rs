//! Contains the energy rules: consumption, restoration and periodic regeneration.

use super::injuries;
use super::{EngineError, QuestEngine};
use crate::config::QuestConfig;
use crate::constants::{ENERGY_BAR_WIDTH, ENERGY_TAG};
use crate::database::models::PlayerRecord;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Spends `amount` energy. Fails closed: with too little energy nothing is taken.
pub fn consume(p: &mut PlayerRecord, amount: u32) -> bool {
    if p.energy < amount {
        return false;
    }
    p.energy -= amount;
    true
}

/// Adds up to `amount` energy without passing the max. Returns what was actually added.
pub fn restore(p: &mut PlayerRecord, amount: u32) -> u32 {
    let added = amount.min(p.max_energy.saturating_sub(p.energy));
    p.energy += added;
    added
}

/// Energy one regeneration tick grants: the base amount plus every active injury's
/// regen modifier, never below zero.
pub fn regen_amount(p: &PlayerRecord, config: &QuestConfig, now: DateTime<Utc>) -> u32 {
    let modifier = injuries::injury_effects(p, now).energy_regen_modifier;
    u32::try_from((config.energy.regen_amount + modifier).max(0)).unwrap_or(0)
}

/// One regeneration tick for one player. Returns the energy added.
pub fn regen_tick(p: &mut PlayerRecord, config: &QuestConfig, now: DateTime<Utc>) -> u32 {
    p.last_energy_regen = Some(now);
    if p.energy >= p.max_energy {
        return 0;
    }
    let amount = regen_amount(p, config, now);
    restore(p, amount)
}

/// Back to the level-1 pool, full.
pub fn reset_pool(p: &mut PlayerRecord, config: &QuestConfig) {
    p.max_energy = config.energy.base_max_energy;
    p.energy = p.max_energy;
}

pub fn energy_bar(p: &PlayerRecord) -> String {
    let filled = if p.max_energy == 0 {
        0
    } else {
        (p.energy as usize * ENERGY_BAR_WIDTH) / p.max_energy as usize
    };
    format!(
        "[{}{}] {}/{}",
        "█".repeat(filled),
        "░".repeat(ENERGY_BAR_WIDTH - filled.min(ENERGY_BAR_WIDTH)),
        p.energy,
        p.max_energy
    )
}

/// Time until the next scheduled regeneration tick, based on the player's last tick.
pub fn next_regen_in(p: &PlayerRecord, config: &QuestConfig, now: DateTime<Utc>) -> Duration {
    let interval = Duration::minutes(config.energy.regen_minutes as i64);
    match p.last_energy_regen {
        Some(last) => (last + interval - now).max(Duration::zero()),
        None => interval,
    }
}

impl QuestEngine {
    /// Runs one regeneration tick over every stored player below max energy.
    /// Returns how many players gained energy.
    #[instrument(level = "debug", skip(self))]
    pub async fn regenerate_energy(&self) -> Result<usize, EngineError> {
        if !self.config.energy.enabled {
            return Ok(0);
        }
        let now = self.clock.now();
        let mut refreshed = 0;
        for id in self.players.ids().await? {
            let config = &self.config;
            let added = self
                .players
                .update(&id, "", |p| regen_tick(p, config, now))
                .await?;
            if added > 0 {
                refreshed += 1;
            }
        }
        debug!(target: "quest.energy", refreshed, "energy regeneration tick");
        Ok(refreshed)
    }

    pub async fn consume_energy(&self, id: &str, amount: u32) -> Result<bool, EngineError> {
        Ok(self.players.update(id, "", |p| consume(p, amount)).await?)
    }

    pub async fn restore_energy(&self, id: &str, amount: u32) -> Result<u32, EngineError> {
        Ok(self.players.update(id, "", |p| restore(p, amount)).await?)
    }

    /// Starts the recurring regeneration timer under the energy tag.
    pub(crate) async fn start_energy_timer(self: &Arc<Self>) {
        if !self.config.energy.enabled {
            return;
        }
        let interval = std::time::Duration::from_secs(self.config.energy.regen_minutes.max(1) * 60);
        let engine = Arc::downgrade(self);
        self.scheduler
            .run_every(ENERGY_TAG, interval, move || {
                let engine = engine.clone();
                async move {
                    let Some(engine) = engine.upgrade() else { return };
                    if let Err(e) = engine.regenerate_energy().await {
                        warn!(target: "quest.energy", error = %e, "energy regeneration failed");
                    }
                }
            })
            .await;
    }

    pub async fn energy_status(&self, actor: &super::Actor) -> Result<super::ActionResult, EngineError> {
        let p = self.player(actor).await?;
        let now = self.clock.now();
        let regen = regen_amount(&p, &self.config, now);
        let mut reply = format!("⚡ {} {}", p.display_name(), energy_bar(&p));
        if p.energy < p.max_energy {
            reply.push_str(&format!(
                " | +{regen} in {}",
                super::format_wait(next_regen_in(&p, &self.config, now))
            ));
        }
        Ok(super::ActionResult::ok(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_fails_closed() {
        let mut p = PlayerRecord { energy: 1, ..PlayerRecord::default() };
        assert!(!consume(&mut p, 2));
        assert_eq!(p.energy, 1);
        assert!(consume(&mut p, 1));
        assert_eq!(p.energy, 0);
    }

    #[test]
    fn restore_caps_at_max() {
        let mut p = PlayerRecord { energy: 8, max_energy: 10, ..PlayerRecord::default() };
        assert_eq!(restore(&mut p, 5), 2);
        assert_eq!(p.energy, 10);
    }

    #[test]
    fn bar_renders_fill() {
        let p = PlayerRecord { energy: 5, max_energy: 10, ..PlayerRecord::default() };
        assert_eq!(energy_bar(&p), "[█████░░░░░] 5/10");
    }
}
