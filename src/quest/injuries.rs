//! Injuries: timed debuffs rolled on defeat, capped per kind, swept when they expire.

use super::{format_wait, EngineError, QuestEngine};
use crate::config::{InjuryKind, QuestConfig};
use crate::database::models::{Injury, InjuryEffects, PlayerRecord};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{debug, instrument};

/// Maximum concurrent injuries sharing one name.
pub const MAX_SAME_INJURY: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum InjuryOutcome {
    Sustained { name: String, description: String, repeat: bool },
    /// A third copy was rolled and absorbed; nothing changed.
    NarrowMiss { name: String },
}

impl InjuryOutcome {
    pub fn message(&self) -> String {
        match self {
            InjuryOutcome::Sustained { name, description, repeat: false } => {
                format!("You have sustained an injury: {name}! {description}")
            }
            InjuryOutcome::Sustained { name, description, repeat: true } => {
                format!("You have sustained another {name}! {description}")
            }
            InjuryOutcome::NarrowMiss { name } => format!("You narrowly avoid another {name}!"),
        }
    }
}

/// Combined effect of every injury still active at `now`: XP multipliers multiply,
/// regen modifiers add.
pub fn injury_effects(p: &PlayerRecord, now: DateTime<Utc>) -> InjuryEffects {
    p.active_injuries
        .iter()
        .filter(|i| i.expires_at > now)
        .fold(InjuryEffects::default(), |acc, i| InjuryEffects {
            xp_multiplier: acc.xp_multiplier * i.effects.xp_multiplier,
            energy_regen_modifier: acc.energy_regen_modifier + i.effects.energy_regen_modifier,
        })
}

pub fn is_injured(p: &PlayerRecord, now: DateTime<Utc>) -> bool {
    p.active_injuries.iter().any(|i| i.expires_at > now)
}

pub fn injury_names(p: &PlayerRecord, now: DateTime<Utc>) -> String {
    p.active_injuries
        .iter()
        .filter(|i| i.expires_at > now)
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Attaches `kind` to the player unless two of it are already active.
pub fn apply_injury(p: &mut PlayerRecord, kind: &InjuryKind, now: DateTime<Utc>) -> InjuryOutcome {
    let held = p.active_injuries.iter().filter(|i| i.name == kind.name).count();
    if held >= MAX_SAME_INJURY {
        return InjuryOutcome::NarrowMiss { name: kind.name.clone() };
    }
    let minutes = (kind.duration_hours.max(0.0) * 60.0).round() as i64;
    p.active_injuries.push(Injury {
        name: kind.name.clone(),
        description: kind.description.clone(),
        expires_at: now + Duration::minutes(minutes),
        effects: InjuryEffects {
            xp_multiplier: kind.xp_multiplier,
            energy_regen_modifier: kind.energy_regen_modifier,
        },
    });
    InjuryOutcome::Sustained {
        name: kind.name.clone(),
        description: kind.description.clone(),
        repeat: held == 1,
    }
}

/// Picks a random configured injury and applies it. `None` when no kinds are configured.
pub fn inflict_random(
    p: &mut PlayerRecord,
    config: &QuestConfig,
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> Option<InjuryOutcome> {
    let kind = config.injuries.kinds.choose(rng)?;
    Some(apply_injury(p, kind, now))
}

/// Defeat roll: the configured chance, reduced by `reduction` (0.0..=1.0) from armor.
pub fn roll_on_loss(
    p: &mut PlayerRecord,
    config: &QuestConfig,
    reduction: f64,
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> Option<InjuryOutcome> {
    if !config.injuries.enabled {
        return None;
    }
    let chance = (config.injuries.chance_on_loss * (1.0 - reduction.clamp(0.0, 1.0))).clamp(0.0, 1.0);
    if !rng.random_bool(chance) {
        return None;
    }
    inflict_random(p, config, rng, now)
}

/// Drops expired injuries. Returns a recovery message when anything was removed.
pub fn sweep_expired(p: &mut PlayerRecord, now: DateTime<Utc>) -> Option<String> {
    let (expired, active): (Vec<Injury>, Vec<Injury>) =
        p.active_injuries.drain(..).partition(|i| i.expires_at <= now);
    p.active_injuries = active;
    if expired.is_empty() {
        return None;
    }
    let names: Vec<&str> = expired.iter().map(|i| i.name.as_str()).collect();
    Some(format!("You have recovered from: {}.", names.join(", ")))
}

/// Removes one injury by name (case-insensitive), or all of them.
pub fn heal(p: &mut PlayerRecord, name: Option<&str>) -> Vec<Injury> {
    match name {
        None => std::mem::take(&mut p.active_injuries),
        Some(name) => match p.active_injuries.iter().position(|i| i.name.eq_ignore_ascii_case(name)) {
            Some(idx) => vec![p.active_injuries.remove(idx)],
            None => Vec::new(),
        },
    }
}

/// One line per active injury with its remaining time.
pub fn describe(p: &PlayerRecord, now: DateTime<Utc>) -> Vec<String> {
    p.active_injuries
        .iter()
        .filter(|i| i.expires_at > now)
        .map(|i| format!("{} ({} left)", i.name, format_wait(i.expires_at - now)))
        .collect()
}

impl QuestEngine {
    /// Removes expired injuries from every stored player. Returns how many recovered.
    #[instrument(level = "debug", skip(self))]
    pub async fn sweep_all_injuries(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let mut recovered = 0;
        for id in self.players.ids().await? {
            if self.players.update(&id, "", |p| sweep_expired(p, now)).await?.is_some() {
                recovered += 1;
            }
        }
        debug!(target: "quest.injury", recovered, "injury sweep");
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(name: &str) -> InjuryKind {
        InjuryKind {
            name: name.to_string(),
            description: "ouch".to_string(),
            duration_hours: 1.0,
            xp_multiplier: 0.5,
            energy_regen_modifier: -1,
        }
    }

    #[test]
    fn effects_multiply_and_sum() {
        let now = Utc::now();
        let mut p = PlayerRecord::default();
        apply_injury(&mut p, &kind("A"), now);
        apply_injury(&mut p, &kind("B"), now);
        let fx = injury_effects(&p, now);
        assert!((fx.xp_multiplier - 0.25).abs() < 1e-9);
        assert_eq!(fx.energy_regen_modifier, -2);
        assert_eq!(injury_effects(&p, now + Duration::hours(2)), InjuryEffects::default());
    }

    #[test]
    fn sweep_reports_recovery() {
        let now = Utc::now();
        let mut p = PlayerRecord::default();
        apply_injury(&mut p, &kind("A"), now);
        assert_eq!(sweep_expired(&mut p, now), None);
        let msg = sweep_expired(&mut p, now + Duration::hours(1)).unwrap();
        assert!(msg.contains('A'));
        assert!(p.active_injuries.is_empty());
    }

    #[test]
    fn zero_chance_never_injures() {
        let mut config = QuestConfig::default();
        config.injuries.chance_on_loss = 0.0;
        let mut p = PlayerRecord::default();
        let mut rng = rand::rng();
        for _ in 0..50 {
            assert!(roll_on_loss(&mut p, &config, 0.0, &mut rng, Utc::now()).is_none());
        }
    }

    #[test]
    fn full_armor_blocks_injury() {
        let config = QuestConfig::default();
        let mut p = PlayerRecord::default();
        let mut rng = rand::rng();
        assert!(roll_on_loss(&mut p, &config, 1.0, &mut rng, Utc::now()).is_none());
    }
}
