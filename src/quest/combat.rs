//! Combat resolution: one win probability, one uniform draw.

use crate::config::{CombatConfig, MonsterDef, QuestConfig};
use crate::constants::{
    FALLBACK_MONSTER_MAX_LEVEL, FALLBACK_MONSTER_MIN_LEVEL, FALLBACK_MONSTER_NAME, FALLBACK_MONSTER_XP,
};
use crate::database::models::LegacyBoss;
use rand::Rng;
use rand::seq::IndexedRandom;

/// Inputs to the level-delta formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matchup {
    pub player_level: f64,
    pub monster_level: f64,
    pub prestige: f64,
    pub injury_multiplier: f64,
    pub group_modifier: f64,
    /// Lucky-charm bonus as a fraction, added after the injury discount.
    pub charm_bonus: f64,
}

impl Matchup {
    pub fn solo(player_level: u32, monster_level: u32, prestige: u32) -> Self {
        Self {
            player_level: f64::from(player_level),
            monster_level: f64::from(monster_level),
            prestige: f64::from(prestige),
            injury_multiplier: 1.0,
            group_modifier: 0.0,
            charm_bonus: 0.0,
        }
    }
}

/// `clamp(base + Δlevel·level_step + prestige·prestige_step + group, min, max)`, then scaled
/// by the injury multiplier and raised by the charm. The result is always a valid probability.
pub fn win_chance(combat: &CombatConfig, m: &Matchup) -> f64 {
    let raw = combat.base_win_chance
        + (m.player_level - m.monster_level) * combat.level_step
        + m.prestige * combat.prestige_step
        + m.group_modifier;
    let clamped = raw.clamp(combat.min_win_chance, combat.max_win_chance);
    (clamped * m.injury_multiplier + m.charm_bonus).clamp(0.0, 1.0)
}

/// Legacy bosses ignore the attacker's level: `min(base + n·step, max)` by transcendence number.
pub fn legacy_win_chance(config: &QuestConfig, boss: &LegacyBoss) -> f64 {
    let legacy = &config.legacy;
    (legacy.base_win_chance + f64::from(boss.transcendence_number) * legacy.win_chance_step)
        .min(legacy.max_win_chance)
        .clamp(0.0, 1.0)
}

/// Win-chance bonus for a party of `players`; the first table entry the party reaches.
pub fn group_modifier(combat: &CombatConfig, players: usize) -> f64 {
    combat
        .group_modifiers
        .iter()
        .find(|g| players >= g.players)
        .map(|g| g.modifier)
        .unwrap_or(0.0)
}

pub fn group_xp_scaling(combat: &CombatConfig, players: usize) -> f64 {
    combat
        .group_xp_scaling
        .iter()
        .find(|g| players >= g.players)
        .map(|g| g.multiplier)
        .unwrap_or(1.0)
}

pub fn resolve(chance: f64, rng: &mut impl Rng) -> bool {
    rng.random_bool(chance.clamp(0.0, 1.0))
}

/// A monster whose level range covers `level`, else any monster at all.
pub fn pick_monster<'a>(monsters: &'a [MonsterDef], level: u32, rng: &mut impl Rng) -> Option<&'a MonsterDef> {
    let fitting: Vec<&MonsterDef> = monsters.iter().filter(|m| m.fits(level)).collect();
    match fitting.choose(rng) {
        Some(m) => Some(*m),
        None => monsters.choose(rng),
    }
}

/// Stand-in used when the content tables are empty.
pub fn fallback_monster() -> MonsterDef {
    MonsterDef {
        name: FALLBACK_MONSTER_NAME.to_string(),
        min_level: FALLBACK_MONSTER_MIN_LEVEL,
        max_level: FALLBACK_MONSTER_MAX_LEVEL,
        xp_win_min: FALLBACK_MONSTER_XP.0,
        xp_win_max: FALLBACK_MONSTER_XP.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_fight_is_base_chance() {
        let combat = CombatConfig::default();
        assert_eq!(win_chance(&combat, &Matchup::solo(1, 1, 0)), 0.5);
    }

    #[test]
    fn clamps_before_injury_and_charm() {
        let combat = CombatConfig::default();
        let m = Matchup { injury_multiplier: 0.5, charm_bonus: 0.15, ..Matchup::solo(30, 1, 0) };
        assert!((win_chance(&combat, &m) - (0.95 * 0.5 + 0.15)).abs() < 1e-9);
    }

    #[test]
    fn group_tables_take_first_match() {
        let combat = CombatConfig::default();
        assert_eq!(group_modifier(&combat, 1), 0.0);
        assert_eq!(group_modifier(&combat, 4), 0.10);
        assert_eq!(group_xp_scaling(&combat, 7), 1.5);
    }

    #[test]
    fn certain_odds_are_certain() {
        let mut rng = rand::rng();
        assert!(resolve(1.0, &mut rng));
        assert!(!resolve(0.0, &mut rng));
    }

    #[test]
    fn monster_pick_prefers_level_fit() {
        let monsters = QuestConfig::default().content.monsters;
        let mut rng = rand::rng();
        for _ in 0..20 {
            assert!(pick_monster(&monsters, 2, &mut rng).unwrap().fits(2));
        }
        assert!(pick_monster(&monsters, 99, &mut rng).is_some());
        assert!(pick_monster(&[], 1, &mut rng).is_none());
    }
}
