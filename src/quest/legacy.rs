//! Transcendence and legacy bosses.
//!
//! A player at max prestige may transcend once per cycle: their run is frozen into a
//! [`LegacyBoss`] record under `quest_legacy/"{user}#{n}"` and the player starts over at
//! prestige 1 with their bonuses intact. Boss records only ever grow.

use super::encounter::{Foe, legacy_foe};
use super::registry::reset_progress;
use super::{ActionResult, Actor, EngineError, QuestEngine, Rejection};
use crate::config::{AchievementStat, QuestConfig};
use crate::constants::LEGACY_MODULE;
use crate::database::StoreError;
use crate::database::models::{ChallengeStats, DefeatEvent, LegacyBoss, PlayerRecord};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::{IndexedRandom, IteratorRandom};
use tracing::{info, instrument, warn};

/// Extra XP multiplier after the `count`-th transcendence: base + (count - 1) * step.
pub fn transcendence_bonus(config: &QuestConfig, count: u32) -> f64 {
    if count == 0 {
        return 0.0;
    }
    config.legacy.transcend_base_bonus + f64::from(count - 1) * config.legacy.transcend_bonus_step
}

/// Title for a boss created after `prior` earlier transcendences; the last title repeats.
pub fn title_for(config: &QuestConfig, prior: u32) -> String {
    let titles = &config.legacy.titles;
    titles
        .get((prior as usize).min(titles.len().saturating_sub(1)))
        .cloned()
        .unwrap_or_else(|| "the Legend".to_string())
}

fn class_of(p: &PlayerRecord, config: &QuestConfig) -> String {
    p.class.clone().unwrap_or_else(|| config.legacy.default_class.clone())
}

/// Up to two class traits plus every achievement trait earned, capped at `max_traits`.
pub fn generate_traits(p: &PlayerRecord, config: &QuestConfig, rng: &mut impl Rng) -> Vec<String> {
    let mut traits: Vec<String> = config
        .legacy
        .class_traits
        .get(&class_of(p, config))
        .map(|pool| pool.iter().cloned().choose_multiple(rng, 2))
        .unwrap_or_default();
    for achievement in &config.legacy.achievement_traits {
        let value = match achievement.stat {
            AchievementStat::Wins => p.wins,
            AchievementStat::MaxStreak => p.max_streak,
        };
        if value >= achievement.threshold && !traits.contains(&achievement.name) {
            traits.push(achievement.name.clone());
        }
    }
    traits.truncate(config.legacy.max_traits.max(1));
    traits
}

pub fn generate_abilities(p: &PlayerRecord, config: &QuestConfig) -> Vec<String> {
    config
        .legacy
        .class_abilities
        .get(&class_of(p, config))
        .cloned()
        .unwrap_or_else(|| config.legacy.fallback_abilities.clone())
}

/// Transcendence gate. `already` reports whether the boss record for the next
/// transcendence number exists.
pub fn can_transcend(p: &PlayerRecord, config: &QuestConfig, already: bool) -> Result<(), Rejection> {
    if p.prestige < config.max_prestige {
        return Err(Rejection::PrestigeTooLow(config.max_prestige));
    }
    if already {
        return Err(Rejection::AlreadyTranscended);
    }
    Ok(())
}

/// Snapshots the player into a boss record.
pub fn snapshot(p: &PlayerRecord, config: &QuestConfig, rng: &mut impl Rng, now: DateTime<Utc>) -> LegacyBoss {
    LegacyBoss {
        user_id: p.id.clone(),
        username: p.display_name().to_string(),
        title: title_for(config, p.transcendence_count),
        class: class_of(p, config),
        transcendence_number: p.transcendence_count + 1,
        original_level: p.level,
        original_prestige: p.prestige,
        total_wins: p.wins,
        total_losses: p.losses,
        max_streak: p.max_streak,
        traits: generate_traits(p, config, rng),
        abilities: generate_abilities(p, config),
        defeat_count: 0,
        defeat_history: Vec::new(),
        created_at: now,
    }
}

/// Fresh lifecycle after transcendence. Bonuses, class and abilities survive.
pub fn reset_for_transcendence(p: &mut PlayerRecord, config: &QuestConfig) -> u32 {
    let old_prestige = p.prestige;
    reset_progress(p, config);
    p.challenge = ChallengeStats::default();
    p.prestige = 1;
    p.effective_prestige = old_prestige;
    p.transcendence_count += 1;
    let n = p.transcendence_count;
    p.prestige_bonuses.push(format!(
        "+{}% XP gain (Transcended {n}x)",
        (transcendence_bonus(config, n) * 100.0).round()
    ));
    p.prestige_bonuses
        .push("Legacy Aura: Your boss form grants bonus XP when defeated".to_string());
    n
}

/// Appends a defeat, keeping only the newest `cap` entries.
pub fn push_defeat(boss: &mut LegacyBoss, event: DefeatEvent, cap: usize) {
    boss.defeat_count += 1;
    boss.defeat_history.push(event);
    if boss.defeat_history.len() > cap {
        let excess = boss.defeat_history.len() - cap;
        boss.defeat_history.drain(..excess);
    }
}

/// Hall-of-fame order: highest transcendence first, then oldest first.
pub fn rank_hall_of_fame(bosses: &mut [LegacyBoss]) {
    bosses.sort_by(|a, b| {
        b.transcendence_number
            .cmp(&a.transcendence_number)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

impl QuestEngine {
    async fn legacy_record(&self, key: &str) -> Result<Option<LegacyBoss>, EngineError> {
        let Some(raw) = self.players.store().get(LEGACY_MODULE, key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(boss) => Ok(Some(boss)),
            Err(e) => {
                warn!(target: "quest.legacy", key, error = %e, "unreadable legacy record");
                Ok(None)
            }
        }
    }

    async fn save_legacy(&self, boss: &LegacyBoss) -> Result<(), EngineError> {
        let record = serde_json::to_value(boss).map_err(StoreError::from)?;
        self.players.store().replace(LEGACY_MODULE, &boss.key(), record).await?;
        Ok(())
    }

    /// Every readable legacy boss, in hall-of-fame order.
    pub async fn legacy_bosses(&self) -> Result<Vec<LegacyBoss>, EngineError> {
        let mut bosses = Vec::new();
        for key in self.players.store().keys(LEGACY_MODULE).await? {
            if let Some(boss) = self.legacy_record(&key).await? {
                bosses.push(boss);
            }
        }
        rank_hall_of_fame(&mut bosses);
        Ok(bosses)
    }

    /// Whether the actor could transcend right now.
    pub async fn transcend_check(&self, actor: &Actor) -> Result<Result<(), Rejection>, EngineError> {
        let p = self.player(actor).await?;
        let key = LegacyBoss::store_key(&p.id, p.transcendence_count + 1);
        let already = self.players.store().get(LEGACY_MODULE, &key).await?.is_some();
        Ok(can_transcend(&p, &self.config, already))
    }

    #[instrument(level = "debug", skip(self), fields(user = %actor.id))]
    pub async fn transcend(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        let before = self.player(actor).await?;
        let expected = before.transcendence_count;
        if let Err(why) = self.transcend_check(actor).await? {
            return Ok(why.into());
        }
        let config = self.config.clone();
        let now = self.clock.now();
        let res = self
            .players
            .update(&actor.id, &actor.name, |p| {
                if p.transcendence_count != expected {
                    return Err(Rejection::AlreadyTranscended);
                }
                can_transcend(p, &config, false)?;
                let boss = {
                    let mut rng = rand::rng();
                    snapshot(p, &config, &mut rng, now)
                };
                let prior = p.clone();
                let old_prestige = p.prestige;
                let n = reset_for_transcendence(p, &config);
                Ok((boss, old_prestige, n, prior))
            })
            .await?;
        let (boss, old_prestige, n, prior) = match res {
            Ok(done) => done,
            Err(why) => return Ok(why.into()),
        };
        if let Err(e) = self.save_legacy(&boss).await {
            warn!(target: "quest.legacy", user = %actor.id, error = %e, "legacy boss not saved, undoing transcendence");
            let undo = self
                .players
                .update(&actor.id, "", |p| {
                    if p.transcendence_count == n {
                        *p = prior;
                    }
                })
                .await;
            if let Err(undo) = undo {
                warn!(target: "quest.legacy", user = %actor.id, error = %undo, "transcendence rollback failed");
            }
            return Err(e);
        }
        info!(target: "quest.legacy", user = %actor.id, n, title = %boss.title, "player transcended");

        let prestige_pct = (f64::from(old_prestige) * config.prestige_xp_bonus * 100.0).round();
        let transcend_pct = (transcendence_bonus(&config, n) * 100.0).round();
        Ok(ActionResult::ok(format!(
            "🌟 **TRANSCENDENCE COMPLETE!** You have become {} and now live forever as a Legacy Boss!\n\
             Your journey begins anew with transcendent powers! You retain your +{prestige_pct}% prestige bonus and gain +{transcend_pct}% transcendence bonus (Total: +{}% XP gain)!",
            boss.display_name(),
            prestige_pct + transcend_pct
        ))
        .with_announcement(format!(
            "🌌 {} has transcended and become {}! Beware their return as a Legacy Boss.",
            actor.name,
            boss.display_name()
        )))
    }

    /// A random legacy boss scaled for a fight at `player_level`, if any exist.
    pub(crate) async fn random_legacy_foe(&self, player_level: u32) -> Result<Option<Foe>, EngineError> {
        let keys = self.players.store().keys(LEGACY_MODULE).await?;
        let Some(key) = keys.choose(&mut rand::rng()).cloned() else {
            return Ok(None);
        };
        Ok(self
            .legacy_record(&key)
            .await?
            .map(|boss| legacy_foe(&self.config, &boss, player_level)))
    }

    /// Records a party victory over the boss stored under `key`.
    pub(crate) async fn record_legacy_defeat(&self, key: &str, victor_id: &str, victor_name: &str) -> Result<(), EngineError> {
        let Some(mut boss) = self.legacy_record(key).await? else {
            warn!(target: "quest.legacy", key, "defeated legacy boss has no record");
            return Ok(());
        };
        let level = self.players.peek(victor_id).await?.map(|p| p.level).unwrap_or(1);
        let event = DefeatEvent {
            defeated_by: victor_name.to_string(),
            defeated_by_id: victor_id.to_string(),
            player_level: level,
            defeated_at: self.clock.now(),
        };
        push_defeat(&mut boss, event, self.config.legacy.history_cap);
        self.save_legacy(&boss).await?;
        info!(target: "quest.legacy", key, victor = victor_name, defeats = boss.defeat_count, "legacy boss defeated");
        Ok(())
    }

    pub async fn hall_of_fame_text(&self) -> Result<ActionResult, EngineError> {
        let bosses = self.legacy_bosses().await?;
        if bosses.is_empty() {
            return Ok(ActionResult::ok("🏛️ The Legacy Hall of Fame is empty. Reach max prestige and transcend to be the first!"));
        }
        let mut lines = vec!["🏛️ **Legacy Hall of Fame**".to_string()];
        for boss in &bosses {
            let mut line = format!(
                "• {} ({}, Transcendence #{}) | Prestige {} | {} wins | Defeated {}x",
                boss.display_name(),
                boss.class,
                boss.transcendence_number,
                boss.original_prestige,
                boss.total_wins,
                boss.defeat_count
            );
            if let Some(last) = boss.defeat_history.last() {
                line.push_str(&format!(" | Last felled by {}", last.defeated_by));
            }
            lines.push(line);
            if !boss.traits.is_empty() {
                lines.push(format!("  Traits: {}", boss.traits.join(", ")));
            }
        }
        Ok(ActionResult::ok(lines.join("\n")))
    }
}
