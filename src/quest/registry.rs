//! Player registry: XP grants and deductions, prestige, classes and leaderboards.

use super::leveling::{LevelUpResult, XpCurve};
use super::{ActionResult, Actor, EngineError, QuestEngine, Rejection, challenges, legacy};
use crate::config::QuestConfig;
use crate::database::models::PlayerRecord;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use tracing::{info, instrument};

/// Multiplier applied on top of every XP grant from prestige and transcendence bonuses.
pub fn xp_bonus_multiplier(p: &PlayerRecord, config: &QuestConfig) -> f64 {
    let mut bonus = f64::from(p.effective_prestige) * config.prestige_xp_bonus;
    if p.transcendence_count > 0 {
        bonus += legacy::transcendence_bonus(config, p.transcendence_count);
    }
    1.0 + bonus
}

/// Adds XP (scaled by `multiplier` and the player's permanent bonuses) and re-derives the
/// level. The level never goes down here, and max energy rises at configured thresholds.
pub fn grant_xp(
    p: &mut PlayerRecord,
    curve: &XpCurve,
    config: &QuestConfig,
    amount: u64,
    multiplier: f64,
) -> LevelUpResult {
    let scaled = (amount as f64 * multiplier.max(0.0)).floor();
    let xp_gained = (scaled * xp_bonus_multiplier(p, config)).floor() as u64;
    let old_level = p.level;
    p.xp = p.xp.saturating_add(xp_gained);
    let new_level = curve.level_for_xp(p.xp).max(old_level);
    p.level = new_level;

    let mut max_energy_raised_to = None;
    if new_level > old_level {
        let max = config.max_energy_for_level(new_level);
        if max > p.max_energy {
            p.max_energy = max;
            max_energy_raised_to = Some(max);
        }
    }
    LevelUpResult {
        xp_gained,
        old_level,
        new_level,
        did_level_up: new_level > old_level,
        reached_cap: new_level > old_level && new_level >= curve.level_cap(),
        max_energy_raised_to,
    }
}

/// Removes up to `amount` XP without crossing the current level's floor.
/// Returns what was actually removed.
pub fn deduct_xp(p: &mut PlayerRecord, curve: &XpCurve, amount: u64) -> u64 {
    let floor = curve.level_floor(p.level);
    let actual = amount.min(p.xp.saturating_sub(floor));
    p.xp -= actual;
    actual
}

/// Defeat penalty: a share of the XP earned inside the current level.
pub fn apply_loss_penalty(p: &mut PlayerRecord, curve: &XpCurve, config: &QuestConfig) -> u64 {
    let above_floor = p.xp.saturating_sub(curve.level_floor(p.level));
    let penalty = (above_floor as f64 * config.xp_loss_percentage).floor() as u64;
    deduct_xp(p, curve, penalty)
}

/// XP grant plus the messages it produced (level ups, energy, challenge completion).
#[derive(Debug, Clone)]
pub struct XpAward {
    pub level: LevelUpResult,
    pub notes: Vec<String>,
}

pub fn award_xp(
    p: &mut PlayerRecord,
    curve: &XpCurve,
    config: &QuestConfig,
    amount: u64,
    multiplier: f64,
) -> XpAward {
    let level = grant_xp(p, curve, config, amount, multiplier);
    let mut notes = Vec::new();
    if level.did_level_up {
        notes.push(format!("🎉 {} reached level {}!", p.display_name(), level.new_level));
    }
    if let Some(max) = level.max_energy_raised_to {
        notes.push(format!("⚡ Max energy increased to {max}."));
    }
    if level.reached_cap {
        notes.extend(challenges::check_completion(p, config));
    }
    XpAward { level, notes }
}

/// Wipes a player's run: level, XP, record, inventory, effects, injuries and cooldowns.
/// Energy is reset to the level-1 pool and filled.
pub fn reset_progress(p: &mut PlayerRecord, config: &QuestConfig) {
    p.level = 1;
    p.xp = 0;
    p.wins = 0;
    p.losses = 0;
    p.streak = 0;
    p.max_streak = 0;
    p.inventory.clear();
    p.active_effects.clear();
    p.active_injuries.clear();
    p.quest_cooldown = None;
    p.search_cooldown = None;
    super::energy::reset_pool(p, config);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrestigeOutcome {
    pub new_prestige: u32,
    pub bonus: String,
}

pub fn prestige(p: &mut PlayerRecord, config: &QuestConfig) -> Result<PrestigeOutcome, Rejection> {
    if p.level < config.level_cap {
        return Err(Rejection::NotAtLevelCap(config.level_cap));
    }
    if p.prestige >= config.max_prestige {
        return Err(Rejection::MaxPrestige(config.max_prestige));
    }
    reset_progress(p, config);
    // The path record carries over; only the per-prestige counter restarts.
    p.challenge.medkits_used_this_prestige = 0;
    p.prestige += 1;
    p.effective_prestige += 1;
    let bonus = format!(
        "+{}% XP gain (Prestige {})",
        (config.prestige_xp_bonus * 100.0).round(),
        p.prestige
    );
    p.prestige_bonuses.push(bonus.clone());
    Ok(PrestigeOutcome { new_prestige: p.prestige, bonus })
}

pub fn assign_class(p: &mut PlayerRecord, config: &QuestConfig, requested: &str) -> Result<String, Rejection> {
    let class = config
        .class_named(requested)
        .ok_or_else(|| Rejection::UnknownClass(requested.to_string(), config.content.classes.join(", ")))?;
    p.class = Some(class.clone());
    Ok(class.clone())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaderboardKind {
    #[default]
    Prestige,
    Level,
    Wins,
}

impl FromStr for LeaderboardKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prestige" | "p" => Ok(LeaderboardKind::Prestige),
            "level" | "lvl" | "xp" => Ok(LeaderboardKind::Level),
            "wins" | "w" => Ok(LeaderboardKind::Wins),
            _ => Err(()),
        }
    }
}

/// Orders players best-first for the given board, ties broken by name.
pub fn rank(players: &mut [PlayerRecord], kind: LeaderboardKind) {
    players.sort_by(|a, b| {
        let key = |p: &PlayerRecord| match kind {
            LeaderboardKind::Prestige => (u64::from(p.prestige), u64::from(p.level), p.xp),
            LeaderboardKind::Level => (u64::from(p.level), p.xp, 0),
            LeaderboardKind::Wins => (u64::from(p.wins), u64::from(p.level), 0),
        };
        key(b).cmp(&key(a)).then_with(|| a.display_name().cmp(b.display_name()))
    });
}

/// Whether a player still has an ongoing cooldown, and how long is left.
pub fn cooldown_left(until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<chrono::Duration> {
    until.filter(|t| *t > now).map(|t| t - now)
}

impl QuestEngine {
    /// The player's record, created on first access.
    pub async fn player(&self, actor: &Actor) -> Result<PlayerRecord, EngineError> {
        Ok(self.players.load(&actor.id, &actor.name).await?)
    }

    #[instrument(level = "debug", skip(self), fields(user = %id))]
    pub async fn grant_xp(&self, id: &str, amount: u64, multiplier: f64) -> Result<XpAward, EngineError> {
        let config = self.config.clone();
        let award = self
            .players
            .update(id, "", |p| award_xp(p, self.players.curve(), &config, amount, multiplier))
            .await?;
        Ok(award)
    }

    #[instrument(level = "debug", skip(self), fields(user = %id))]
    pub async fn deduct_xp(&self, id: &str, amount: u64) -> Result<u64, EngineError> {
        Ok(self
            .players
            .update(id, "", |p| deduct_xp(p, self.players.curve(), amount))
            .await?)
    }

    #[instrument(level = "debug", skip(self), fields(user = %actor.id))]
    pub async fn prestige(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        let config = self.config.clone();
        let outcome = self
            .players
            .update(&actor.id, &actor.name, |p| prestige(p, &config))
            .await?;
        match outcome {
            Ok(done) => {
                info!(target: "quest.registry", user = %actor.id, prestige = done.new_prestige, "player prestiged");
                let total = (f64::from(done.new_prestige) * config.prestige_xp_bonus * 100.0).round();
                Ok(ActionResult::ok(format!(
                    "🌟 PRESTIGE COMPLETE! You are now Prestige {}. All progress has been reset, but you gain {}% more XP forever!",
                    done.new_prestige, total
                ))
                .with_announcement(format!("🌟 {} has reached Prestige {}!", actor.name, done.new_prestige)))
            }
            Err(Rejection::MaxPrestige(max)) => {
                let reason = match self.transcend_check(actor).await? {
                    Ok(()) => format!(
                        "You've reached the maximum prestige level of {max}! Use transcend to become a Legacy Boss and begin anew."
                    ),
                    Err(why) => format!("You've reached the maximum prestige level of {max}! {why}"),
                };
                Ok(ActionResult { success: false, reply: reason, announcements: Vec::new() })
            }
            Err(why) => Ok(why.into()),
        }
    }

    pub async fn choose_class(&self, actor: &Actor, class: &str) -> Result<ActionResult, EngineError> {
        let config = self.config.clone();
        let res = self
            .players
            .update(&actor.id, &actor.name, |p| assign_class(p, &config, class))
            .await?;
        Ok(match res {
            Ok(class) => ActionResult::ok(format!("{} is now a {class}.", actor.name)),
            Err(why) => why.into(),
        })
    }

    pub async fn leaderboard(&self, kind: LeaderboardKind, limit: usize) -> Result<Vec<PlayerRecord>, EngineError> {
        let mut players = self.players.all().await?;
        players.retain(|p| p.xp > 0 || p.prestige > 0 || p.wins > 0);
        rank(&mut players, kind);
        players.truncate(limit);
        Ok(players)
    }

    pub async fn leaderboard_text(&self, kind: LeaderboardKind, limit: usize) -> Result<ActionResult, EngineError> {
        let players = self.leaderboard(kind, limit).await?;
        if players.is_empty() {
            return Ok(ActionResult::ok("No adventurers on the board yet."));
        }
        let title = match kind {
            LeaderboardKind::Prestige => "Prestige",
            LeaderboardKind::Level => "Level",
            LeaderboardKind::Wins => "Wins",
        };
        let mut lines = vec![format!("🏆 **Leaderboard: {title}**")];
        for (i, p) in players.iter().enumerate() {
            lines.push(format!(
                "{}. {} - P{} L{} ({} XP) | {}W/{}L",
                i + 1,
                p.display_name(),
                p.prestige,
                p.level,
                p.xp,
                p.wins,
                p.losses
            ));
        }
        Ok(ActionResult::ok(lines.join("\n")))
    }
}
