//! Solo quests and the player profile.

use super::combat::{self, Matchup};
use super::leveling::XpCurve;
use super::registry::{apply_loss_penalty, award_xp, cooldown_left};
use super::{ActionResult, Actor, EngineError, QuestEngine, Rejection, energy, format_wait, injuries, inventory};
use crate::config::QuestConfig;
use crate::database::models::PlayerRecord;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{debug, instrument};

/// Result of one solo quest, before any boss trigger.
#[derive(Debug, Clone)]
pub struct SoloOutcome {
    pub result: ActionResult,
    pub won: bool,
    pub level: u32,
}

fn narrate(config: &QuestConfig, user: &str, monster: &str, rng: &mut impl Rng) -> String {
    let fill = |s: &String| s.replace("{user}", user).replace("{monster}", monster);
    let opener = config.content.openers.choose(rng).map(fill);
    let action = config.content.actions.choose(rng).map(fill);
    match (opener, action) {
        (Some(o), Some(a)) => format!("{o} {a}"),
        (Some(o), None) => o,
        (None, Some(a)) => a,
        (None, None) => format!("{user} encounters a {monster}!"),
    }
}

/// One gated solo fight. Gates, in order: cooldown, injuries, energy.
pub fn solo_quest(
    p: &mut PlayerRecord,
    curve: &XpCurve,
    config: &QuestConfig,
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> Result<SoloOutcome, Rejection> {
    let recovered = injuries::sweep_expired(p, now);
    if let Some(wait) = cooldown_left(p.quest_cooldown, now) {
        return Err(Rejection::OnCooldown { action: "quest", wait: format_wait(wait) });
    }
    if injuries::is_injured(p, now) {
        return Err(Rejection::Injured { injuries: injuries::injury_names(p, now) });
    }
    if !energy::consume(p, config.quest_energy_cost) {
        return Err(Rejection::NotEnoughEnergy { needed: config.quest_energy_cost, have: p.energy });
    }
    p.quest_cooldown = Some(now + Duration::seconds(config.quest_cooldown_seconds));

    let fallback = combat::fallback_monster();
    let monster = combat::pick_monster(&config.content.monsters, p.level, rng).unwrap_or(&fallback);
    let monster_level = rng.random_range(monster.min_level..=monster.max_level);
    let name = p.display_name().to_string();

    let fx = injuries::injury_effects(p, now);
    let chance = combat::win_chance(
        &config.combat,
        &Matchup {
            injury_multiplier: fx.xp_multiplier,
            charm_bonus: inventory::win_bonus(p),
            ..Matchup::solo(p.level, monster_level, p.prestige)
        },
    );
    let won = combat::resolve(chance, rng);

    let mut lines: Vec<String> = recovered.into_iter().collect();
    lines.push(narrate(config, &name, &monster.name, rng));
    if won {
        let base = rng.random_range(monster.xp_win_min..=monster.xp_win_max);
        let multiplier = inventory::scroll_multiplier(p) * fx.xp_multiplier;
        let award = award_xp(p, curve, config, base, multiplier);
        p.wins += 1;
        p.streak += 1;
        p.max_streak = p.max_streak.max(p.streak);
        lines.push(format!(
            "⚔️ Victory! {name} defeated the {} (Level {monster_level}) and gained {} XP. ({:.0}% odds)",
            monster.name,
            award.level.xp_gained,
            chance * 100.0
        ));
        if p.streak > 1 {
            lines.push(format!("🔥 Win streak: {}", p.streak));
        }
        lines.extend(award.notes);
    } else {
        p.losses += 1;
        p.streak = 0;
        let lost = apply_loss_penalty(p, curve, config);
        lines.push(format!(
            "💀 Defeat! The {} (Level {monster_level}) was too strong. You lost {lost} XP. ({:.0}% odds)",
            monster.name,
            chance * 100.0
        ));
        let reduction = inventory::injury_reduction(p);
        if let Some(injury) = injuries::roll_on_loss(p, config, reduction, rng, now) {
            lines.push(injury.message());
        }
    }
    inventory::process_combat_effects(p, won);
    Ok(SoloOutcome { result: ActionResult::ok(lines.join("\n")), won, level: p.level })
}

/// Multi-line status card for one player.
pub fn profile_text(p: &PlayerRecord, curve: &XpCurve, config: &QuestConfig, now: DateTime<Utc>) -> String {
    let mut lines = vec![format!("👤 **{}**'s Profile", p.display_name())];
    lines.push(format!("📊 Level {} (Prestige {})", p.level, p.prestige));
    match curve.xp_to_next(p.level, p.xp) {
        Some(needed) => lines.push(format!("⭐ XP: {} ({needed} XP to level {})", p.xp, p.level + 1)),
        None => lines.push(format!("⭐ XP: {} (level cap reached)", p.xp)),
    }
    let mut energy_line = format!("⚡ Energy: {}", energy::energy_bar(p));
    if p.energy < p.max_energy && config.energy.enabled {
        energy_line.push_str(&format!(
            " | +{} in {}",
            energy::regen_amount(p, config, now),
            format_wait(energy::next_regen_in(p, config, now))
        ));
    }
    lines.push(energy_line);
    lines.push(format!("🏆 Wins: {} | Losses: {}", p.wins, p.losses));
    lines.push(format!("🔥 Current Streak: {} | Best: {}", p.streak, p.max_streak));
    if let Some(class) = &p.class {
        lines.push(format!("🎭 Class: {class}"));
    }
    lines.push(format!("🎒 {}", inventory::inventory_lines(p).join(" | ")));
    let hurt = injuries::describe(p, now);
    if !hurt.is_empty() {
        lines.push(format!("🩹 Injuries: {}", hurt.join(", ")));
    }
    if !p.unlocked_abilities.is_empty() {
        let abilities: Vec<String> = p
            .unlocked_abilities
            .iter()
            .map(|id| {
                let name = config.challenges.abilities.get(id).map(|a| a.name.as_str()).unwrap_or(id);
                match cooldown_left(p.ability_cooldowns.get(id).copied(), now) {
                    Some(wait) => format!("{name} ({} left)", format_wait(wait)),
                    None => format!("{name} (ready)"),
                }
            })
            .collect();
        lines.push(format!("🌀 Abilities: {}", abilities.join(", ")));
    }
    if !p.prestige_bonuses.is_empty() {
        lines.push(format!("✨ Bonuses: {}", p.prestige_bonuses.join(", ")));
    }
    if let Some(path) = &p.challenge.path {
        let name = config.challenges.paths.get(path).map(|c| c.name.as_str()).unwrap_or(path);
        let state = if p.challenge.completed { "completed" } else { "in progress" };
        lines.push(format!("🎯 Challenge Path: {name} ({state})"));
    }
    if p.transcendence_count > 0 {
        lines.push(format!("🌌 Transcended {}x", p.transcendence_count));
    }
    lines.join("\n")
}

impl QuestEngine {
    #[instrument(level = "debug", skip(self), fields(user = %actor.id))]
    pub async fn quest(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        self.close_if_expired().await?;
        let config = self.config.clone();
        let curve = self.players.curve();
        let now = self.clock.now();
        let outcome = self
            .players
            .update(&actor.id, &actor.name, |p| {
                let mut rng = rand::rng();
                solo_quest(p, curve, &config, &mut rng, now)
            })
            .await?;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(why) => return Ok(why.into()),
        };
        debug!(target: "quest.solo", user = %actor.id, won = outcome.won, level = outcome.level, "solo quest");
        let mut result = outcome.result;
        if outcome.won
            && let Some(announcement) = self.maybe_trigger_boss(actor, outcome.level).await?
        {
            result = result.with_announcement(announcement);
        }
        Ok(result)
    }

    pub async fn profile(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        let p = self.player(actor).await?;
        Ok(ActionResult::ok(profile_text(&p, self.players.curve(), &self.config, self.clock.now())))
    }

    /// Profile of another player by name or id.
    pub async fn profile_of(&self, name: &str) -> Result<ActionResult, EngineError> {
        let Some(id) = self.players.find_id(name).await? else {
            return Ok(Rejection::UnknownPlayer(name.to_string()).into());
        };
        let Some(p) = self.players.peek(&id).await? else {
            return Ok(Rejection::UnknownPlayer(name.to_string()).into());
        };
        Ok(ActionResult::ok(profile_text(&p, self.players.curve(), &self.config, self.clock.now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narration_substitutes_names() {
        let mut config = QuestConfig::default();
        config.content.openers = vec!["{user} sets out.".to_string()];
        config.content.actions = vec!["A {monster} appears!".to_string()];
        let text = narrate(&config, "ana", "Rat", &mut rand::rng());
        assert_eq!(text, "ana sets out. A Rat appears!");
    }

    #[test]
    fn cooldown_blocks_second_quest() {
        let config = QuestConfig::default();
        let curve = XpCurve::linear(config.level_cap);
        let now = Utc::now();
        let mut p = PlayerRecord::new("1", "ana", 10, now);
        let mut rng = rand::rng();
        assert!(solo_quest(&mut p, &curve, &config, &mut rng, now).is_ok());
        let energy = p.energy;
        let second = solo_quest(&mut p, &curve, &config, &mut rng, now + Duration::seconds(10));
        assert!(matches!(second, Err(Rejection::OnCooldown { action: "quest", .. })));
        assert_eq!(p.energy, energy);
    }
}
