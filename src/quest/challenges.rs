//! Challenge paths and the abilities they unlock.

use super::registry::{cooldown_left, reset_progress};
use super::{ActionResult, Actor, EngineError, QuestEngine, Rejection, energy, format_wait, injuries, inventory};
use crate::config::{AbilityDef, AbilityEffect, ChallengePath, QuestConfig};
use crate::constants::{ACTIVE_PATH_KEY, STATE_MODULE};
use crate::database::models::{ActiveEffect, ChallengeStats, PlayerRecord};
use crate::quest::items::ItemKind;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};

/// Checks whether `p` satisfies `path`'s entry requirements.
pub fn check_requirements(p: &PlayerRecord, path: &ChallengePath) -> Result<(), Rejection> {
    let req = &path.requirements;
    if p.prestige < req.min_prestige {
        return Err(Rejection::RequirementsNotMet(format!(
            "You need at least Prestige {} to enter this challenge path.",
            req.min_prestige
        )));
    }
    if let Some(max) = req.max_prestige
        && p.prestige > max
    {
        return Err(Rejection::RequirementsNotMet(format!(
            "You have exceeded the maximum prestige ({max}) for this challenge path."
        )));
    }
    Ok(())
}

/// Challenge prestige: a full reset that also clears the challenge counters and binds the
/// player to `path_id`.
pub fn enter_path(
    p: &mut PlayerRecord,
    config: &QuestConfig,
    path_id: &str,
    now: DateTime<Utc>,
) -> Result<String, Rejection> {
    let path = config.challenges.paths.get(path_id).ok_or(Rejection::NoActivePath)?;
    if p.level < config.level_cap {
        return Err(Rejection::NotAtLevelCap(config.level_cap));
    }
    if p.prestige >= config.max_prestige {
        return Err(Rejection::MaxPrestige(config.max_prestige));
    }
    check_requirements(p, path)?;

    reset_progress(p, config);
    p.challenge = ChallengeStats {
        path: Some(path_id.to_string()),
        medkits_used_this_prestige: 0,
        completed: false,
        entered_at: Some(now),
    };
    p.prestige += 1;
    p.effective_prestige += 1;
    p.prestige_bonuses.push(format!(
        "+{}% XP gain (Prestige {})",
        (config.prestige_xp_bonus * 100.0).round(),
        p.prestige
    ));
    Ok(path.name.clone())
}

/// Evaluated when the player reaches the level cap. Grants the path's rewards once.
pub fn check_completion(p: &mut PlayerRecord, config: &QuestConfig) -> Vec<String> {
    let Some(path_id) = p.challenge.path.clone() else {
        return Vec::new();
    };
    if p.challenge.completed || p.level < config.level_cap {
        return Vec::new();
    }
    let Some(path) = config.challenges.paths.get(&path_id) else {
        return Vec::new();
    };

    let mut issues = Vec::new();
    if path.requirements.no_medkits && p.challenge.medkits_used_this_prestige > 0 {
        issues.push(format!("used {} medkit(s)", p.challenge.medkits_used_this_prestige));
    }
    if !issues.is_empty() {
        let mut messages = vec![
            "❌ **Challenge Failed**".to_string(),
            format!(
                "You reached level {}, but you did not complete the challenge requirements:",
                config.level_cap
            ),
        ];
        messages.extend(issues.into_iter().map(|i| format!("• {i}")));
        messages.push("You can keep playing, but you won't earn the challenge rewards.".to_string());
        return messages;
    }

    p.challenge.completed = true;
    let mut messages = vec![
        "🎉 **CHALLENGE COMPLETED!**".to_string(),
        format!("You have successfully completed the {} challenge!", path.name),
    ];
    if let Some(ability_id) = &path.rewards.ability_unlock
        && !p.unlocked_abilities.contains(ability_id)
    {
        p.unlocked_abilities.push(ability_id.clone());
        match config.challenges.abilities.get(ability_id) {
            Some(ability) => {
                messages.push(format!("✨ **NEW ABILITY UNLOCKED: {}!**", ability.name));
                messages.push(format!("Use the ability command `{}` to activate it.", ability.command));
            }
            None => messages.push(format!("✨ **NEW ABILITY UNLOCKED: {ability_id}!**")),
        }
    }
    if let Some(bonus) = &path.rewards.prestige_bonus {
        p.prestige_bonuses.push(bonus.clone());
        messages.push(format!("🎁 **Reward:** {bonus}"));
    }
    info!(target: "quest.challenge", user = %p.id, path = %path_id, "challenge completed");
    messages
}

/// Validates an ability use and reserves its cooldown. Returns the ability id.
pub fn reserve_ability(
    p: &mut PlayerRecord,
    config: &QuestConfig,
    command: &str,
    now: DateTime<Utc>,
) -> Result<String, Rejection> {
    let (id, ability) = config
        .ability_by_command(command)
        .ok_or_else(|| Rejection::UnknownAbility(command.to_string()))?;
    if !p.unlocked_abilities.contains(id) {
        return Err(Rejection::AbilityLocked(command.to_string()));
    }
    if let Some(wait) = cooldown_left(p.ability_cooldowns.get(id).copied(), now) {
        return Err(Rejection::AbilityOnCooldown(format_wait(wait)));
    }
    let minutes = (ability.cooldown_hours.max(0.0) * 60.0).round() as i64;
    p.ability_cooldowns.insert(id.clone(), now + Duration::minutes(minutes));
    Ok(id.clone())
}

/// Lucky-charm buff from an ability. Players who already carry a charm keep theirs.
pub fn grant_charm(p: &mut PlayerRecord, win_bonus: u32) -> bool {
    if inventory::has_effect(p, ItemKind::LuckyCharm) {
        return false;
    }
    p.active_effects.push(ActiveEffect::LuckyCharm { win_bonus });
    true
}

fn announce(ability: &AbilityDef, user: &str) -> String {
    ability.announcement.replace("{user}", user).replace("{ability}", &ability.name)
}

impl QuestEngine {
    pub async fn active_path(&self) -> Option<String> {
        self.active_path.read().await.clone()
    }

    /// Operator toggle. `None` deactivates; the choice is persisted.
    #[instrument(level = "debug", skip(self))]
    pub async fn set_active_path(&self, path_id: Option<&str>) -> Result<ActionResult, EngineError> {
        if let Some(id) = path_id
            && !self.config.challenges.paths.contains_key(id)
        {
            let known: Vec<&str> = self.config.challenges.paths.keys().map(String::as_str).collect();
            return Ok(Rejection::UnknownPath(id.to_string(), known.join(", ")).into());
        }
        let mut active = self.active_path.write().await;
        let value = path_id.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null);
        self.players.store().replace(STATE_MODULE, ACTIVE_PATH_KEY, value).await?;
        *active = path_id.map(str::to_string);
        info!(target: "quest.challenge", path = ?path_id, "active challenge path changed");
        Ok(ActionResult::ok(match path_id.and_then(|id| self.config.challenges.paths.get(id)) {
            Some(path) => format!("🎯 Challenge path activated: {}", path.name),
            None => "🎯 Challenge paths deactivated.".to_string(),
        }))
    }

    /// Loads the persisted toggle; the config's `active_path` applies until one exists.
    pub(crate) async fn restore_active_path(&self) -> Result<(), EngineError> {
        let stored = self.players.store().get(STATE_MODULE, ACTIVE_PATH_KEY).await?;
        let path = match stored {
            Some(Value::String(id)) if self.config.challenges.paths.contains_key(&id) => Some(id),
            Some(Value::String(id)) => {
                warn!(target: "quest.challenge", path = %id, "stored active path no longer configured");
                None
            }
            Some(_) => None,
            None => self.config.challenges.active_path.clone(),
        };
        *self.active_path.write().await = path;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(user = %actor.id))]
    pub async fn enter_challenge(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        let Some(path_id) = self.active_path().await else {
            return Ok(Rejection::NoActivePath.into());
        };
        let config = self.config.clone();
        let now = self.clock.now();
        let res = self
            .players
            .update(&actor.id, &actor.name, |p| enter_path(p, &config, &path_id, now).map(|name| (name, p.prestige)))
            .await?;
        Ok(match res {
            Ok((name, prestige)) => {
                info!(target: "quest.challenge", user = %actor.id, path = %path_id, prestige, "entered challenge path");
                ActionResult::ok(format!(
                    "🎯 **CHALLENGE PATH ENTERED!** You are now on the {name} challenge path! (Prestige {prestige})"
                ))
                .with_announcement(format!("🎯 {} has entered the {name}!", actor.name))
            }
            Err(why) => why.into(),
        })
    }

    pub async fn challenges_text(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        let active = self.active_path().await;
        let p = self.player(actor).await?;
        let mut lines = vec!["🎯 **Challenge Paths**".to_string()];
        if self.config.challenges.paths.is_empty() {
            lines.push("No challenge paths are configured.".to_string());
        }
        for (id, path) in &self.config.challenges.paths {
            let marker = if active.as_deref() == Some(id.as_str()) { " [ACTIVE]" } else { "" };
            lines.push(format!("• **{}**{marker}: {}", path.name, path.description));
            let req = &path.requirements;
            let mut rules = vec![format!("min prestige {}", req.min_prestige)];
            if let Some(max) = req.max_prestige {
                rules.push(format!("max prestige {max}"));
            }
            if req.no_medkits {
                rules.push("no medkits".to_string());
            }
            lines.push(format!("  Requirements: {}", rules.join(", ")));
            if let Some(ability) = &path.rewards.ability_unlock {
                let name = self.config.challenges.abilities.get(ability).map(|a| a.name.as_str()).unwrap_or(ability);
                lines.push(format!("  Reward: {name}"));
            }
        }
        if let Some(path) = &p.challenge.path {
            let state = if p.challenge.completed { "completed" } else { "in progress" };
            lines.push(format!("Your path: {path} ({state}, {} medkits used)", p.challenge.medkits_used_this_prestige));
        }
        Ok(ActionResult::ok(lines.join("\n")))
    }

    pub async fn abilities_text(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        let p = self.player(actor).await?;
        let now = self.clock.now();
        let listed: Vec<String> = p
            .unlocked_abilities
            .iter()
            .filter_map(|id| self.config.challenges.abilities.get(id).map(|a| (id, a)))
            .map(|(id, a)| {
                let status = match cooldown_left(p.ability_cooldowns.get(id).copied(), now) {
                    Some(wait) => format!("Cooldown: {}", format_wait(wait)),
                    None => "READY".to_string(),
                };
                format!("• {}{} - {} [{status}]", self.prefix, a.command, a.description)
            })
            .collect();
        if listed.is_empty() {
            return Ok(ActionResult::ok(
                "🎭 You haven't unlocked any abilities yet. Complete challenge paths to earn them!",
            ));
        }
        Ok(ActionResult::ok(format!("🎭 **Your Abilities:**\n{}", listed.join("\n"))))
    }

    /// Uses an unlocked ability by its command. The cooldown is reserved up front and
    /// released again if the effect turns out to do nothing.
    #[instrument(level = "debug", skip(self), fields(user = %actor.id))]
    pub async fn use_ability(&self, actor: &Actor, command: &str) -> Result<ActionResult, EngineError> {
        let config = self.config.clone();
        let now = self.clock.now();
        let reserved = self
            .players
            .update(&actor.id, &actor.name, |p| reserve_ability(p, &config, command, now))
            .await?;
        let id = match reserved {
            Ok(id) => id,
            Err(why) => return Ok(why.into()),
        };
        let Some(ability) = config.challenges.abilities.get(&id) else {
            return Ok(Rejection::UnknownAbility(command.to_string()).into());
        };

        let applied = match ability.effect {
            AbilityEffect::HealAllInjuries => {
                let healed = self.heal_everyone().await?;
                (healed > 0).then(|| format!("Healed {healed} adventurer(s)."))
            }
            AbilityEffect::RestoreEnergy => {
                let amount = ability.effect_data.energy_amount.unwrap_or(5);
                let added = self.players.update(&actor.id, &actor.name, |p| energy::restore(p, amount)).await?;
                (added > 0).then(|| format!("+{added} energy."))
            }
            AbilityEffect::BuffParty => {
                let bonus = ability.effect_data.win_bonus.unwrap_or(config.items.lucky_charm_win_bonus);
                let mut party = self.open_party().await;
                if party.is_empty() {
                    party.push(super::encounter::Participant { id: actor.id.clone(), name: actor.name.clone() });
                }
                let mut blessed = 0;
                for member in &party {
                    if self.players.update(&member.id, &member.name, |p| grant_charm(p, bonus)).await? {
                        blessed += 1;
                    }
                }
                Some(format!("{blessed} adventurer(s) feel lucky (+{bonus}% win chance next fight)."))
            }
        };

        match applied {
            Some(detail) => {
                info!(target: "quest.challenge", user = %actor.id, ability = %id, "ability used");
                let text = announce(ability, &actor.name);
                Ok(ActionResult::ok(format!("{text} {detail}")).with_announcement(text))
            }
            None => {
                let set_at = now
                    + Duration::minutes((ability.cooldown_hours.max(0.0) * 60.0).round() as i64);
                self.players
                    .update(&actor.id, &actor.name, |p| {
                        if p.ability_cooldowns.get(&id) == Some(&set_at) {
                            p.ability_cooldowns.remove(&id);
                        }
                    })
                    .await?;
                Ok(Rejection::AbilityNoEffect(ability.name.clone()).into())
            }
        }
    }

    /// Clears every active injury on every stored player. Returns how many were healed.
    pub(crate) async fn heal_everyone(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let mut healed = 0;
        for id in self.players.ids().await? {
            let cured = self
                .players
                .update(&id, "", |p| {
                    injuries::sweep_expired(p, now);
                    !injuries::heal(p, None).is_empty()
                })
                .await?;
            if cured {
                healed += 1;
            }
        }
        Ok(healed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capped(config: &QuestConfig) -> PlayerRecord {
        let mut p = PlayerRecord::default();
        p.level = config.level_cap;
        p.xp = 5000;
        p.prestige = 1;
        p
    }

    #[test]
    fn entering_resets_and_binds_path() {
        let config = QuestConfig::default();
        let mut p = capped(&config);
        p.add_item(ItemKind::Medkit, 3);
        p.challenge.medkits_used_this_prestige = 4;
        let name = enter_path(&mut p, &config, "iron_path", Utc::now()).unwrap();
        assert_eq!(name, "Path of Iron");
        assert_eq!(p.level, 1);
        assert_eq!(p.prestige, 2);
        assert_eq!(p.item_count(ItemKind::Medkit), 0);
        assert_eq!(p.challenge.path.as_deref(), Some("iron_path"));
        assert_eq!(p.challenge.medkits_used_this_prestige, 0);
    }

    #[test]
    fn requirements_are_enforced() {
        let config = QuestConfig::default();
        let mut p = capped(&config);
        p.prestige = 0;
        assert!(matches!(
            enter_path(&mut p, &config, "iron_path", Utc::now()),
            Err(Rejection::RequirementsNotMet(_))
        ));
        p.prestige = 6;
        assert!(matches!(
            enter_path(&mut p, &config, "warlord_path", Utc::now()),
            Err(Rejection::RequirementsNotMet(_))
        ));
        p.level = 3;
        assert_eq!(
            enter_path(&mut p, &config, "iron_path", Utc::now()),
            Err(Rejection::NotAtLevelCap(config.level_cap))
        );
    }

    #[test]
    fn completion_unlocks_once() {
        let config = QuestConfig::default();
        let mut p = capped(&config);
        p.challenge.path = Some("iron_path".to_string());
        let msgs = check_completion(&mut p, &config);
        assert!(msgs[0].contains("COMPLETED"));
        assert_eq!(p.unlocked_abilities, vec!["field_medic".to_string()]);
        p.challenge.completed = false;
        check_completion(&mut p, &config);
        assert_eq!(p.unlocked_abilities.len(), 1);
    }

    #[test]
    fn medkit_use_fails_iron_path() {
        let config = QuestConfig::default();
        let mut p = capped(&config);
        p.challenge.path = Some("iron_path".to_string());
        p.challenge.medkits_used_this_prestige = 2;
        let msgs = check_completion(&mut p, &config);
        assert!(msgs[0].contains("Failed"));
        assert!(msgs.iter().any(|m| m.contains("used 2 medkit(s)")));
        assert!(p.unlocked_abilities.is_empty());
        assert!(!p.challenge.completed);
    }

    #[test]
    fn ability_gates() {
        let config = QuestConfig::default();
        let now = Utc::now();
        let mut p = PlayerRecord::default();
        assert_eq!(
            reserve_ability(&mut p, &config, "nope", now),
            Err(Rejection::UnknownAbility("nope".to_string()))
        );
        assert_eq!(
            reserve_ability(&mut p, &config, "medic", now),
            Err(Rejection::AbilityLocked("medic".to_string()))
        );
        p.unlocked_abilities.push("field_medic".to_string());
        assert_eq!(reserve_ability(&mut p, &config, "MEDIC", now), Ok("field_medic".to_string()));
        assert!(matches!(
            reserve_ability(&mut p, &config, "medic", now + Duration::hours(1)),
            Err(Rejection::AbilityOnCooldown(_))
        ));
        assert!(reserve_ability(&mut p, &config, "medic", now + Duration::hours(24)).is_ok());
    }
}
