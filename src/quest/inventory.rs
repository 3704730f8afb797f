//! Inventory and consumables: the search roll, item use and the combat-effect lifecycle.

use super::items::{ItemKind, SearchOutcome, roll_search};
use super::registry::{award_xp, cooldown_left};
use super::{ActionResult, Actor, EngineError, QuestEngine, Rejection, energy, format_wait, injuries};
use crate::config::QuestConfig;
use crate::database::models::{ActiveEffect, PlayerRecord};
use crate::quest::leveling::XpCurve;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, instrument};

pub fn has_effect(p: &PlayerRecord, kind: ItemKind) -> bool {
    p.active_effects.iter().any(|e| e.kind() == kind)
}

/// Lucky-charm bonus as a fraction (0.15 for 15%), 0 when none is active.
pub fn win_bonus(p: &PlayerRecord) -> f64 {
    p.active_effects
        .iter()
        .find_map(|e| match e {
            ActiveEffect::LuckyCharm { win_bonus } => Some(f64::from(*win_bonus) / 100.0),
            _ => None,
        })
        .unwrap_or(0.0)
}

/// Armor-shard injury reduction as a fraction, 0 when no charges remain.
pub fn injury_reduction(p: &PlayerRecord) -> f64 {
    p.active_effects
        .iter()
        .find_map(|e| match e {
            ActiveEffect::ArmorShard { injury_reduction, remaining_fights } if *remaining_fights > 0 => {
                Some(f64::from(*injury_reduction) / 100.0)
            }
            _ => None,
        })
        .unwrap_or(0.0)
}

pub fn scroll_multiplier(p: &PlayerRecord) -> f64 {
    p.active_effects
        .iter()
        .find_map(|e| match e {
            ActiveEffect::XpScroll { xp_multiplier } => Some(*xp_multiplier),
            _ => None,
        })
        .unwrap_or(1.0)
}

/// Ages effects after one resolved fight: the charm is always spent, the scroll only on a
/// win, and armor loses a charge and falls off at zero.
pub fn process_combat_effects(p: &mut PlayerRecord, won: bool) {
    p.active_effects.retain_mut(|e| match e {
        ActiveEffect::LuckyCharm { .. } => false,
        ActiveEffect::XpScroll { .. } => !won,
        ActiveEffect::ArmorShard { remaining_fights, .. } => {
            *remaining_fights = remaining_fights.saturating_sub(1);
            *remaining_fights > 0
        }
    });
}

/// Activates a charm, shard or scroll from the inventory. Refuses when one of the same
/// kind is already active.
pub fn activate(p: &mut PlayerRecord, config: &QuestConfig, item: ItemKind) -> Result<ActiveEffect, Rejection> {
    let effect = match item {
        ItemKind::LuckyCharm => ActiveEffect::LuckyCharm { win_bonus: config.items.lucky_charm_win_bonus },
        ItemKind::ArmorShard => ActiveEffect::ArmorShard {
            injury_reduction: config.items.armor_shard_reduction,
            remaining_fights: config.items.armor_shard_charges,
        },
        ItemKind::XpScroll => ActiveEffect::XpScroll { xp_multiplier: config.items.xp_scroll_multiplier },
        ItemKind::Medkit | ItemKind::EnergyPotion => return Err(Rejection::UnknownItem(item.to_string())),
    };
    if p.item_count(item) == 0 {
        return Err(Rejection::NoItem(item.to_string()));
    }
    if has_effect(p, item) {
        return Err(Rejection::AlreadyActive(item.to_string()));
    }
    p.take_item(item);
    p.active_effects.push(effect.clone());
    Ok(effect)
}

pub fn drink_potion(p: &mut PlayerRecord, config: &QuestConfig, rng: &mut impl Rng) -> Result<u32, Rejection> {
    if p.item_count(ItemKind::EnergyPotion) == 0 {
        return Err(Rejection::NoItem(ItemKind::EnergyPotion.to_string()));
    }
    if p.energy >= p.max_energy {
        return Err(Rejection::EnergyFull);
    }
    p.take_item(ItemKind::EnergyPotion);
    let amount = rng.random_range(config.items.energy_potion_min..=config.items.energy_potion_max);
    Ok(energy::restore(p, amount))
}

/// Medkit on oneself: heals every injury for a reduced XP reward.
pub fn self_heal(
    p: &mut PlayerRecord,
    curve: &XpCurve,
    config: &QuestConfig,
    now: DateTime<Utc>,
) -> Result<ActionResult, Rejection> {
    if p.item_count(ItemKind::Medkit) == 0 {
        return Err(Rejection::NoItem(ItemKind::Medkit.to_string()));
    }
    injuries::sweep_expired(p, now);
    if p.active_injuries.is_empty() {
        return Err(Rejection::TargetNotInjured("You".to_string()));
    }
    p.take_item(ItemKind::Medkit);
    let healed = injuries::heal(p, None);
    p.challenge.medkits_used_this_prestige += 1;
    let award = award_xp(p, curve, config, config.items.medkit_base_xp, config.items.self_heal_xp_multiplier);
    let names: Vec<&str> = healed.iter().map(|i| i.name.as_str()).collect();
    let mut reply = vec![format!(
        "🩹 You patch yourself up and recover from {}. (+{} XP)",
        names.join(", "),
        award.level.xp_gained
    )];
    reply.extend(award.notes);
    Ok(ActionResult::ok(reply.join("\n")))
}

/// Medkit on someone else: heals all of their injuries and pays the healer the larger reward.
pub fn heal_other(
    healer: &mut PlayerRecord,
    patient: &mut PlayerRecord,
    curve: &XpCurve,
    config: &QuestConfig,
    now: DateTime<Utc>,
) -> Result<ActionResult, Rejection> {
    if healer.item_count(ItemKind::Medkit) == 0 {
        return Err(Rejection::NoItem(ItemKind::Medkit.to_string()));
    }
    injuries::sweep_expired(patient, now);
    if patient.active_injuries.is_empty() {
        return Err(Rejection::TargetNotInjured(patient.display_name().to_string()));
    }
    healer.take_item(ItemKind::Medkit);
    let healed = injuries::heal(patient, None);
    healer.challenge.medkits_used_this_prestige += 1;
    let award = award_xp(
        healer,
        curve,
        config,
        config.items.medkit_base_xp,
        config.items.altruistic_heal_xp_multiplier,
    );
    let names: Vec<&str> = healed.iter().map(|i| i.name.as_str()).collect();
    let mut reply = vec![format!(
        "🩹 You tend to {}'s wounds ({}). (+{} XP for helping)",
        patient.display_name(),
        names.join(", "),
        award.level.xp_gained
    )];
    reply.extend(award.notes);
    Ok(ActionResult::ok(reply.join("\n")).with_announcement(format!(
        "💚 {} healed {}!",
        healer.display_name(),
        patient.display_name()
    )))
}

/// The gated search roll. Gates: cooldown, injuries, energy.
pub fn search(
    p: &mut PlayerRecord,
    config: &QuestConfig,
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> Result<ActionResult, Rejection> {
    let recovered = injuries::sweep_expired(p, now);
    if let Some(wait) = cooldown_left(p.search_cooldown, now) {
        return Err(Rejection::OnCooldown { action: "search", wait: format_wait(wait) });
    }
    if injuries::is_injured(p, now) {
        return Err(Rejection::Injured { injuries: injuries::injury_names(p, now) });
    }
    let cost = config.items.search_energy_cost;
    if !energy::consume(p, cost) {
        return Err(Rejection::NotEnoughEnergy { needed: cost, have: p.energy });
    }
    p.search_cooldown = Some(now + Duration::seconds(config.items.search_cooldown_seconds));

    let mut lines: Vec<String> = recovered.into_iter().collect();
    match roll_search(&config.items.search_chances, rng.random::<f64>()) {
        SearchOutcome::Injury => {
            lines.push("While searching you stumble into trouble.".to_string());
            if let Some(outcome) = injuries::inflict_random(p, config, rng, now) {
                lines.push(outcome.message());
            }
        }
        SearchOutcome::Found(item) => {
            p.add_item(item, 1);
            let props = item.properties();
            lines.push(format!("{} You found a {}! ({})", props.emoji, props.display_name, props.description));
        }
        SearchOutcome::Nothing => lines.push("You search thoroughly but find nothing of value.".to_string()),
    }
    Ok(ActionResult::ok(lines.join("\n")))
}

pub fn inventory_lines(p: &PlayerRecord) -> Vec<String> {
    let mut lines: Vec<String> = ItemKind::ALL
        .iter()
        .filter(|item| p.item_count(**item) > 0)
        .map(|item| {
            let props = item.properties();
            format!("{} {} x{}", props.emoji, props.display_name, p.item_count(*item))
        })
        .collect();
    if lines.is_empty() {
        lines.push("Your pack is empty.".to_string());
    }
    for effect in &p.active_effects {
        lines.push(format!("✨ Active: {}", effect.describe()));
    }
    lines
}

impl QuestEngine {
    #[instrument(level = "debug", skip(self), fields(user = %actor.id))]
    pub async fn search(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        self.close_if_expired().await?;
        let config = self.config.clone();
        let now = self.clock.now();
        let res = self
            .players
            .update(&actor.id, &actor.name, |p| {
                let mut rng = rand::rng();
                search(p, &config, &mut rng, now)
            })
            .await?;
        Ok(res.unwrap_or_else(ActionResult::from))
    }

    /// Uses one item. `target` only matters for medkits; it may name another player.
    #[instrument(level = "debug", skip(self), fields(user = %actor.id))]
    pub async fn use_item(&self, actor: &Actor, item: &str, target: Option<&str>) -> Result<ActionResult, EngineError> {
        let Ok(kind) = item.parse::<ItemKind>() else {
            return Ok(Rejection::UnknownItem(item.to_string()).into());
        };
        let config = self.config.clone();
        let curve = self.players.curve();
        let now = self.clock.now();

        let res = match kind {
            ItemKind::Medkit => {
                let target_id = match target {
                    None => None,
                    Some(name) => match self.players.find_id(name).await? {
                        Some(id) if id == actor.id => None,
                        Some(id) => Some(id),
                        None => return Ok(Rejection::UnknownPlayer(name.to_string()).into()),
                    },
                };
                match target_id {
                    None => {
                        self.players
                            .update(&actor.id, &actor.name, |p| self_heal(p, curve, &config, now))
                            .await?
                    }
                    Some(id) => {
                        self.players
                            .update_pair((&actor.id, &actor.name), (&id, ""), |healer, patient| {
                                heal_other(healer, patient, curve, &config, now)
                            })
                            .await?
                    }
                }
            }
            ItemKind::EnergyPotion => self
                .players
                .update(&actor.id, &actor.name, |p| {
                    let mut rng = rand::rng();
                    drink_potion(p, &config, &mut rng).map(|added| {
                        ActionResult::ok(format!("🧪 You drink an energy potion. +{added} energy ({}/{})", p.energy, p.max_energy))
                    })
                })
                .await?,
            ItemKind::LuckyCharm | ItemKind::ArmorShard | ItemKind::XpScroll => self
                .players
                .update(&actor.id, &actor.name, |p| {
                    activate(p, &config, kind).map(|effect| ActionResult::ok(format!("✨ {} is now active.", effect.describe())))
                })
                .await?,
        };
        debug!(target: "quest.inventory", user = %actor.id, item = %kind, ok = res.is_ok(), "item used");
        Ok(res.unwrap_or_else(ActionResult::from))
    }

    pub async fn inventory_text(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        let p = self.player(actor).await?;
        let mut lines = vec![format!("🎒 **{}'s inventory**", p.display_name())];
        lines.extend(inventory_lines(&p));
        Ok(ActionResult::ok(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combat_effects_age() {
        let mut p = PlayerRecord::default();
        p.active_effects = vec![
            ActiveEffect::LuckyCharm { win_bonus: 15 },
            ActiveEffect::XpScroll { xp_multiplier: 1.5 },
            ActiveEffect::ArmorShard { injury_reduction: 30, remaining_fights: 2 },
        ];
        process_combat_effects(&mut p, false);
        assert_eq!(
            p.active_effects,
            vec![
                ActiveEffect::XpScroll { xp_multiplier: 1.5 },
                ActiveEffect::ArmorShard { injury_reduction: 30, remaining_fights: 1 },
            ]
        );
        process_combat_effects(&mut p, true);
        assert!(p.active_effects.is_empty());
    }

    #[test]
    fn effect_fractions() {
        let mut p = PlayerRecord::default();
        assert_eq!(win_bonus(&p), 0.0);
        assert_eq!(scroll_multiplier(&p), 1.0);
        p.active_effects.push(ActiveEffect::LuckyCharm { win_bonus: 15 });
        p.active_effects.push(ActiveEffect::ArmorShard { injury_reduction: 30, remaining_fights: 3 });
        assert!((win_bonus(&p) - 0.15).abs() < 1e-9);
        assert!((injury_reduction(&p) - 0.30).abs() < 1e-9);
    }

    #[test]
    fn second_charm_is_rejected_without_change() {
        let config = QuestConfig::default();
        let mut p = PlayerRecord::default();
        p.add_item(ItemKind::LuckyCharm, 2);
        assert!(activate(&mut p, &config, ItemKind::LuckyCharm).is_ok());
        let before = p.clone();
        assert_eq!(
            activate(&mut p, &config, ItemKind::LuckyCharm),
            Err(Rejection::AlreadyActive("Lucky Charm".to_string()))
        );
        assert_eq!(p, before);
    }
}
