use super::{EncounterKind, EncounterRecord, Foe, LegacyFoe, Participant, SlotState};
use crate::config::{MonsterDef, QuestConfig};
use crate::constants::{ACTIVE_ENCOUNTER_KEY, CHANNEL_COOLDOWNS_KEY, ENCOUNTER_TAG, STATE_MODULE};
use crate::database::StoreError;
use crate::database::models::PlayerRecord;
use crate::quest::combat::{self, Matchup};
use crate::quest::leveling::XpCurve;
use crate::quest::registry::{apply_loss_penalty, award_xp};
use crate::quest::{ActionResult, Actor, EngineError, QuestEngine, Rejection, energy, format_wait, injuries, inventory};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

pub const NOBODY_JOINED: &str = "No one joined the mob encounter. The monster wanders off...";

/// What a finished resolution produced, for callers and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterReport {
    pub won: bool,
    pub win_chance: f64,
    pub party_size: usize,
    pub xp_each: u64,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// The window closed with nobody in it.
    Abandoned,
    Resolved(EncounterReport),
}

fn foe_from(def: &MonsterDef, level: u32) -> Foe {
    Foe {
        name: def.name.clone(),
        level,
        xp_min: def.xp_win_min,
        xp_max: def.xp_win_max,
        legacy: None,
    }
}

/// An ordinary or rare mob a couple of levels above `level`.
fn roll_mob(config: &QuestConfig, level: u32, rng: &mut impl Rng) -> (EncounterKind, Foe, f64) {
    let fallback = combat::fallback_monster();
    let def = combat::pick_monster(&config.content.monsters, level, rng).unwrap_or(&fallback);
    let foe = foe_from(def, level + config.encounter.mob_level_offset);
    if rng.random_bool(config.encounter.rare_chance) {
        (EncounterKind::Rare, foe, config.encounter.rare_xp_multiplier)
    } else {
        (EncounterKind::Mob, foe, 1.0)
    }
}

fn roll_boss(config: &QuestConfig, level: u32, rng: &mut impl Rng) -> Option<Foe> {
    combat::pick_monster(&config.content.boss_monsters, level, rng)
        .map(|def| foe_from(def, level + config.encounter.boss_level_offset))
}

/// Per-participant consequences of the shared roll. Returns the lines for the channel.
#[allow(clippy::too_many_arguments)]
fn settle(
    p: &mut PlayerRecord,
    curve: &XpCurve,
    config: &QuestConfig,
    record: &EncounterRecord,
    won: bool,
    share: u64,
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> Vec<String> {
    let name = p.display_name().to_string();
    let mut lines = Vec::new();
    if won {
        let scroll = inventory::scroll_multiplier(p);
        let award = award_xp(p, curve, config, share, scroll);
        p.wins += 1;
        p.streak += 1;
        p.max_streak = p.max_streak.max(p.streak);
        let drop = record.kind != EncounterKind::Boss && rng.random_bool(config.items.medkit_drop_chance);
        if drop {
            p.add_item(crate::quest::items::ItemKind::Medkit, 1);
        }
        lines.push(format!(
            "• {name} defeated the {}! +{} XP{}",
            record.foe.name,
            award.level.xp_gained,
            if drop { " Found a medkit!" } else { "" }
        ));
        lines.extend(award.notes.into_iter().map(|n| format!("  {n}")));
    } else {
        p.losses += 1;
        p.streak = 0;
        let lost = apply_loss_penalty(p, curve, config);
        lines.push(format!("• {name} was defeated by the {}! (-{lost} XP)", record.foe.name));
        let reduction = inventory::injury_reduction(p);
        if let Some(injury) = injuries::roll_on_loss(p, config, reduction, rng, now) {
            lines.push(format!("  {}", injury.message()));
        }
    }
    inventory::process_combat_effects(p, won);
    lines
}

impl QuestEngine {
    async fn persist_slot(&self, slot: &SlotState) -> Result<(), StoreError> {
        let store = self.players.store();
        let active = match &slot.active {
            Some(record) => serde_json::to_value(record)?,
            None => Value::Null,
        };
        store.replace(STATE_MODULE, ACTIVE_ENCOUNTER_KEY, active).await?;
        let cooldowns: BTreeMap<&String, &DateTime<Utc>> = slot.channel_cooldowns.iter().collect();
        store
            .replace(STATE_MODULE, CHANNEL_COOLDOWNS_KEY, serde_json::to_value(cooldowns)?)
            .await
    }

    async fn schedule_close(&self, id: u64, after: Duration) {
        let engine = self.this.clone();
        let delay = after.to_std().unwrap_or_default();
        self.scheduler
            .run_after(ENCOUNTER_TAG, delay, async move {
                let Some(engine) = engine.upgrade() else { return };
                if let Err(e) = engine.close_by_timer(id).await {
                    warn!(target: "quest.encounter", error = %e, encounter = id, "timed encounter close failed");
                }
            })
            .await;
    }

    /// Idle → Open with `record`, mirrored and scheduled. The caller holds the guard.
    async fn open_slot(&self, slot: &mut SlotState, record: EncounterRecord) -> Result<Result<String, Rejection>, EngineError> {
        let (id, window) = (record.id, record.close_epoch - record.opened_at);
        let announcement = match slot.open(record) {
            Ok(opened) => {
                info!(
                    target: "quest.encounter",
                    encounter = opened.id,
                    kind = %opened.kind,
                    foe = %opened.foe.name,
                    channel = %opened.channel,
                    "encounter opened"
                );
                opened.announcement(&self.prefix)
            }
            Err(why) => return Ok(Err(why)),
        };
        self.persist_slot(slot).await?;
        self.schedule_close(id, window).await;
        Ok(Ok(announcement))
    }

    /// Starts a mob encounter in the actor's channel with the actor as first participant.
    #[instrument(level = "debug", skip(self), fields(user = %actor.id, channel = %actor.channel))]
    pub async fn start_encounter(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        self.close_if_expired().await?;
        let Ok(mut slot) = self.slot.try_lock() else {
            return Ok(Rejection::EncounterBusy.into());
        };
        let now = self.clock.now();
        if slot.active.is_some() {
            return Ok(Rejection::EncounterAlreadyOpen.into());
        }
        if let Err(why) = slot.check_channel(&actor.channel, now) {
            return Ok(why.into());
        }

        let cost = self.config.encounter.start_energy_cost;
        let paid = self
            .players
            .update(&actor.id, &actor.name, |p| {
                if energy::consume(p, cost) {
                    Ok(p.level)
                } else {
                    Err(Rejection::NotEnoughEnergy { needed: cost, have: p.energy })
                }
            })
            .await?;
        let level = match paid {
            Ok(level) => level,
            Err(why) => return Ok(why.into()),
        };

        let (kind, foe, xp_multiplier) = {
            let mut rng = rand::rng();
            roll_mob(&self.config, level, &mut rng)
        };
        let window = Duration::seconds(self.config.encounter.join_window_seconds);
        let record = EncounterRecord {
            id: rand::random(),
            kind,
            channel: actor.channel.clone(),
            foe,
            participants: vec![Participant { id: actor.id.clone(), name: actor.name.clone() }],
            opened_at: now,
            close_epoch: now + window,
            xp_multiplier,
        };
        Ok(match self.open_slot(&mut slot, record).await? {
            Ok(announcement) => ActionResult::ok(format!(
                "Encounter started! Others have {} to join.",
                format_wait(window)
            ))
            .with_announcement(announcement),
            Err(why) => why.into(),
        })
    }

    #[instrument(level = "debug", skip(self), fields(user = %actor.id, channel = %actor.channel))]
    pub async fn join_encounter(&self, actor: &Actor) -> Result<ActionResult, EngineError> {
        self.close_if_expired().await?;
        let Ok(mut slot) = self.slot.try_lock() else {
            return Ok(Rejection::EncounterBusy.into());
        };
        let now = self.clock.now();
        if let Err(why) = slot.can_join(&actor.id, &actor.channel, now, self.config.encounter.max_participants) {
            return Ok(why.into());
        }
        let cost = self.config.encounter.join_energy_cost;
        let paid = self
            .players
            .update(&actor.id, &actor.name, |p| {
                if energy::consume(p, cost) { Ok(()) } else { Err(Rejection::NotEnoughEnergy { needed: cost, have: p.energy }) }
            })
            .await?;
        if let Err(why) = paid {
            return Ok(why.into());
        }
        let size = slot.add(Participant { id: actor.id.clone(), name: actor.name.clone() });
        self.persist_slot(&slot).await?;
        debug!(target: "quest.encounter", user = %actor.id, size, "participant joined");
        Ok(ActionResult::ok(format!("{} joined the encounter! Party size: {size}", actor.name)))
    }

    /// Closes the open encounter if its window has passed. Safe to call from any command.
    pub async fn close_if_expired(&self) -> Result<Option<CloseOutcome>, EngineError> {
        let mut slot = self.slot.lock().await;
        let Some(record) = slot.take_expired(self.clock.now()) else {
            return Ok(None);
        };
        self.scheduler.cancel_tag(ENCOUNTER_TAG).await;
        debug!(target: "quest.encounter", encounter = record.id, "lazy close");
        Ok(Some(self.finish(&mut slot, record).await?))
    }

    /// Window timer callback. A no-op when the encounter is already gone.
    pub async fn close_by_timer(&self, id: u64) -> Result<Option<CloseOutcome>, EngineError> {
        let mut slot = self.slot.lock().await;
        let Some(record) = slot.take_if(id) else {
            return Ok(None);
        };
        debug!(target: "quest.encounter", encounter = id, "timed close");
        Ok(Some(self.finish(&mut slot, record).await?))
    }

    async fn finish(&self, slot: &mut SlotState, record: EncounterRecord) -> Result<CloseOutcome, EngineError> {
        self.persist_slot(slot).await?;
        if record.participants.is_empty() {
            info!(target: "quest.encounter", encounter = record.id, "encounter abandoned");
            self.notifier.announce(&record.channel, NOBODY_JOINED).await;
            return Ok(CloseOutcome::Abandoned);
        }
        let report = self.resolve_encounter(&record).await?;
        let until = self.clock.now() + Duration::seconds(self.config.encounter.channel_cooldown_seconds);
        slot.prune_cooldowns(self.clock.now());
        slot.set_cooldown(&record.channel, until);
        self.persist_slot(slot).await?;
        self.notifier.announce(&record.channel, &report.lines.join("\n")).await;
        Ok(CloseOutcome::Resolved(report))
    }

    /// One shared roll for the party, then per-participant bookkeeping.
    async fn resolve_encounter(&self, record: &EncounterRecord) -> Result<EncounterReport, EngineError> {
        let config = self.config.clone();
        let curve = self.players.curve();
        let now = self.clock.now();

        let mut members = Vec::with_capacity(record.participants.len());
        for part in &record.participants {
            members.push(self.players.load(&part.id, &part.name).await?);
        }
        let party_size = members.len();
        let n = party_size as f64;
        let avg_level = members.iter().map(|p| f64::from(p.level)).sum::<f64>() / n;
        let avg_prestige = members.iter().map(|p| f64::from(p.prestige)).sum::<f64>() / n;
        let charm = members.iter().map(inventory::win_bonus).fold(0.0, f64::max);

        let win_chance = match &record.foe.legacy {
            Some(legacy) => legacy.win_chance,
            None => combat::win_chance(
                &config.combat,
                &Matchup {
                    player_level: avg_level.floor(),
                    monster_level: f64::from(record.foe.level),
                    prestige: avg_prestige.floor(),
                    injury_multiplier: 1.0,
                    group_modifier: combat::group_modifier(&config.combat, party_size),
                    charm_bonus: charm,
                },
            ),
        };
        let (won, base_xp) = {
            let mut rng = rand::rng();
            let won = combat::resolve(win_chance, &mut rng);
            let base = match &record.foe.legacy {
                Some(legacy) => legacy.xp_reward,
                None => rng.random_range(record.foe.xp_min..=record.foe.xp_max),
            };
            (won, base)
        };
        let multiplier = if record.is_legacy() { 1.0 } else { record.xp_multiplier };
        let total = (base_xp as f64 * multiplier * combat::group_xp_scaling(&config.combat, party_size)).floor() as u64;
        let xp_each = total / party_size as u64;

        let mut lines = vec![format!(
            "🎯 {} ENCOUNTER - {}",
            record.label(),
            if won { "VICTORY!" } else { "DEFEAT!" }
        )];
        lines.push(match (record.is_legacy(), won) {
            (true, true) => format!(
                "🌟 The party has defeated the transcendent warrior {}! Their legend grows stronger!",
                record.foe.name
            ),
            (true, false) => format!(
                "💀 The party was defeated by {}! The Legacy Boss proves too powerful!",
                record.foe.name
            ),
            (false, _) => format!("⚔️ The party fought a {} (Level {})", record.foe.name, record.foe.level),
        });
        lines.push(format!("👥 Party size: {party_size} | Win chance: {:.0}%", win_chance * 100.0));

        for part in &record.participants {
            let settled = self
                .players
                .update(&part.id, &part.name, |p| {
                    let mut rng = rand::rng();
                    settle(p, curve, &config, record, won, xp_each, &mut rng, now)
                })
                .await?;
            lines.extend(settled);
        }

        if won && let Some(legacy) = &record.foe.legacy {
            let victor = record.participants.choose(&mut rand::rng()).cloned();
            if let Some(victor) = victor {
                self.record_legacy_defeat(&legacy.key, &victor.id, &victor.name).await?;
            }
        }
        info!(
            target: "quest.encounter",
            encounter = record.id,
            won,
            party = party_size,
            chance = win_chance,
            xp_each,
            "encounter resolved"
        );
        Ok(EncounterReport { won, win_chance, party_size, xp_each, lines })
    }

    /// After a winning solo quest in the boss band, maybe open a boss encounter for the
    /// same player at no energy cost. Returns the channel announcement when one opened.
    pub(crate) async fn maybe_trigger_boss(&self, actor: &Actor, level: u32) -> Result<Option<String>, EngineError> {
        let enc = &self.config.encounter;
        if !(enc.boss_min_level..=enc.boss_max_level).contains(&level) {
            return Ok(None);
        }
        let (spawn, try_legacy) = {
            let mut rng = rand::rng();
            (rng.random_bool(enc.boss_chance), rng.random_bool(enc.legacy_boss_chance))
        };
        if !spawn {
            return Ok(None);
        }
        let Ok(mut slot) = self.slot.try_lock() else {
            return Ok(None);
        };
        if slot.active.is_some() {
            debug!(target: "quest.encounter", "boss skipped, an encounter is already open");
            return Ok(None);
        }
        let legacy = if try_legacy { self.random_legacy_foe(level).await? } else { None };
        let foe = match legacy {
            Some(foe) => foe,
            None => {
                let mut rng = rand::rng();
                match roll_boss(&self.config, level, &mut rng) {
                    Some(foe) => foe,
                    None => return Ok(None),
                }
            }
        };
        let now = self.clock.now();
        let record = EncounterRecord {
            id: rand::random(),
            kind: EncounterKind::Boss,
            channel: actor.channel.clone(),
            foe,
            participants: vec![Participant { id: actor.id.clone(), name: actor.name.clone() }],
            opened_at: now,
            close_epoch: now + Duration::seconds(enc.boss_window_seconds),
            xp_multiplier: enc.boss_xp_multiplier,
        };
        Ok(self.open_slot(&mut slot, record).await?.ok())
    }

    /// Opens an encounter with nobody in it, sized for `level`. Operator tool.
    pub(crate) async fn spawn_encounter(&self, channel: &str, level: u32, boss: bool) -> Result<Result<String, Rejection>, EngineError> {
        self.close_if_expired().await?;
        let Ok(mut slot) = self.slot.try_lock() else {
            return Ok(Err(Rejection::EncounterBusy));
        };
        let now = self.clock.now();
        let built = {
            let mut rng = rand::rng();
            if boss {
                roll_boss(&self.config, level, &mut rng).map(|foe| {
                    (
                        EncounterKind::Boss,
                        foe,
                        self.config.encounter.boss_xp_multiplier,
                        self.config.encounter.boss_window_seconds,
                    )
                })
            } else {
                let (kind, foe, mult) = roll_mob(&self.config, level, &mut rng);
                Some((kind, foe, mult, self.config.encounter.join_window_seconds))
            }
        };
        let Some((kind, foe, xp_multiplier, window)) = built else {
            return Ok(Err(Rejection::NoContent));
        };
        let record = EncounterRecord {
            id: rand::random(),
            kind,
            channel: channel.to_string(),
            foe,
            participants: Vec::new(),
            opened_at: now,
            close_epoch: now + Duration::seconds(window),
            xp_multiplier,
        };
        self.open_slot(&mut slot, record).await
    }

    /// Drops the open encounter without resolving it. Returns whether one was open.
    pub(crate) async fn force_close(&self) -> Result<bool, EngineError> {
        let mut slot = self.slot.lock().await;
        let Some(record) = slot.active.take() else {
            return Ok(false);
        };
        self.scheduler.cancel_tag(ENCOUNTER_TAG).await;
        self.persist_slot(&slot).await?;
        info!(target: "quest.encounter", encounter = record.id, "encounter force-closed");
        self.notifier
            .announce(&record.channel, &format!("The {} was driven off. The encounter is over.", record.foe.name))
            .await;
        Ok(true)
    }

    /// Reloads the mirrored slot after a restart: cooldowns come back, an open encounter
    /// is rescheduled for what is left of its window or closed at once if it ran out.
    pub(crate) async fn restore_encounter(&self) -> Result<(), EngineError> {
        let store = self.players.store().clone();
        let mut slot = self.slot.lock().await;
        let now = self.clock.now();
        if let Some(raw) = store.get(STATE_MODULE, CHANNEL_COOLDOWNS_KEY).await? {
            match serde_json::from_value::<BTreeMap<String, DateTime<Utc>>>(raw) {
                Ok(map) => slot.channel_cooldowns.extend(map),
                Err(e) => warn!(target: "quest.encounter", error = %e, "unreadable channel cooldowns, dropping"),
            }
        }
        slot.prune_cooldowns(now);

        let record = match store.get(STATE_MODULE, ACTIVE_ENCOUNTER_KEY).await? {
            Some(raw) if !raw.is_null() => match serde_json::from_value::<EncounterRecord>(raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(target: "quest.encounter", error = %e, "unreadable stored encounter, discarding");
                    self.persist_slot(&slot).await?;
                    return Ok(());
                }
            },
            _ => return Ok(()),
        };
        if record.close_epoch <= now {
            info!(target: "quest.encounter", encounter = record.id, "stored encounter expired while offline, closing");
            self.finish(&mut slot, record).await?;
        } else {
            let (id, left) = (record.id, record.close_epoch - now);
            info!(target: "quest.encounter", encounter = id, remaining = %format_wait(left), "stored encounter restored");
            slot.active = Some(record);
            self.schedule_close(id, left).await;
        }
        Ok(())
    }

    /// Participants of the open encounter, if any.
    pub async fn open_party(&self) -> Vec<Participant> {
        let slot = self.slot.lock().await;
        slot.active.as_ref().map(|a| a.participants.clone()).unwrap_or_default()
    }

    pub async fn encounter_status(&self) -> Result<ActionResult, EngineError> {
        self.close_if_expired().await?;
        let slot = self.slot.lock().await;
        let now = self.clock.now();
        Ok(match &slot.active {
            None => ActionResult::ok(format!("No encounter is open. Start one with {}mob.", self.prefix)),
            Some(active) => {
                let names: Vec<&str> = active.participants.iter().map(|p| p.name.as_str()).collect();
                ActionResult::ok(format!(
                    "{} encounter: {} (Level {}) | Party: {} | Closes in {}",
                    active.label(),
                    active.foe.name,
                    active.foe.level,
                    if names.is_empty() { "nobody yet".to_string() } else { names.join(", ") },
                    format_wait(active.close_epoch - now)
                ))
            }
        })
    }
}

/// Builds the encounter form of a legacy boss for a fight against players around `player_level`.
pub(crate) fn legacy_foe(config: &QuestConfig, boss: &crate::database::models::LegacyBoss, player_level: u32) -> Foe {
    let legacy = &config.legacy;
    let n = f64::from(boss.transcendence_number);
    let xp_reward = (f64::from(player_level) * legacy.xp_per_player_level as f64 * (1.0 + n * legacy.xp_step)).floor() as u64;
    Foe {
        name: boss.display_name(),
        level: player_level.saturating_sub(legacy.level_offset).max(legacy.min_boss_level),
        xp_min: xp_reward,
        xp_max: xp_reward,
        legacy: Some(LegacyFoe {
            key: boss.key(),
            win_chance: combat::legacy_win_chance(config, boss),
            xp_reward,
            traits: boss.traits.clone(),
        }),
    }
}
