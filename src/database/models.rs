//! Records persisted through the player store.
//!
//! Everything here is plain serde data. Older record shapes are upgraded in exactly one
//! place, [`normalize_player`], before deserialization; the rest of the engine only ever
//! sees the current schema.

use crate::quest::items::ItemKind;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerRecord {
    pub id: String,
    pub username: String,
    pub level: u32,
    pub xp: u64,
    pub prestige: u32,
    /// Prestige tier used for the XP bonus. Survives transcendence, unlike `prestige`.
    pub effective_prestige: u32,
    pub energy: u32,
    pub max_energy: u32,
    pub last_energy_regen: Option<DateTime<Utc>>,
    pub wins: u32,
    pub losses: u32,
    pub streak: u32,
    pub max_streak: u32,
    pub class: Option<String>,
    pub inventory: BTreeMap<ItemKind, u32>,
    pub active_effects: Vec<ActiveEffect>,
    pub active_injuries: Vec<Injury>,
    pub challenge: ChallengeStats,
    pub unlocked_abilities: Vec<String>,
    pub ability_cooldowns: BTreeMap<String, DateTime<Utc>>,
    /// Human-readable permanent bonuses earned through prestige, paths and transcendence.
    pub prestige_bonuses: Vec<String>,
    pub quest_cooldown: Option<DateTime<Utc>>,
    pub search_cooldown: Option<DateTime<Utc>>,
    pub transcendence_count: u32,
    pub created_at: Option<DateTime<Utc>>,
}

impl Default for PlayerRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            username: String::new(),
            level: 1,
            xp: 0,
            prestige: 0,
            effective_prestige: 0,
            energy: 10,
            max_energy: 10,
            last_energy_regen: None,
            wins: 0,
            losses: 0,
            streak: 0,
            max_streak: 0,
            class: None,
            inventory: BTreeMap::new(),
            active_effects: Vec::new(),
            active_injuries: Vec::new(),
            challenge: ChallengeStats::default(),
            unlocked_abilities: Vec::new(),
            ability_cooldowns: BTreeMap::new(),
            prestige_bonuses: Vec::new(),
            quest_cooldown: None,
            search_cooldown: None,
            transcendence_count: 0,
            created_at: None,
        }
    }
}

impl PlayerRecord {
    /// A fresh level-1 record with a full energy pool.
    pub fn new(id: &str, username: &str, max_energy: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            energy: max_energy,
            max_energy,
            last_energy_regen: Some(now),
            created_at: Some(now),
            ..Self::default()
        }
    }

    pub fn item_count(&self, item: ItemKind) -> u32 {
        self.inventory.get(&item).copied().unwrap_or(0)
    }

    pub fn add_item(&mut self, item: ItemKind, count: u32) {
        *self.inventory.entry(item).or_insert(0) += count;
    }

    /// Removes one of `item`; false (and no change) when none is held.
    pub fn take_item(&mut self, item: ItemKind) -> bool {
        match self.inventory.get_mut(&item) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.username.is_empty() { &self.id } else { &self.username }
    }
}

/// Effects granted by consumables. At most one of each kind is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActiveEffect {
    /// Percent win bonus, consumed by the next fight.
    LuckyCharm { win_bonus: u32 },
    /// Percent injury-chance reduction for `remaining_fights` resolved fights.
    ArmorShard { injury_reduction: u32, remaining_fights: u32 },
    /// XP multiplier, consumed by the next win.
    XpScroll { xp_multiplier: f64 },
}

impl ActiveEffect {
    pub fn kind(&self) -> ItemKind {
        match self {
            ActiveEffect::LuckyCharm { .. } => ItemKind::LuckyCharm,
            ActiveEffect::ArmorShard { .. } => ItemKind::ArmorShard,
            ActiveEffect::XpScroll { .. } => ItemKind::XpScroll,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ActiveEffect::LuckyCharm { win_bonus } => format!("Lucky Charm (+{win_bonus}% win, next fight)"),
            ActiveEffect::ArmorShard { injury_reduction, remaining_fights } => {
                format!("Armor Shard (-{injury_reduction}% injury, {remaining_fights} fights left)")
            }
            ActiveEffect::XpScroll { xp_multiplier } => format!("XP Scroll (x{xp_multiplier} XP, next win)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InjuryEffects {
    pub xp_multiplier: f64,
    pub energy_regen_modifier: i32,
}

impl Default for InjuryEffects {
    fn default() -> Self {
        Self { xp_multiplier: 1.0, energy_regen_modifier: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Injury {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub effects: InjuryEffects,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChallengeStats {
    /// Path id the player is currently walking, if any.
    pub path: Option<String>,
    pub medkits_used_this_prestige: u32,
    pub completed: bool,
    pub entered_at: Option<DateTime<Utc>>,
}

/// One defeat of a legacy boss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefeatEvent {
    pub defeated_by: String,
    pub defeated_by_id: String,
    pub player_level: u32,
    pub defeated_at: DateTime<Utc>,
}

/// Permanent boss snapshot of a transcended player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyBoss {
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub class: String,
    pub transcendence_number: u32,
    pub original_level: u32,
    pub original_prestige: u32,
    pub total_wins: u32,
    pub total_losses: u32,
    pub max_streak: u32,
    pub traits: Vec<String>,
    pub abilities: Vec<String>,
    pub defeat_count: u32,
    pub defeat_history: Vec<DefeatEvent>,
    pub created_at: DateTime<Utc>,
}

impl LegacyBoss {
    pub fn store_key(user_id: &str, transcendence_number: u32) -> String {
        format!("{user_id}#{transcendence_number}")
    }

    pub fn key(&self) -> String {
        Self::store_key(&self.user_id, self.transcendence_number)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.username, self.title)
    }
}

const U32_FIELDS: [&str; 10] = [
    "level",
    "prestige",
    "effective_prestige",
    "energy",
    "max_energy",
    "wins",
    "losses",
    "streak",
    "max_streak",
    "transcendence_count",
];
const TIMESTAMP_FIELDS: [&str; 4] = ["quest_cooldown", "search_cooldown", "last_energy_regen", "created_at"];

fn epoch_to_rfc3339(value: &Value) -> Option<Value> {
    let secs = value.as_f64()?;
    let dt = Utc.timestamp_opt(secs.trunc() as i64, 0).single()?;
    Some(Value::String(dt.to_rfc3339()))
}

/// A timestamp in any shape the store has held, or `Null` when it cannot be read.
/// Offset-less ISO strings are taken as UTC.
fn coerce_timestamp(value: &Value) -> Value {
    match value {
        Value::Number(_) => epoch_to_rfc3339(value).unwrap_or(Value::Null),
        Value::String(s) => {
            if s.parse::<DateTime<Utc>>().is_ok() {
                value.clone()
            } else if let Ok(naive) = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S%.f") {
                Value::String(naive.and_utc().to_rfc3339())
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}

/// A non-negative whole number clamped to `max`. Floats truncate, numeric strings parse,
/// negatives become zero.
fn coerce_count(value: &Value, max: u64) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n.min(max));
    }
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.clamp(0.0, max as f64).trunc() as u64)
}

/// Rewrites `key` as a clamped count, or removes it so the default applies.
fn fix_count(obj: &mut Map<String, Value>, key: &str, max: u64) {
    let Some(v) = obj.get(key) else { return };
    match coerce_count(v, max) {
        Some(n) => {
            obj.insert(key.to_string(), Value::from(n));
        }
        None => {
            obj.remove(key);
        }
    }
}

fn fix_string_list(obj: &mut Map<String, Value>, key: &str) {
    match obj.get_mut(key) {
        Some(Value::Array(list)) => list.retain(Value::is_string),
        Some(_) => {
            obj.remove(key);
        }
        None => {}
    }
}

fn fix_injury(injury: &mut Value) {
    let Some(inj) = injury.as_object_mut() else { return };
    if let Some(expiry) = inj.get("expires_at") {
        let fixed = coerce_timestamp(expiry);
        inj.insert("expires_at".to_string(), fixed);
    }
    if inj.get("description").is_some_and(|d| !d.is_string()) {
        inj.remove("description");
    }
    match inj.get_mut("effects") {
        Some(Value::Object(effects)) => {
            if effects.get("xp_multiplier").is_some_and(|m| !m.is_number()) {
                effects.remove("xp_multiplier");
            }
            if let Some(modifier) = effects.get("energy_regen_modifier") {
                match modifier.as_f64().filter(|m| m.is_finite()) {
                    Some(m) => {
                        let m = m.clamp(f64::from(i32::MIN), f64::from(i32::MAX)).trunc() as i32;
                        effects.insert("energy_regen_modifier".to_string(), Value::from(m));
                    }
                    None => {
                        effects.remove("energy_regen_modifier");
                    }
                }
            }
        }
        Some(_) => {
            inj.remove("effects");
        }
        None => {}
    }
}

fn fix_effect(effect: &mut Value) {
    let Some(fx) = effect.as_object_mut() else { return };
    // Armor used to be stored as a fraction (0.30) rather than a percentage.
    if fx.get("type").and_then(Value::as_str) == Some("armor_shard")
        && let Some(reduction) = fx.get("injury_reduction")
        && reduction.is_f64()
        && let Some(fraction) = reduction.as_f64()
        && fraction <= 1.0
    {
        let percent = (fraction * 100.0).round().max(0.0) as u64;
        fx.insert("injury_reduction".to_string(), Value::from(percent));
    }
    for key in ["win_bonus", "injury_reduction", "remaining_fights"] {
        fix_count(fx, key, u64::from(u32::MAX));
    }
}

fn fix_challenge(challenge: &mut Map<String, Value>) {
    challenge.retain(|k, _| matches!(k.as_str(), "path" | "medkits_used_this_prestige" | "completed" | "entered_at"));
    if challenge.get("path").is_some_and(|p| !p.is_string()) {
        challenge.remove("path");
    }
    fix_count(challenge, "medkits_used_this_prestige", u64::from(u32::MAX));
    if challenge.get("completed").is_some_and(|c| !c.is_boolean()) {
        challenge.remove("completed");
    }
    if let Some(at) = challenge.get("entered_at") {
        let fixed = coerce_timestamp(at);
        challenge.insert("entered_at".to_string(), fixed);
    }
}

/// Upgrades a stored player record to the current schema, in place.
///
/// * a single `active_injury` object and the old `injuries` list are lifted into `active_injuries`
/// * numeric epoch timestamps become RFC 3339 strings
/// * inventory keys the engine no longer knows are dropped
/// * a flat `challenge_path` / `challenge_stats` pair is folded into `challenge`
/// * a missing `effective_prestige` falls back to `prestige`
/// * fractional armor reductions become percentages
/// * a wrongly typed field is coerced where it can be and otherwise left to its default,
///   so one bad value never costs the rest of the record
/// * `null` where a list or map is expected is removed so the default applies
pub fn normalize_player(raw: &mut Value) {
    let Some(obj) = raw.as_object_mut() else {
        *raw = Value::Object(Map::new());
        return;
    };

    for key in ["id", "username"] {
        match obj.get(key) {
            Some(Value::String(_)) | None => {}
            Some(Value::Number(n)) => {
                let text = n.to_string();
                obj.insert(key.to_string(), Value::String(text));
            }
            Some(_) => {
                obj.remove(key);
            }
        }
    }
    if obj.get("class").is_some_and(|c| !c.is_string()) {
        obj.insert("class".to_string(), Value::Null);
    }

    for key in U32_FIELDS {
        fix_count(obj, key, u64::from(u32::MAX));
    }
    fix_count(obj, "xp", u64::MAX);
    if !obj.contains_key("effective_prestige")
        && let Some(prestige) = obj.get("prestige").cloned()
    {
        obj.insert("effective_prestige".to_string(), prestige);
    }

    let mut injuries: Vec<Value> = match obj.remove("active_injuries") {
        Some(Value::Array(list)) => list,
        _ => Vec::new(),
    };
    if let Some(Value::Array(old)) = obj.remove("injuries") {
        injuries.extend(old);
    }
    if let Some(single) = obj.remove("active_injury")
        && single.is_object()
    {
        injuries.push(single);
    }
    injuries.iter_mut().for_each(fix_injury);
    injuries.retain(|i| serde_json::from_value::<Injury>(i.clone()).is_ok());
    obj.insert("active_injuries".to_string(), Value::Array(injuries));

    for key in TIMESTAMP_FIELDS {
        if let Some(v) = obj.get(key) {
            let fixed = coerce_timestamp(v);
            obj.insert(key.to_string(), fixed);
        }
    }

    match obj.get_mut("inventory") {
        Some(Value::Object(inv)) => {
            inv.retain(|k, _| serde_json::from_value::<ItemKind>(Value::String(k.clone())).is_ok());
            let keys: Vec<String> = inv.keys().cloned().collect();
            for key in keys {
                fix_count(inv, &key, u64::from(u32::MAX));
            }
        }
        Some(_) => {
            obj.remove("inventory");
        }
        None => {}
    }

    if !obj.contains_key("challenge") {
        let mut challenge = match obj.remove("challenge_stats") {
            Some(Value::Object(stats)) => stats,
            _ => Map::new(),
        };
        if let Some(path) = obj.remove("challenge_path") {
            challenge.insert("path".to_string(), path);
        }
        obj.insert("challenge".to_string(), Value::Object(challenge));
    }
    match obj.get_mut("challenge") {
        Some(Value::Object(challenge)) => fix_challenge(challenge),
        _ => {
            obj.remove("challenge");
        }
    }

    match obj.get_mut("active_effects") {
        Some(Value::Array(effects)) => {
            effects.iter_mut().for_each(fix_effect);
            effects.retain(|e| serde_json::from_value::<ActiveEffect>(e.clone()).is_ok());
        }
        Some(_) => {
            obj.remove("active_effects");
        }
        None => {}
    }

    fix_string_list(obj, "unlocked_abilities");
    fix_string_list(obj, "prestige_bonuses");

    match obj.get_mut("ability_cooldowns") {
        Some(Value::Object(cooldowns)) => {
            for v in cooldowns.values_mut() {
                *v = coerce_timestamp(v);
            }
            cooldowns.retain(|_, v| !v.is_null());
        }
        Some(_) => {
            obj.remove("ability_cooldowns");
        }
        None => {}
    }

    let nulls: Vec<String> = obj
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| k.clone())
        .filter(|k| !matches!(k.as_str(), "class") && !TIMESTAMP_FIELDS.contains(&k.as_str()))
        .collect();
    for key in nulls {
        obj.remove(&key);
    }
}
