//! Quest configuration: balance knobs, content tables and challenge paths.
//!
//! Every field has a default so that a partial JSON file only overrides what it names.
//! Loading never fails: an unreadable or malformed file is logged and replaced by
//! [`QuestConfig::default`], which keeps the engine playable in a degraded mode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestConfig {
    pub level_cap: u32,
    pub max_prestige: u32,
    /// Arithmetic expression over `level` giving the total XP needed to reach that level.
    pub xp_curve_formula: String,
    /// XP bonus per effective prestige tier (0.10 = +10% per tier).
    pub prestige_xp_bonus: f64,
    /// Fraction of the XP above the current level floor lost on defeat.
    pub xp_loss_percentage: f64,
    pub quest_cooldown_seconds: i64,
    pub quest_energy_cost: u32,
    pub energy: EnergyConfig,
    pub combat: CombatConfig,
    pub injuries: InjuryConfig,
    pub items: ItemConfig,
    pub encounter: EncounterConfig,
    pub legacy: LegacyConfig,
    pub content: ContentConfig,
    pub challenges: ChallengeConfig,
    /// User ids allowed to run operator commands.
    pub admins: Vec<String>,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            level_cap: 20,
            max_prestige: 10,
            xp_curve_formula: "level * 100".to_string(),
            prestige_xp_bonus: 0.10,
            xp_loss_percentage: 0.25,
            quest_cooldown_seconds: 300,
            quest_energy_cost: 1,
            energy: EnergyConfig::default(),
            combat: CombatConfig::default(),
            injuries: InjuryConfig::default(),
            items: ItemConfig::default(),
            encounter: EncounterConfig::default(),
            legacy: LegacyConfig::default(),
            content: ContentConfig::default(),
            challenges: ChallengeConfig::default(),
            admins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub enabled: bool,
    /// Max energy at level 1, and after any prestige or transcendence.
    pub base_max_energy: u32,
    pub regen_minutes: u64,
    pub regen_amount: i32,
    /// Max energy raised when a player reaches `level`.
    pub max_energy_thresholds: Vec<EnergyThreshold>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnergyThreshold {
    pub level: u32,
    pub max_energy: u32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_max_energy: 10,
            regen_minutes: 10,
            regen_amount: 1,
            max_energy_thresholds: vec![
                EnergyThreshold { level: 5, max_energy: 11 },
                EnergyThreshold { level: 10, max_energy: 12 },
                EnergyThreshold { level: 15, max_energy: 13 },
                EnergyThreshold { level: 20, max_energy: 15 },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub base_win_chance: f64,
    pub level_step: f64,
    pub prestige_step: f64,
    pub min_win_chance: f64,
    pub max_win_chance: f64,
    /// Win-chance bonus by party size; the first entry whose `players` the party reaches applies.
    pub group_modifiers: Vec<GroupModifier>,
    /// XP pool multiplier by party size, matched the same way as `group_modifiers`.
    pub group_xp_scaling: Vec<GroupXpScaling>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GroupModifier {
    pub players: usize,
    pub modifier: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GroupXpScaling {
    pub players: usize,
    pub multiplier: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            base_win_chance: 0.50,
            level_step: 0.10,
            prestige_step: 0.05,
            min_win_chance: 0.05,
            max_win_chance: 0.95,
            group_modifiers: vec![
                GroupModifier { players: 5, modifier: 0.15 },
                GroupModifier { players: 3, modifier: 0.10 },
                GroupModifier { players: 2, modifier: 0.05 },
            ],
            group_xp_scaling: vec![
                GroupXpScaling { players: 5, multiplier: 1.5 },
                GroupXpScaling { players: 3, multiplier: 1.25 },
                GroupXpScaling { players: 2, multiplier: 1.1 },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjuryConfig {
    pub enabled: bool,
    pub chance_on_loss: f64,
    pub kinds: Vec<InjuryKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InjuryKind {
    pub name: String,
    pub description: String,
    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,
    #[serde(default = "one")]
    pub xp_multiplier: f64,
    #[serde(default)]
    pub energy_regen_modifier: i32,
}

fn default_duration_hours() -> f64 {
    1.0
}

fn one() -> f64 {
    1.0
}

impl InjuryKind {
    fn new(name: &str, description: &str, hours: f64, xp: f64, regen: i32) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            duration_hours: hours,
            xp_multiplier: xp,
            energy_regen_modifier: regen,
        }
    }
}

impl Default for InjuryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chance_on_loss: 0.75,
            kinds: vec![
                InjuryKind::new("Sprained Ankle", "Every step is a negotiation.", 2.0, 0.9, 0),
                InjuryKind::new("Bruised Ribs", "Breathing is optional, apparently.", 3.0, 0.8, -1),
                InjuryKind::new("Concussion", "The stars are circling your head.", 4.0, 0.75, 0),
                InjuryKind::new("Duck Hugged", "A duck hugged you. You are not the same.", 1.0, 1.0, -1),
                InjuryKind::new("Corrupted Save", "Your memories are slightly out of order.", 2.0, 0.85, -1),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemConfig {
    pub search_energy_cost: u32,
    pub search_cooldown_seconds: i64,
    pub search_chances: SearchChances,
    pub medkit_base_xp: u64,
    pub self_heal_xp_multiplier: f64,
    pub altruistic_heal_xp_multiplier: f64,
    pub energy_potion_min: u32,
    pub energy_potion_max: u32,
    /// Percent added to win chance while a lucky charm is active.
    pub lucky_charm_win_bonus: u32,
    /// Percent removed from the injury chance while an armor shard has charges.
    pub armor_shard_reduction: u32,
    pub armor_shard_charges: u32,
    pub xp_scroll_multiplier: f64,
    /// Chance per winner of a medkit after a regular (non-boss) encounter.
    pub medkit_drop_chance: f64,
}

/// Probabilities for one search roll. Their sum must stay at or below 1.0; the rest is "nothing".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchChances {
    pub injury: f64,
    pub medkit: f64,
    pub energy_potion: f64,
    pub lucky_charm: f64,
    pub armor_shard: f64,
    pub xp_scroll: f64,
}

impl Default for SearchChances {
    fn default() -> Self {
        Self {
            injury: 0.05,
            medkit: 0.25,
            energy_potion: 0.15,
            lucky_charm: 0.15,
            armor_shard: 0.10,
            xp_scroll: 0.10,
        }
    }
}

impl SearchChances {
    pub fn total(&self) -> f64 {
        self.injury
            + self.medkit
            + self.energy_potion
            + self.lucky_charm
            + self.armor_shard
            + self.xp_scroll
    }
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            search_energy_cost: 1,
            search_cooldown_seconds: 300,
            search_chances: SearchChances::default(),
            medkit_base_xp: 50,
            self_heal_xp_multiplier: 0.75,
            altruistic_heal_xp_multiplier: 3.0,
            energy_potion_min: 2,
            energy_potion_max: 4,
            lucky_charm_win_bonus: 15,
            armor_shard_reduction: 30,
            armor_shard_charges: 3,
            xp_scroll_multiplier: 1.5,
            medkit_drop_chance: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterConfig {
    pub start_energy_cost: u32,
    pub join_energy_cost: u32,
    pub join_window_seconds: i64,
    pub mob_level_offset: u32,
    pub max_participants: usize,
    pub rare_chance: f64,
    pub rare_xp_multiplier: f64,
    pub boss_min_level: u32,
    pub boss_max_level: u32,
    pub boss_chance: f64,
    pub boss_level_offset: u32,
    pub boss_window_seconds: i64,
    pub boss_xp_multiplier: f64,
    pub legacy_boss_chance: f64,
    pub channel_cooldown_seconds: i64,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self {
            start_energy_cost: 2,
            join_energy_cost: 1,
            join_window_seconds: 60,
            mob_level_offset: 2,
            max_participants: 10,
            rare_chance: 0.10,
            rare_xp_multiplier: 2.0,
            boss_min_level: 17,
            boss_max_level: 20,
            boss_chance: 0.10,
            boss_level_offset: 5,
            boss_window_seconds: 300,
            boss_xp_multiplier: 2.5,
            legacy_boss_chance: 0.25,
            channel_cooldown_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Indexed by prior transcendence count; the last entry repeats.
    pub titles: Vec<String>,
    pub history_cap: usize,
    pub max_traits: usize,
    pub default_class: String,
    pub class_traits: BTreeMap<String, Vec<String>>,
    pub class_abilities: BTreeMap<String, Vec<String>>,
    pub fallback_abilities: Vec<String>,
    pub achievement_traits: Vec<AchievementTrait>,
    pub base_win_chance: f64,
    pub win_chance_step: f64,
    pub max_win_chance: f64,
    pub xp_per_player_level: u64,
    pub xp_step: f64,
    pub level_offset: u32,
    pub min_boss_level: u32,
    pub transcend_base_bonus: f64,
    pub transcend_bonus_step: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AchievementStat {
    Wins,
    MaxStreak,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AchievementTrait {
    pub stat: AchievementStat,
    pub threshold: u32,
    pub name: String,
}

fn string_map(entries: &[(&str, [&str; 2])]) -> BTreeMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

impl Default for LegacyConfig {
    fn default() -> Self {
        let class_traits = string_map(&[
            ("Fighter", ["Brutal Strikes", "Armor Mastery"]),
            ("Warrior", ["Brutal Strikes", "Armor Mastery"]),
            ("Mage", ["Arcane Power", "Elemental Control"]),
            ("Rogue", ["Shadow Strike", "Critical Mastery"]),
            ("Cleric", ["Divine Protection", "Healing Aura"]),
            ("Ranger", ["Precision Shots", "Beast Mastery"]),
            ("Barbarian", ["Rage Powers", "Unstoppable Force"]),
            ("Monk", ["Inner Focus", "Martial Arts Mastery"]),
            ("Druid", ["Nature's Wrath", "Shape Shifting"]),
            ("Necromancer", ["Dark Magic", "Undead Command"]),
            ("Paladin", ["Holy Strike", "Divine Shield"]),
            ("Bard", ["Inspiring Verse", "Dissonant Whispers"]),
        ]);
        let class_abilities = string_map(&[
            ("Fighter", ["Power Strike", "Whirlwind Attack"]),
            ("Warrior", ["Power Strike", "Whirlwind Attack"]),
            ("Mage", ["Fireball", "Lightning Bolt"]),
            ("Rogue", ["Backstab", "Smoke Bomb"]),
            ("Cleric", ["Heal", "Divine Smite"]),
            ("Ranger", ["Arrow Rain", "Beast Call"]),
            ("Barbarian", ["Berserker Rage", "Ground Slam"]),
            ("Monk", ["Flurry of Blows", "Meditative Focus"]),
            ("Druid", ["Entangle", "Wild Shape"]),
            ("Necromancer", ["Life Drain", "Summon Skeleton"]),
            ("Paladin", ["Holy Strike", "Blessing of Protection"]),
            ("Bard", ["Cutting Words", "Song of Rest"]),
        ]);
        Self {
            titles: [
                "the Legend",
                "the Mythic",
                "the Eternal",
                "the Immortal",
                "the Godlike",
                "the Transcendent",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            history_cap: 10,
            max_traits: 3,
            default_class: "Fighter".to_string(),
            class_traits,
            class_abilities,
            fallback_abilities: vec!["Basic Attack".to_string(), "Special Move".to_string()],
            achievement_traits: vec![
                AchievementTrait { stat: AchievementStat::Wins, threshold: 100, name: "Seasoned Warrior".into() },
                AchievementTrait { stat: AchievementStat::Wins, threshold: 500, name: "Legendary Champion".into() },
                AchievementTrait { stat: AchievementStat::MaxStreak, threshold: 10, name: "On a Roll".into() },
                AchievementTrait { stat: AchievementStat::MaxStreak, threshold: 25, name: "Unstoppable Force".into() },
            ],
            base_win_chance: 0.4,
            win_chance_step: 0.05,
            max_win_chance: 0.7,
            xp_per_player_level: 150,
            xp_step: 0.2,
            level_offset: 2,
            min_boss_level: 15,
            transcend_base_bonus: 0.15,
            transcend_bonus_step: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonsterDef {
    pub name: String,
    pub min_level: u32,
    pub max_level: u32,
    pub xp_win_min: u64,
    pub xp_win_max: u64,
}

impl MonsterDef {
    fn new(name: &str, levels: (u32, u32), xp: (u64, u64)) -> Self {
        Self {
            name: name.to_string(),
            min_level: levels.0,
            max_level: levels.1,
            xp_win_min: xp.0,
            xp_win_max: xp.1,
        }
    }

    pub fn fits(&self, level: u32) -> bool {
        self.min_level <= level && level <= self.max_level
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub monsters: Vec<MonsterDef>,
    pub boss_monsters: Vec<MonsterDef>,
    pub classes: Vec<String>,
    /// Narration fragments; `{user}` and `{monster}` are substituted.
    pub openers: Vec<String>,
    pub actions: Vec<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            monsters: vec![
                MonsterDef::new("Rogue Script", (1, 4), (20, 40)),
                MonsterDef::new("Feral Crawler", (3, 7), (30, 55)),
                MonsterDef::new("Spam Golem", (6, 10), (45, 75)),
                MonsterDef::new("Firewall Wraith", (9, 13), (60, 95)),
                MonsterDef::new("Cache Hydra", (12, 16), (80, 120)),
                MonsterDef::new("Kernel Panic", (15, 20), (100, 150)),
            ],
            boss_monsters: vec![
                MonsterDef::new("The Null Pointer", (17, 20), (300, 500)),
                MonsterDef::new("Daemon of the Deep Stack", (17, 20), (350, 550)),
            ],
            classes: [
                "Warrior",
                "Mage",
                "Rogue",
                "Cleric",
                "Ranger",
                "Paladin",
                "Necromancer",
                "Bard",
                "Monk",
                "Druid",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            openers: vec![
                "{user} ventures into the corrupted networks.".to_string(),
                "{user} follows a trail of broken packets.".to_string(),
                "{user} descends into the forgotten servers.".to_string(),
            ],
            actions: vec![
                "A {monster} blocks the way!".to_string(),
                "Out of the static lunges a {monster}!".to_string(),
                "{user} startles a {monster}.".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathRequirements {
    pub min_prestige: u32,
    pub max_prestige: Option<u32>,
    pub no_medkits: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathRewards {
    pub ability_unlock: Option<String>,
    pub prestige_bonus: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengePath {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: PathRequirements,
    #[serde(default)]
    pub rewards: PathRewards,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbilityEffect {
    HealAllInjuries,
    RestoreEnergy,
    BuffParty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityEffectData {
    pub energy_amount: Option<u32>,
    pub win_bonus: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityDef {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub description: String,
    pub effect: AbilityEffect,
    #[serde(default)]
    pub effect_data: AbilityEffectData,
    #[serde(default = "default_ability_cooldown")]
    pub cooldown_hours: f64,
    #[serde(default = "default_announcement")]
    pub announcement: String,
}

fn default_ability_cooldown() -> f64 {
    24.0
}

fn default_announcement() -> String {
    "{user} uses {ability}!".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Initial active path; the operator toggle persisted in the store takes precedence.
    pub active_path: Option<String>,
    pub paths: BTreeMap<String, ChallengePath>,
    pub abilities: BTreeMap<String, AbilityDef>,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        let mut paths = BTreeMap::new();
        paths.insert(
            "iron_path".to_string(),
            ChallengePath {
                name: "Path of Iron".to_string(),
                description: "Climb back to the level cap without using a single medkit.".to_string(),
                requirements: PathRequirements { min_prestige: 1, max_prestige: None, no_medkits: true },
                rewards: PathRewards {
                    ability_unlock: Some("field_medic".to_string()),
                    prestige_bonus: Some("Iron Will: completed the Path of Iron".to_string()),
                },
            },
        );
        paths.insert(
            "warlord_path".to_string(),
            ChallengePath {
                name: "Warlord's Ascent".to_string(),
                description: "An early-prestige trial for those who lead from the front.".to_string(),
                requirements: PathRequirements { min_prestige: 0, max_prestige: Some(5), no_medkits: false },
                rewards: PathRewards { ability_unlock: Some("war_cry".to_string()), prestige_bonus: None },
            },
        );

        let mut abilities = BTreeMap::new();
        abilities.insert(
            "field_medic".to_string(),
            AbilityDef {
                name: "Field Medic".to_string(),
                command: "medic".to_string(),
                description: "Heal every injured adventurer in the realm.".to_string(),
                effect: AbilityEffect::HealAllInjuries,
                effect_data: AbilityEffectData::default(),
                cooldown_hours: 24.0,
                announcement: "{user} uses {ability}! Every wound in the realm closes.".to_string(),
            },
        );
        abilities.insert(
            "second_wind".to_string(),
            AbilityDef {
                name: "Second Wind".to_string(),
                command: "secondwind".to_string(),
                description: "Restore some of your own energy.".to_string(),
                effect: AbilityEffect::RestoreEnergy,
                effect_data: AbilityEffectData { energy_amount: Some(5), win_bonus: None },
                cooldown_hours: 24.0,
                announcement: default_announcement(),
            },
        );
        abilities.insert(
            "war_cry".to_string(),
            AbilityDef {
                name: "War Cry".to_string(),
                command: "warcry".to_string(),
                description: "Bless your party with luck for their next fight.".to_string(),
                effect: AbilityEffect::BuffParty,
                effect_data: AbilityEffectData::default(),
                cooldown_hours: 24.0,
                announcement: "{user} uses {ability}! The party feels lucky.".to_string(),
            },
        );

        Self { active_path: None, paths, abilities }
    }
}

impl QuestConfig {
    /// Reads the JSON config at `path`, falling back to defaults on any error.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<QuestConfig>(&raw) {
                Ok(config) => {
                    info!(target: "quest.config", path = %path.display(), "loaded quest config");
                    config
                }
                Err(e) => {
                    warn!(target: "quest.config", path = %path.display(), error = %e, "malformed quest config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(target: "quest.config", path = %path.display(), error = %e, "quest config unreadable, using defaults");
                Self::default()
            }
        };
        config.validated()
    }

    /// Clamps probabilities and orders the group tables so lookups can take the first match.
    pub fn validated(mut self) -> Self {
        fn clamp_prob(name: &str, value: &mut f64) {
            if !(0.0..=1.0).contains(&*value) {
                let fixed = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
                warn!(target: "quest.config", field = name, value = *value, fixed, "probability out of range");
                *value = fixed;
            }
        }

        if self.level_cap == 0 {
            warn!(target: "quest.config", "level_cap of 0 is not playable, using 1");
            self.level_cap = 1;
        }
        clamp_prob("xp_loss_percentage", &mut self.xp_loss_percentage);
        clamp_prob("combat.min_win_chance", &mut self.combat.min_win_chance);
        clamp_prob("combat.max_win_chance", &mut self.combat.max_win_chance);
        if self.combat.min_win_chance > self.combat.max_win_chance {
            warn!(target: "quest.config", "min_win_chance above max_win_chance, swapping");
            std::mem::swap(&mut self.combat.min_win_chance, &mut self.combat.max_win_chance);
        }
        clamp_prob("injuries.chance_on_loss", &mut self.injuries.chance_on_loss);
        clamp_prob("items.medkit_drop_chance", &mut self.items.medkit_drop_chance);
        clamp_prob("encounter.rare_chance", &mut self.encounter.rare_chance);
        clamp_prob("encounter.boss_chance", &mut self.encounter.boss_chance);
        clamp_prob("encounter.legacy_boss_chance", &mut self.encounter.legacy_boss_chance);

        let chances = &mut self.items.search_chances;
        for (name, value) in [
            ("search.injury", &mut chances.injury),
            ("search.medkit", &mut chances.medkit),
            ("search.energy_potion", &mut chances.energy_potion),
            ("search.lucky_charm", &mut chances.lucky_charm),
            ("search.armor_shard", &mut chances.armor_shard),
            ("search.xp_scroll", &mut chances.xp_scroll),
        ] {
            clamp_prob(name, value);
        }
        if chances.total() > 1.0 {
            warn!(target: "quest.config", total = chances.total(), "search chances sum above 1.0; later outcomes are unreachable");
        }

        if self.items.energy_potion_min > self.items.energy_potion_max {
            std::mem::swap(&mut self.items.energy_potion_min, &mut self.items.energy_potion_max);
        }
        self.combat.group_modifiers.sort_by(|a, b| b.players.cmp(&a.players));
        self.combat.group_xp_scaling.sort_by(|a, b| b.players.cmp(&a.players));
        self.energy.max_energy_thresholds.sort_by_key(|t| t.level);
        if self.legacy.titles.is_empty() {
            self.legacy.titles = LegacyConfig::default().titles;
        }
        for monster in self.content.monsters.iter_mut().chain(self.content.boss_monsters.iter_mut()) {
            if monster.min_level > monster.max_level {
                std::mem::swap(&mut monster.min_level, &mut monster.max_level);
            }
            if monster.xp_win_min > monster.xp_win_max {
                std::mem::swap(&mut monster.xp_win_min, &mut monster.xp_win_max);
            }
        }
        self
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.iter().any(|a| a == user_id)
    }

    /// Max energy for a player at `level`: the highest threshold reached, else the base.
    pub fn max_energy_for_level(&self, level: u32) -> u32 {
        self.energy
            .max_energy_thresholds
            .iter()
            .filter(|t| t.level <= level)
            .map(|t| t.max_energy)
            .max()
            .unwrap_or(self.energy.base_max_energy)
            .max(self.energy.base_max_energy)
    }

    /// Looks an ability up by its chat command, case-insensitively.
    pub fn ability_by_command(&self, command: &str) -> Option<(&String, &AbilityDef)> {
        self.challenges
            .abilities
            .iter()
            .find(|(_, a)| a.command.eq_ignore_ascii_case(command))
    }

    pub fn class_named(&self, name: &str) -> Option<&String> {
        self.content.classes.iter().find(|c| c.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: QuestConfig = serde_json::from_str(r#"{"level_cap": 30, "combat": {"base_win_chance": 0.6}}"#)
            .unwrap();
        assert_eq!(config.level_cap, 30);
        assert_eq!(config.max_prestige, 10);
        assert!((config.combat.base_win_chance - 0.6).abs() < f64::EPSILON);
        assert!((config.combat.level_step - 0.10).abs() < f64::EPSILON);
    }

    #[test]
    fn validation_sorts_group_tables_descending() {
        let mut config = QuestConfig::default();
        config.combat.group_modifiers = vec![
            GroupModifier { players: 2, modifier: 0.05 },
            GroupModifier { players: 4, modifier: 0.2 },
        ];
        let config = config.validated();
        assert_eq!(config.combat.group_modifiers[0].players, 4);
    }

    #[test]
    fn max_energy_follows_thresholds() {
        let config = QuestConfig::default();
        assert_eq!(config.max_energy_for_level(1), 10);
        assert_eq!(config.max_energy_for_level(5), 11);
        assert_eq!(config.max_energy_for_level(14), 12);
        assert_eq!(config.max_energy_for_level(20), 15);
    }

    #[test]
    fn ability_effect_parses_from_snake_case() {
        let def: AbilityDef = serde_json::from_str(
            r#"{"name":"Surge","command":"surge","effect":"restore_energy","effect_data":{"energy_amount":3}}"#,
        )
        .unwrap();
        assert_eq!(def.effect, AbilityEffect::RestoreEnergy);
        assert_eq!(def.effect_data.energy_amount, Some(3));
        assert_eq!(def.announcement, "{user} uses {ability}!");
    }
}
