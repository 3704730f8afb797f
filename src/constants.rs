// Central constants for store layout, scheduler tags and display limits.

/// Store module holding one record per player.
pub const PLAYERS_MODULE: &str = "quest_players";
/// Store module holding append-only legacy boss records keyed `"{user}#{n}"`.
pub const LEGACY_MODULE: &str = "quest_legacy";
/// Store module for process-wide quest state (encounter slot, channel cooldowns, active path).
pub const STATE_MODULE: &str = "quest_state";

pub const ACTIVE_ENCOUNTER_KEY: &str = "active_encounter";
pub const CHANNEL_COOLDOWNS_KEY: &str = "channel_cooldowns";
pub const ACTIVE_PATH_KEY: &str = "active_path";

pub const ENERGY_TAG: &str = "quest-energy";
pub const ENCOUNTER_TAG: &str = "quest-encounter";

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_CONFIG_PATH: &str = "quest_config.json";
pub const LEADERBOARD_LIMIT: usize = 10;
pub const ENERGY_BAR_WIDTH: usize = 10;

/// Used when no monster content is configured at all.
pub const FALLBACK_MONSTER_NAME: &str = "Glitched Packet";
pub const FALLBACK_MONSTER_MIN_LEVEL: u32 = 1;
pub const FALLBACK_MONSTER_MAX_LEVEL: u32 = 3;
pub const FALLBACK_MONSTER_XP: (u64, u64) = (15, 30);
