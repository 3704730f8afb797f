//! Consumable item kinds, their display properties and the weighted search table.

use crate::config::SearchChances;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub struct ItemProperties {
    pub display_name: &'static str,
    pub description: &'static str,
    pub emoji: &'static str,
}

/// Every consumable the engine knows. Stored inventory keys use the plural serde names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    #[serde(rename = "medkits")]
    Medkit,
    #[serde(rename = "energy_potions")]
    EnergyPotion,
    #[serde(rename = "lucky_charms")]
    LuckyCharm,
    #[serde(rename = "armor_shards")]
    ArmorShard,
    #[serde(rename = "xp_scrolls")]
    XpScroll,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        ItemKind::Medkit,
        ItemKind::EnergyPotion,
        ItemKind::LuckyCharm,
        ItemKind::ArmorShard,
        ItemKind::XpScroll,
    ];

    pub fn properties(&self) -> ItemProperties {
        match self {
            ItemKind::Medkit => ItemProperties {
                display_name: "Medkit",
                description: "Heals every injury on yourself or another adventurer.",
                emoji: "🩹",
            },
            ItemKind::EnergyPotion => ItemProperties {
                display_name: "Energy Potion",
                description: "Restores a few points of energy.",
                emoji: "🧪",
            },
            ItemKind::LuckyCharm => ItemProperties {
                display_name: "Lucky Charm",
                description: "Raises your win chance for the next fight.",
                emoji: "🍀",
            },
            ItemKind::ArmorShard => ItemProperties {
                display_name: "Armor Shard",
                description: "Reduces the chance of injury for the next few fights.",
                emoji: "🛡️",
            },
            ItemKind::XpScroll => ItemProperties {
                display_name: "XP Scroll",
                description: "Multiplies the XP of your next win.",
                emoji: "📜",
            },
        }
    }

    /// The key used in stored inventories.
    pub fn storage_key(&self) -> &'static str {
        match self {
            ItemKind::Medkit => "medkits",
            ItemKind::EnergyPotion => "energy_potions",
            ItemKind::LuckyCharm => "lucky_charms",
            ItemKind::ArmorShard => "armor_shards",
            ItemKind::XpScroll => "xp_scrolls",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.properties().display_name)
    }
}

impl FromStr for ItemKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-'], "_").as_str() {
            "medkit" | "medkits" | "med" => Ok(ItemKind::Medkit),
            "energy_potion" | "energy_potions" | "potion" | "potions" => Ok(ItemKind::EnergyPotion),
            "lucky_charm" | "lucky_charms" | "charm" | "charms" => Ok(ItemKind::LuckyCharm),
            "armor_shard" | "armor_shards" | "armor" | "shard" => Ok(ItemKind::ArmorShard),
            "xp_scroll" | "xp_scrolls" | "scroll" | "scrolls" => Ok(ItemKind::XpScroll),
            _ => Err(()),
        }
    }
}

/// Result of one weighted search roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Injury,
    Found(ItemKind),
    Nothing,
}

/// Maps a uniform draw in `[0, 1)` onto the cumulative search table.
/// Order: injury, medkit, energy potion, lucky charm, armor shard, xp scroll, then nothing.
pub fn roll_search(chances: &SearchChances, roll: f64) -> SearchOutcome {
    let table = [
        (chances.injury, SearchOutcome::Injury),
        (chances.medkit, SearchOutcome::Found(ItemKind::Medkit)),
        (chances.energy_potion, SearchOutcome::Found(ItemKind::EnergyPotion)),
        (chances.lucky_charm, SearchOutcome::Found(ItemKind::LuckyCharm)),
        (chances.armor_shard, SearchOutcome::Found(ItemKind::ArmorShard)),
        (chances.xp_scroll, SearchOutcome::Found(ItemKind::XpScroll)),
    ];
    let mut cumulative = 0.0;
    for (chance, outcome) in table {
        cumulative += chance;
        if roll < cumulative {
            return outcome;
        }
    }
    SearchOutcome::Nothing
}
