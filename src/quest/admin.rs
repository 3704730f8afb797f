//! Operator commands behind `quest_admin`. Every call is gated on the config's admin list.

use super::items::ItemKind;
use super::registry::award_xp;
use super::{ActionResult, Actor, EngineError, QuestEngine, Rejection, energy};
use crate::database::models::PlayerRecord;
use std::str::FromStr;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    HealAll,
    RestoreAll,
    GrantItem { user: String, item: String, count: u32 },
    GrantXp { user: String, amount: u64 },
    Reset { user: String },
    Close,
    Spawn { boss: bool },
    Path(Option<String>),
    Stats,
}

pub const ADMIN_USAGE: &str = "Usage: quest_admin heal_all | restore_all | grant_item <user> <item> [n] | \
grant_xp <user> <n> | reset <user> | close | spawn [boss] | path <id|off> | stats";

impl AdminCommand {
    pub fn parse(args: &[&str]) -> Option<Self> {
        let (&verb, rest) = args.split_first()?;
        Some(match (verb.to_lowercase().as_str(), rest) {
            ("heal_all" | "healall", []) => AdminCommand::HealAll,
            ("restore_all" | "restoreall", []) => AdminCommand::RestoreAll,
            ("grant_item" | "give", [user, item]) => {
                AdminCommand::GrantItem { user: user.to_string(), item: item.to_string(), count: 1 }
            }
            ("grant_item" | "give", [user, item, n]) => AdminCommand::GrantItem {
                user: user.to_string(),
                item: item.to_string(),
                count: n.parse().ok().filter(|n| *n > 0)?,
            },
            ("grant_xp" | "xp", [user, n]) => AdminCommand::GrantXp { user: user.to_string(), amount: n.parse().ok()? },
            ("reset", [user]) => AdminCommand::Reset { user: user.to_string() },
            ("close", []) => AdminCommand::Close,
            ("spawn", []) => AdminCommand::Spawn { boss: false },
            ("spawn", ["boss"]) => AdminCommand::Spawn { boss: true },
            ("path", ["off" | "none"]) => AdminCommand::Path(None),
            ("path", [id]) => AdminCommand::Path(Some(id.to_string())),
            ("stats", []) => AdminCommand::Stats,
            _ => return None,
        })
    }
}

impl FromStr for AdminCommand {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let args: Vec<&str> = s.split_whitespace().collect();
        AdminCommand::parse(&args).ok_or(())
    }
}

/// Aggregates across every stored player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestStats {
    pub players: usize,
    pub total_wins: u64,
    pub total_losses: u64,
    pub injured: usize,
    pub max_prestige: u32,
    pub transcended: usize,
    pub average_level: f64,
    pub legacy_bosses: usize,
}

pub fn aggregate(players: &[PlayerRecord], now: chrono::DateTime<chrono::Utc>) -> QuestStats {
    let mut stats = QuestStats { players: players.len(), ..QuestStats::default() };
    let mut levels = 0u64;
    for p in players {
        stats.total_wins += u64::from(p.wins);
        stats.total_losses += u64::from(p.losses);
        stats.max_prestige = stats.max_prestige.max(p.prestige);
        levels += u64::from(p.level);
        if super::injuries::is_injured(p, now) {
            stats.injured += 1;
        }
        if p.transcendence_count > 0 {
            stats.transcended += 1;
        }
    }
    if !players.is_empty() {
        stats.average_level = levels as f64 / players.len() as f64;
    }
    stats
}

impl QuestEngine {
    /// Runs one operator command for `actor`. Non-admins are refused without side effects.
    #[instrument(level = "debug", skip(self), fields(user = %actor.id))]
    pub async fn admin(&self, actor: &Actor, command: AdminCommand) -> Result<ActionResult, EngineError> {
        if !self.config.is_admin(&actor.id) {
            return Ok(Rejection::NotAuthorized.into());
        }
        info!(target: "quest.admin", user = %actor.id, ?command, "operator command");
        match command {
            AdminCommand::HealAll => {
                let healed = self.heal_everyone().await?;
                Ok(ActionResult::ok(format!("🩹 Healed {healed} injured adventurer(s).")))
            }
            AdminCommand::RestoreAll => {
                let mut restored = 0;
                for id in self.players.ids().await? {
                    let added = self
                        .players
                        .update(&id, "", |p| {
                            let max = p.max_energy;
                            energy::restore(p, max)
                        })
                        .await?;
                    if added > 0 {
                        restored += 1;
                    }
                }
                Ok(ActionResult::ok(format!("⚡ Restored energy for {restored} adventurer(s).")))
            }
            AdminCommand::GrantItem { user, item, count } => {
                let Ok(kind) = item.parse::<ItemKind>() else {
                    return Ok(Rejection::UnknownItem(item).into());
                };
                let Some(id) = self.players.find_id(&user).await? else {
                    return Ok(Rejection::UnknownPlayer(user).into());
                };
                let (name, total) = self
                    .players
                    .update(&id, "", |p| {
                        p.add_item(kind, count);
                        (p.display_name().to_string(), p.item_count(kind))
                    })
                    .await?;
                Ok(ActionResult::ok(format!("🎁 Gave {count}x {kind} to {name} (now {total}).")))
            }
            AdminCommand::GrantXp { user, amount } => {
                let Some(id) = self.players.find_id(&user).await? else {
                    return Ok(Rejection::UnknownPlayer(user).into());
                };
                let config = self.config.clone();
                let curve = self.players.curve();
                let (name, award) = self
                    .players
                    .update(&id, "", |p| {
                        let award = award_xp(p, curve, &config, amount, 1.0);
                        (p.display_name().to_string(), award)
                    })
                    .await?;
                let mut lines = vec![format!(
                    "⭐ Granted {} XP to {name} (Level {}).",
                    award.level.xp_gained, award.level.new_level
                )];
                lines.extend(award.notes);
                Ok(ActionResult::ok(lines.join("\n")))
            }
            AdminCommand::Reset { user } => {
                let Some(id) = self.players.find_id(&user).await? else {
                    return Ok(Rejection::UnknownPlayer(user).into());
                };
                let base = self.config.energy.base_max_energy;
                let now = self.clock.now();
                let name = self
                    .players
                    .update(&id, "", |p| {
                        *p = PlayerRecord::new(&p.id, &p.username, base, now);
                        p.display_name().to_string()
                    })
                    .await?;
                Ok(ActionResult::ok(format!("♻️ {name} has been reset to a fresh adventurer.")))
            }
            AdminCommand::Close => Ok(if self.force_close().await? {
                ActionResult::ok("The open encounter was closed without resolution.")
            } else {
                ActionResult::ok("No encounter is open.")
            }),
            AdminCommand::Spawn { boss } => {
                let level = self.player(actor).await?.level;
                Ok(match self.spawn_encounter(&actor.channel, level, boss).await? {
                    Ok(announcement) => ActionResult::ok("Encounter spawned.").with_announcement(announcement),
                    Err(why) => why.into(),
                })
            }
            AdminCommand::Path(path) => self.set_active_path(path.as_deref()).await,
            AdminCommand::Stats => {
                let stats = self.stats().await?;
                let open = self.open_party().await.len();
                Ok(ActionResult::ok(format!(
                    "📈 **Quest statistics**\n\
                     Players: {} | Injured: {} | Avg level: {:.1}\n\
                     Wins: {} | Losses: {}\n\
                     Highest prestige: {} | Transcended: {} | Legacy bosses: {}\n\
                     Active path: {} | Open encounter party: {open}",
                    stats.players,
                    stats.injured,
                    stats.average_level,
                    stats.total_wins,
                    stats.total_losses,
                    stats.max_prestige,
                    stats.transcended,
                    stats.legacy_bosses,
                    self.active_path().await.unwrap_or_else(|| "none".to_string()),
                )))
            }
        }
    }

    pub async fn stats(&self) -> Result<QuestStats, EngineError> {
        let players = self.players.all().await?;
        let mut stats = aggregate(&players, self.clock.now());
        stats.legacy_bosses = self.legacy_bosses().await?.len();
        Ok(stats)
    }
}
