use crate::AppState;
use crate::quest::admin::{ADMIN_USAGE, AdminCommand};
use crate::quest::registry::LeaderboardKind;
use crate::quest::{ActionResult, Actor, EngineError, Notifier, QuestEngine};
use crate::constants::LEADERBOARD_LIMIT;
use serenity::async_trait;
use serenity::client::Context;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use serenity::model::{channel::Message, gateway::Ready, id::GuildId};
use serenity::prelude::EventHandler;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

enum Command {
    Help,
    Quest,
    Mob,
    Join,
    Encounter,
    Profile,
    Energy,
    Inventory,
    Search,
    Use,
    Leaderboard,
    Prestige,
    Transcend,
    Class,
    Challenges,
    Challenge,
    Abilities,
    Legacy,
    Admin,
    Unknown,
}

impl FromStr for Command {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "help" | "h" => Ok(Command::Help),
            "quest" | "q" => Ok(Command::Quest),
            "mob" => Ok(Command::Mob),
            "join" | "j" => Ok(Command::Join),
            "encounter" | "enc" => Ok(Command::Encounter),
            "profile" | "p" | "stats" => Ok(Command::Profile),
            "energy" | "e" => Ok(Command::Energy),
            "inventory" | "inv" | "i" => Ok(Command::Inventory),
            "search" | "s" => Ok(Command::Search),
            "use" | "u" => Ok(Command::Use),
            "leaderboard" | "lb" => Ok(Command::Leaderboard),
            "prestige" => Ok(Command::Prestige),
            "transcend" => Ok(Command::Transcend),
            "class" => Ok(Command::Class),
            "challenges" => Ok(Command::Challenges),
            "challenge" => Ok(Command::Challenge),
            "abilities" => Ok(Command::Abilities),
            "legacy" | "hof" => Ok(Command::Legacy),
            "quest_admin" | "qa" => Ok(Command::Admin),
            _ => Ok(Command::Unknown),
        }
    }
}

fn help_text(prefix: &str) -> String {
    [
        "**Quest commands**",
        "quest - go on a solo quest",
        "mob / join / encounter - start, join or inspect a group encounter",
        "profile [name] / energy / inventory - your status",
        "search - look for items | use <item> [target] - use an item",
        "leaderboard [prestige|level|wins]",
        "prestige / transcend - start over stronger",
        "class <name> / challenges / challenge / abilities / legacy",
    ]
    .iter()
    .map(|line| if line.starts_with("**") { line.to_string() } else { format!("{prefix}{line}") })
    .collect::<Vec<_>>()
    .join("\n")
}

/// Delivers engine announcements to a channel through the REST client.
pub struct SerenityNotifier {
    http: Arc<Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn announce(&self, channel: &str, text: &str) {
        let Ok(id) = channel.parse::<u64>() else {
            warn!(target: "quest.notify", channel, "announcement for a non-numeric channel id dropped");
            return;
        };
        if let Err(e) = ChannelId::new(id).say(&self.http, text).await {
            warn!(target: "quest.notify", channel, error = %e, "announcement failed");
        }
    }
}

async fn dispatch(engine: &QuestEngine, prefix: &str, actor: &Actor, command: Command, args: &[&str]) -> Result<Option<ActionResult>, EngineError> {
    let res = match command {
        Command::Help => ActionResult::ok(help_text(prefix)),
        Command::Quest => engine.quest(actor).await?,
        Command::Mob => engine.start_encounter(actor).await?,
        Command::Join => engine.join_encounter(actor).await?,
        Command::Encounter => engine.encounter_status().await?,
        Command::Profile => match args.first() {
            Some(name) => engine.profile_of(name).await?,
            None => engine.profile(actor).await?,
        },
        Command::Energy => engine.energy_status(actor).await?,
        Command::Inventory => engine.inventory_text(actor).await?,
        Command::Search => engine.search(actor).await?,
        Command::Use => match args {
            [] => ActionResult::ok(format!("Usage: {prefix}use <item> [target]")),
            [item] => engine.use_item(actor, item, None).await?,
            [item, target, ..] => engine.use_item(actor, item, Some(*target)).await?,
        },
        Command::Leaderboard => {
            let kind = args.first().and_then(|k| k.parse().ok()).unwrap_or(LeaderboardKind::default());
            engine.leaderboard_text(kind, LEADERBOARD_LIMIT).await?
        }
        Command::Prestige => engine.prestige(actor).await?,
        Command::Transcend => engine.transcend(actor).await?,
        Command::Class => match args.first() {
            Some(class) => engine.choose_class(actor, class).await?,
            None => ActionResult::ok(format!(
                "Usage: {prefix}class <name>. Classes: {}",
                engine.config().content.classes.join(", ")
            )),
        },
        Command::Challenges => engine.challenges_text(actor).await?,
        Command::Challenge => engine.enter_challenge(actor).await?,
        Command::Abilities => engine.abilities_text(actor).await?,
        Command::Legacy => engine.hall_of_fame_text().await?,
        Command::Admin => match AdminCommand::parse(args) {
            Some(cmd) => engine.admin(actor, cmd).await?,
            None => ActionResult::ok(ADMIN_USAGE),
        },
        Command::Unknown => return Ok(None),
    };
    Ok(Some(res))
}

fn internal_failure() -> ActionResult {
    ActionResult::failed("Something went wrong on our side. Please try again in a moment.")
}

pub struct Handler {
    pub allowed_guild_id: GuildId,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "connected to the gateway");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.guild_id != Some(self.allowed_guild_id) || msg.author.bot {
            return;
        }
        let Some(app_state) = AppState::from_ctx(&ctx).await else {
            warn!("AppState missing from the TypeMap");
            return;
        };
        let Some(command_body) = msg.content.strip_prefix(&app_state.prefix) else {
            return;
        };
        let mut args = command_body.split_whitespace();
        let Some(command_str) = args.next() else {
            return;
        };
        let command_str = command_str.to_lowercase();
        let args_vec: Vec<&str> = args.collect();
        let actor = Actor::new(msg.author.id.to_string(), msg.author.name.clone(), msg.channel_id.to_string());
        let engine = &app_state.engine;

        let outcome = match Command::from_str(&command_str).unwrap_or(Command::Unknown) {
            // Ability commands are configured, so they are looked up before giving up.
            Command::Unknown if engine.config().ability_by_command(&command_str).is_some() => {
                engine.use_ability(&actor, &command_str).await.map(Some)
            }
            command => dispatch(engine, &app_state.prefix, &actor, command, &args_vec).await,
        };
        let result = match outcome {
            Ok(Some(result)) => result,
            Ok(None) => return,
            Err(e) => {
                warn!(user = %actor.id, command = %command_str, error = %e, "quest command failed");
                internal_failure()
            }
        };
        debug!(user = %actor.id, command = %command_str, success = result.success, "quest command handled");
        if let Err(e) = msg.channel_id.say(&ctx.http, &result.reply).await {
            warn!(error = %e, "failed to send reply");
        }
        for announcement in &result.announcements {
            if let Err(e) = msg.channel_id.say(&ctx.http, announcement).await {
                warn!(error = %e, "failed to send announcement");
            }
        }
    }
}
