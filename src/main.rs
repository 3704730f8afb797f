use std::env;
use std::sync::Arc;

use anyhow::Context as _;
use questbot::config::QuestConfig;
use questbot::constants::{DEFAULT_CONFIG_PATH, DEFAULT_PREFIX};
use questbot::database::PlayerStore;
use questbot::database::memory::MemoryStore;
use questbot::database::pg::PgStore;
use questbot::handler::{Handler, SerenityNotifier};
use questbot::model::AppState;
use questbot::quest::QuestEngine;
use serenity::http::Http;
use serenity::model::gateway::GatewayIntents;
use serenity::model::id::GuildId;
use serenity::prelude::*;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

async fn open_store() -> anyhow::Result<Arc<dyn PlayerStore>> {
    match env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .context("connecting to DATABASE_URL")?;
            let store = PgStore::new(pool);
            store.init_schema().await.context("creating the quest_records table")?;
            info!("using the Postgres player store");
            Ok(Arc::new(store))
        }
        Err(_) => {
            warn!("DATABASE_URL not set, quest progress will only live in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,questbot=debug,serenity=warn")),
        )
        .init();

    let token = env::var("DISCORD_TOKEN").context("DISCORD_TOKEN must be set")?;
    let server_id = env::var("SERVER_ID")
        .context("SERVER_ID must be set")?
        .parse::<u64>()
        .context("SERVER_ID must be a valid number")?;
    let prefix = env::var("COMMAND_PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string());
    let config_path = env::var("QUEST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = QuestConfig::load(&config_path);
    let store = open_store().await?;
    let http = Arc::new(Http::new(&token));
    let engine = QuestEngine::builder(config, store)
        .notifier(Arc::new(SerenityNotifier::new(http)))
        .prefix(prefix.clone())
        .build();
    engine.start().await.context("restoring quest state")?;

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler { allowed_guild_id: GuildId::new(server_id) })
        .await
        .context("creating the Discord client")?;

    {
        let mut data = client.data.write().await;
        data.insert::<AppState>(Arc::new(AppState { engine: engine.clone(), prefix }));
    }

    let result = client.start().await.context("Discord client stopped");
    engine.shutdown().await;
    result
}
