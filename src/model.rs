//! Shared state stored in serenity's global `TypeMap`.

use crate::quest::QuestEngine;
use serenity::prelude::TypeMapKey;
use std::sync::Arc;

/// The central state of the bot. An `Arc<AppState>` lives in the global context.
pub struct AppState {
    pub engine: Arc<QuestEngine>,
    /// Command prefix, fixed at startup.
    pub prefix: String,
}

impl AppState {
    pub async fn from_ctx(ctx: &serenity::prelude::Context) -> Option<Arc<Self>> {
        ctx.data.read().await.get::<AppState>().cloned()
    }
}

impl TypeMapKey for AppState {
    type Value = Arc<AppState>;
}
