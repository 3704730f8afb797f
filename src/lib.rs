// Library entry so integration tests and external tools can reference internal modules.
// The binary (`main.rs`) is a thin serenity adapter over `quest::QuestEngine`.
pub mod config;
pub mod constants;
pub mod database;
pub mod handler;
pub mod model;
pub mod quest;
pub mod services;

pub use model::AppState;
