pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod indexer;
pub mod name_cache;
pub mod progress;
pub mod search;
pub mod source;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub indexer: std::sync::Arc<indexer::Indexer>,
    pub name_cache: std::sync::Arc<name_cache::NameCache>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
