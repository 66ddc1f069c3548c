use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub command_prefix: String,
    pub database_url: String,
    pub name_cache_file: String,
    // Indexing pipeline settings
    pub batch_size: usize,
    pub max_concurrent_channels: usize,
    pub inter_page_sleep_secs: f64,
    pub max_concurrent_store_writes: usize,
    pub global_timeout_secs: u64,
    pub rate_limit_backoff_secs: f64,
    pub max_rate_limit_retries: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            command_prefix: env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/messages.db".to_string()),
            name_cache_file: env::var("NAME_CACHE_FILE")
                .unwrap_or_else(|_| "name_cache.json".to_string()),
            batch_size: parse_env("BATCH_SIZE", 1000)?,
            max_concurrent_channels: parse_env("MAX_CONCURRENT_CHANNELS", 3)?,
            inter_page_sleep_secs: parse_env("SLEEP_TIME", 1.0)?,
            max_concurrent_store_writes: parse_env("MAX_CONCURRENT_STORE_WRITES", 5)?,
            global_timeout_secs: parse_env("GLOBAL_TIMEOUT_SECS", 3600)?,
            rate_limit_backoff_secs: parse_env("RATE_LIMIT_BACKOFF_SECS", 5.0)?,
            max_rate_limit_retries: parse_env("MAX_RATE_LIMIT_RETRIES", 5)?,
        })
    }

    pub fn inter_page_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.inter_page_sleep_secs)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_backoff_secs)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            discord_token: "test".to_string(),
            command_prefix: "!".to_string(),
            database_url: ":memory:".to_string(),
            name_cache_file: "name_cache.json".to_string(),
            batch_size: 1000,
            max_concurrent_channels: 3,
            inter_page_sleep_secs: 0.0,
            max_concurrent_store_writes: 5,
            global_timeout_secs: 3600,
            rate_limit_backoff_secs: 0.0,
            max_rate_limit_retries: 5,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("command_prefix", &self.command_prefix)
            .field("database_url", &self.database_url)
            .field("name_cache_file", &self.name_cache_file)
            .field("batch_size", &self.batch_size)
            .field("max_concurrent_channels", &self.max_concurrent_channels)
            .field("inter_page_sleep_secs", &self.inter_page_sleep_secs)
            .field(
                "max_concurrent_store_writes",
                &self.max_concurrent_store_writes,
            )
            .field("global_timeout_secs", &self.global_timeout_secs)
            .field("rate_limit_backoff_secs", &self.rate_limit_backoff_secs)
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .finish()
    }
}

/// Unset variables fall back to `default`; a set-but-unparsable value is a
/// startup error rather than a silently ignored setting.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid value '{}' for {}", raw, name)),
        Err(_) => Ok(default),
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
