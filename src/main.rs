use lexicord::commands::{export, index, keywords, names};
use lexicord::{config::Config, db::Database, indexer::Indexer, name_cache::NameCache, Data};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; LOG_LEVEL=debug etc. via the standard env filter.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();
    let command_prefix = config.command_prefix.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                index::index(),
                keywords::keywords(),
                names::names(),
                export::export(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(command_prefix),
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let db = Database::new(&config).expect("Failed to open database");
                db.execute_init().expect("Failed to initialize database");

                let indexer = Arc::new(Indexer::new(db.clone(), &config));
                let name_cache = Arc::new(NameCache::load(&config.name_cache_file));

                Ok(Data {
                    config,
                    db,
                    indexer,
                    name_cache,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
