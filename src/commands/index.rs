use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::progress::{spawn_reporter, ProgressSnapshot};
use crate::source::discord::DiscordSource;
use crate::source::ChannelRef;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use serenity::{ChannelType, EditMessage, Http};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Which channels an indexing pass covers.
#[derive(Debug, Clone, Copy, PartialEq, poise::ChoiceParameter)]
pub enum IndexScope {
    #[name = "current"]
    Current,
    #[name = "category"]
    Category,
    #[name = "all"]
    All,
}

/// Index message history into the search store
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn index(
    ctx: Context<'_>,
    #[description = "Channels to index (current/category/all)"] scope: Option<IndexScope>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("must be run in a guild")?;
    let indexer = ctx.data().indexer.clone();

    // One pass per guild at a time.
    let _guard = match indexer.begin_pass(guild_id.get()) {
        Ok(guard) => guard,
        Err(e) => {
            ctx.say(e.to_string()).await?;
            return Ok(());
        }
    };

    ctx.defer().await?;
    let http = ctx.serenity_context().http.clone();
    let scope = scope.unwrap_or(IndexScope::Current);
    let channels = resolve_channels(&ctx, &http, scope).await?;
    if channels.is_empty() {
        ctx.say("No text channels to index for that scope.").await?;
        return Ok(());
    }
    let channel_count = channels.len();

    let status = ctx
        .channel_id()
        .say(&http, format!("Preparing to index {channel_count} channels..."))
        .await?;
    let status = Arc::new(tokio::sync::Mutex::new(status));

    // Live progress goes through the bounded reporter so Discord edit latency
    // never stalls the crawl workers.
    let sink_http = http.clone();
    let sink_status = status.clone();
    let (progress, reporter) = spawn_reporter(256, Duration::from_secs(2), move |snapshot| {
        let http = sink_http.clone();
        let status = sink_status.clone();
        async move {
            let text = render_progress(&snapshot, channel_count);
            let mut message = status.lock().await;
            if let Err(e) = message.edit(&http, EditMessage::new().content(text)).await {
                debug!("Index command: progress edit failed: {}", e);
            }
        }
    });

    let source = Arc::new(DiscordSource::new(http.clone()));
    let started = Instant::now();
    let result = indexer
        .clone()
        .index_channels(source, channels, Some(progress))
        .await;
    reporter.await.ok();

    let summary = match result {
        Ok(total) => {
            let took = Duration::from_secs(started.elapsed().as_secs().max(1));
            format!(
                "Indexing complete!\n- Channels processed: {}\n- New messages indexed: {}\n- Took: {}",
                channel_count,
                total,
                humantime::format_duration(took)
            )
        }
        Err(e) => format!("Indexing failed: {e}\nCheck the logs for details."),
    };
    status
        .lock()
        .await
        .edit(&http, EditMessage::new().content(summary))
        .await?;

    Ok(())
}

async fn resolve_channels(
    ctx: &Context<'_>,
    http: &Arc<Http>,
    scope: IndexScope,
) -> Result<Vec<ChannelRef>, Error> {
    let guild_id = ctx.guild_id().ok_or("must be run in a guild")?;
    let all = guild_id.channels(http.as_ref()).await?;
    let current = ctx.channel_id();

    let mut selected: Vec<ChannelRef> = all
        .values()
        .filter(|channel| channel.kind == ChannelType::Text)
        .filter(|channel| match scope {
            IndexScope::Current => channel.id == current,
            IndexScope::All => true,
            IndexScope::Category => {
                let parent = all.get(&current).and_then(|c| c.parent_id);
                parent.is_some() && channel.parent_id == parent
            }
        })
        .map(|channel| ChannelRef {
            id: channel.id.to_string(),
            name: channel.name.clone(),
        })
        .collect();
    selected.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(selected)
}

fn render_progress(snapshot: &ProgressSnapshot, channel_count: usize) -> String {
    let mut text = format!(
        "Indexing... ({}/{} channels reporting)\nMessages processed: {}\n\nRecently active:\n",
        snapshot.channels.len(),
        channel_count,
        snapshot.total
    );
    for channel in snapshot.channels.iter().rev().take(5) {
        text.push_str(&format!(
            "- {}: {} messages\n",
            channel.channel_name, channel.indexed
        ));
    }
    if text.len() > DISCORD_MESSAGE_LIMIT {
        text = format!(
            "Indexing... {}/{} channels, {} messages",
            snapshot.channels.len(),
            channel_count,
            snapshot.total
        );
    }
    text
}
