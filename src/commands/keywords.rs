use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::search::{top_authors, KeywordSearch};
use crate::{Context, Error};
use std::collections::HashMap;
use tracing::info;

const TOP_AUTHOR_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, poise::ChoiceParameter)]
pub enum SearchScope {
    #[name = "current"]
    Current,
    #[name = "all"]
    All,
}

/// Count keyword usage per author over indexed messages
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn keywords(
    ctx: Context<'_>,
    #[description = "Search the current channel or the whole server"] scope: Option<SearchScope>,
    #[description = "Space-separated keywords to analyze"]
    #[rest]
    keywords: Option<String>,
) -> Result<(), Error> {
    let keywords: Vec<String> = keywords
        .unwrap_or_default()
        .split_whitespace()
        .map(String::from)
        .collect();
    if keywords.is_empty() {
        ctx.say("Please provide at least one keyword to analyze.").await?;
        return Ok(());
    }

    ctx.defer().await?;
    let channel_ids = match scope.unwrap_or(SearchScope::Current) {
        SearchScope::Current => Some(vec![ctx.channel_id().to_string()]),
        SearchScope::All => None,
    };

    info!("Keywords command: analyzing {:?}", keywords);
    let search = KeywordSearch::new(ctx.data().db.clone());
    let results = search.search(&keywords, channel_ids).await?;

    let name_cache = &ctx.data().name_cache;
    let mut response = String::new();
    for keyword in &keywords {
        let counts = results.get(keyword).cloned().unwrap_or_default();
        response.push_str(&render_keyword(keyword, &counts, |author| {
            name_cache.display_name(author)
        }));
    }
    truncate_reply(&mut response, DISCORD_MESSAGE_LIMIT);

    ctx.say(response).await?;
    Ok(())
}

/// Cuts `text` down to at most `limit` bytes, ending with an ellipsis. The
/// cut backs up to a char boundary so multi-byte display names never land a
/// truncation inside a code point.
fn truncate_reply(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut cut = limit - '…'.len_utf8();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push('…');
}

fn render_keyword(
    keyword: &str,
    counts: &HashMap<String, u64>,
    display_name: impl Fn(&str) -> String,
) -> String {
    let mut text = format!("**Results for '{keyword}':**\n");
    let top = top_authors(counts, TOP_AUTHOR_COUNT);
    if top.is_empty() {
        text.push_str("- no usage found\n");
    } else {
        for (author, count) in top {
            text.push_str(&format!("- {}: {} times\n", display_name(&author), count));
        }
    }
    text
}
