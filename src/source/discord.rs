use crate::error::SourceError;
use crate::source::{MessageSource, RawMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::builder::GetMessages;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, MessageId};
use std::sync::Arc;

/// Discord caps history pages at 100 messages per request.
const DISCORD_PAGE_LIMIT: usize = 100;

/// History source backed by the Discord REST API. Returns pages newest-first,
/// which is exactly the order the crawler pages in.
pub struct DiscordSource {
    http: Arc<Http>,
}

impl DiscordSource {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageSource for DiscordSource {
    async fn fetch_page(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<RawMessage>, SourceError> {
        let channel = channel_id
            .parse::<u64>()
            .map(ChannelId::new)
            .map_err(|e| SourceError::Other(anyhow::anyhow!("invalid channel id: {e}")))?;

        let mut request = GetMessages::new().limit(clamp_page_limit(limit));
        if let Some(before) = before {
            let before = before
                .parse::<u64>()
                .map_err(|e| SourceError::Other(anyhow::anyhow!("invalid cursor: {e}")))?;
            request = request.before(MessageId::new(before));
        }

        let messages = channel
            .messages(&self.http, request)
            .await
            .map_err(map_error)?;
        Ok(messages.into_iter().map(to_raw).collect())
    }
}

fn clamp_page_limit(limit: usize) -> u8 {
    limit.clamp(1, DISCORD_PAGE_LIMIT) as u8
}

fn to_raw(message: Message) -> RawMessage {
    let created_at: Option<DateTime<Utc>> =
        DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0);
    RawMessage {
        id: Some(message.id.to_string()),
        author_id: Some(message.author.id.to_string()),
        author_name: Some(message.author.name.clone()),
        content: message.content,
        created_at,
    }
}

fn map_error(err: serenity::Error) -> SourceError {
    if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(ref response)) = err
    {
        match response.status_code.as_u16() {
            403 => return SourceError::PermissionDenied,
            429 => return SourceError::RateLimited,
            _ => {}
        }
    }
    SourceError::Other(anyhow::anyhow!(err))
}
