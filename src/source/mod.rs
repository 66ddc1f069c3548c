pub mod discord;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SourceError;

/// A message as fetched from the platform, before validation.
///
/// Fields the pipeline requires are optional here on purpose: anything the
/// platform hands us with holes gets dropped at the boundary instead of
/// flowing into the typed pipeline.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub id: Option<String>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// A validated, normalized message. The unit persisted and searched.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Validates a raw fetch result. Returns `None` when a required field is
    /// missing or empty; callers drop such records without counting them.
    pub fn from_raw(raw: RawMessage, channel_id: &str) -> Option<Self> {
        let message_id = raw.id.filter(|id| !id.is_empty())?;
        let author_id = raw.author_id.filter(|id| !id.is_empty())?;
        Some(Self {
            message_id,
            channel_id: channel_id.to_string(),
            author_name: raw.author_name.unwrap_or_else(|| author_id.clone()),
            author_id,
            content: raw.content,
            created_at: raw.created_at.unwrap_or_else(Utc::now),
        })
    }
}

/// A channel to crawl, decoupled from any concrete platform type.
#[derive(Debug, Clone)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
}

/// Paginated, rate-limited message history source.
///
/// `fetch_page` returns up to `limit` messages in descending time order,
/// starting strictly before the message `before` when given (most recent
/// first when `None`). An empty page means the history is exhausted.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_page(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<RawMessage>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, author: &str) -> RawMessage {
        RawMessage {
            id: Some(id.to_string()),
            author_id: Some(author.to_string()),
            author_name: Some(format!("user-{author}")),
            content: "hello".to_string(),
            created_at: Some(Utc::now()),
        }
    }

    #[test]
    fn from_raw_accepts_complete_message() {
        let record = MessageRecord::from_raw(raw("1", "a"), "c1").unwrap();
        assert_eq!(record.message_id, "1");
        assert_eq!(record.channel_id, "c1");
        assert_eq!(record.author_name, "user-a");
    }

    #[test]
    fn from_raw_rejects_missing_id_or_author() {
        let mut no_id = raw("1", "a");
        no_id.id = None;
        assert!(MessageRecord::from_raw(no_id, "c1").is_none());

        let mut empty_id = raw("1", "a");
        empty_id.id = Some(String::new());
        assert!(MessageRecord::from_raw(empty_id, "c1").is_none());

        let mut no_author = raw("1", "a");
        no_author.author_id = None;
        assert!(MessageRecord::from_raw(no_author, "c1").is_none());
    }

    #[test]
    fn from_raw_falls_back_to_author_id_for_name() {
        let mut no_name = raw("1", "a");
        no_name.author_name = None;
        let record = MessageRecord::from_raw(no_name, "c1").unwrap();
        assert_eq!(record.author_name, "a");
    }
}
