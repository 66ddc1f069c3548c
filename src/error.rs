use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`crate::source::MessageSource`] while fetching history.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The platform asked us to slow down. The crawler backs off and retries
    /// the same page.
    #[error("rate limited by message source")]
    RateLimited,

    /// The bot cannot read this channel's history.
    #[error("missing permission to read channel history")]
    PermissionDenied,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced by the indexing pipeline.
///
/// Per-channel failures (`PermissionDenied`, `RetriesExhausted`, `Store`,
/// `Source`) are logged by the scheduler and do not abort sibling channels.
/// `Timeout` is fatal to the whole multi-channel pass.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no permission to index channel {0}")]
    PermissionDenied(String),

    #[error("rate limit retries exhausted after {retries} attempts on channel {channel_id}")]
    RetriesExhausted { channel_id: String, retries: u32 },

    #[error("store write failed: {0}")]
    Store(#[source] anyhow::Error),

    #[error("message source failed: {0}")]
    Source(#[source] anyhow::Error),

    #[error("indexing pass timed out after {0:?}")]
    Timeout(Duration),

    #[error("an indexing pass is already running for this server")]
    AlreadyRunning,
}
