use crate::error::{IndexError, SourceError};
use crate::indexer::persister::Persist;
use crate::progress::ProgressHandle;
use crate::source::{ChannelRef, MessageRecord, MessageSource};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Minimum gap between two progress reports for the same crawl.
const PROGRESS_REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Tuning knobs for a single-channel crawl. Taken from [`crate::config::Config`]
/// in production, overridden freely in tests.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub batch_size: usize,
    pub inter_page_sleep: Duration,
    pub rate_limit_backoff: Duration,
    pub max_rate_limit_retries: u32,
}

impl CrawlSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            batch_size: config.batch_size,
            inter_page_sleep: config.inter_page_sleep(),
            rate_limit_backoff: config.rate_limit_backoff(),
            max_rate_limit_retries: config.max_rate_limit_retries,
        }
    }
}

/// Pages one channel's history backward from the most recent message,
/// filtering already-indexed ids and flushing fixed-size batches through the
/// persister.
pub struct ChannelCrawler<'a> {
    source: &'a dyn MessageSource,
    persister: &'a dyn Persist,
    settings: CrawlSettings,
}

impl<'a> ChannelCrawler<'a> {
    pub fn new(
        source: &'a dyn MessageSource,
        persister: &'a dyn Persist,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            source,
            persister,
            settings,
        }
    }

    /// Indexes everything in `channel` that is not already in `existing`.
    /// Returns the number of newly indexed messages.
    ///
    /// `existing` is the ids-already-indexed snapshot for this channel, read
    /// from the store once before the crawl starts. Ids buffered during the
    /// crawl are added to it, so overlapping pages cannot double-count.
    pub async fn crawl(
        &self,
        channel: &ChannelRef,
        mut existing: HashSet<String>,
        progress: Option<&ProgressHandle>,
    ) -> Result<u64, IndexError> {
        let mut total: u64 = 0;
        let mut buffer: Vec<MessageRecord> = Vec::with_capacity(self.settings.batch_size);
        let mut cursor: Option<String> = None;
        let mut rate_limit_retries: u32 = 0;
        let mut last_report = Instant::now();

        info!(
            "Crawler: starting channel {} ({} ids already indexed)",
            channel.name,
            existing.len()
        );

        loop {
            let page = match self
                .source
                .fetch_page(&channel.id, self.settings.batch_size, cursor.as_deref())
                .await
            {
                Ok(page) => {
                    rate_limit_retries = 0;
                    page
                }
                Err(SourceError::RateLimited) => {
                    rate_limit_retries += 1;
                    if rate_limit_retries > self.settings.max_rate_limit_retries {
                        self.flush_best_effort(&mut buffer, channel).await;
                        return Err(IndexError::RetriesExhausted {
                            channel_id: channel.id.clone(),
                            retries: rate_limit_retries - 1,
                        });
                    }
                    warn!(
                        "Crawler: rate limited on {}, backing off (attempt {}/{})",
                        channel.name, rate_limit_retries, self.settings.max_rate_limit_retries
                    );
                    tokio::time::sleep(self.settings.rate_limit_backoff).await;
                    continue;
                }
                Err(SourceError::PermissionDenied) => {
                    self.flush_best_effort(&mut buffer, channel).await;
                    return Err(IndexError::PermissionDenied(channel.id.clone()));
                }
                Err(SourceError::Other(e)) => {
                    self.flush_best_effort(&mut buffer, channel).await;
                    return Err(IndexError::Source(e));
                }
            };

            if page.is_empty() {
                // History exhausted.
                break;
            }

            // The cursor advances on the raw page, not the filtered one, so a
            // page of all-duplicates (or all-malformed items) keeps paginating
            // instead of ending the crawl early.
            let mut next_cursor: Option<String> = None;
            for raw in page {
                if let Some(id) = &raw.id {
                    next_cursor = Some(id.clone());
                }
                let Some(record) = MessageRecord::from_raw(raw, &channel.id) else {
                    debug!("Crawler: dropping malformed message in {}", channel.name);
                    continue;
                };
                if !existing.insert(record.message_id.clone()) {
                    continue;
                }

                buffer.push(record);
                total += 1;

                if buffer.len() >= self.settings.batch_size {
                    self.flush(&mut buffer).await?;
                    if let Some(progress) = progress {
                        if last_report.elapsed() >= PROGRESS_REPORT_INTERVAL {
                            progress.report(channel, total);
                            last_report = Instant::now();
                        }
                    }
                }
            }

            match next_cursor {
                Some(id) => cursor = Some(id),
                // No item on the page carried an id; there is nothing to
                // paginate from, so treat the history as exhausted.
                None => break,
            }

            tokio::time::sleep(self.settings.inter_page_sleep).await;
        }

        self.flush(&mut buffer).await?;
        info!(
            "Crawler: finished channel {}, {} new messages",
            channel.name, total
        );
        Ok(total)
    }

    async fn flush(&self, buffer: &mut Vec<MessageRecord>) -> Result<(), IndexError> {
        if buffer.is_empty() {
            return Ok(());
        }
        self.persister.save(std::mem::take(buffer)).await
    }

    /// Flush before propagating a source error. The original error wins, so a
    /// failure here is only logged.
    async fn flush_best_effort(&self, buffer: &mut Vec<MessageRecord>, channel: &ChannelRef) {
        if let Err(e) = self.flush(buffer).await {
            warn!(
                "Crawler: failed to flush pending batch for {} while aborting: {}",
                channel.name, e
            );
        }
    }
}
