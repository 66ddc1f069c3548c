pub mod crawler;
pub mod persister;
pub mod scheduler;

pub use crawler::{ChannelCrawler, CrawlSettings};
pub use persister::{BatchPersister, Persist};

use crate::config::Config;
use crate::db::Database;
use crate::error::IndexError;
use crate::progress::ProgressHandle;
use crate::source::{ChannelRef, MessageSource};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Entry point for indexing passes. Owns the store handle, the bounded batch
/// persister and the per-guild busy state.
pub struct Indexer {
    db: Database,
    persister: Arc<dyn Persist>,
    settings: CrawlSettings,
    workers: usize,
    global_timeout: Duration,
    running_guilds: Arc<Mutex<HashSet<u64>>>,
}

impl Indexer {
    pub fn new(db: Database, config: &Config) -> Self {
        let persister = Arc::new(BatchPersister::new(
            db.clone(),
            config.max_concurrent_store_writes,
        ));
        Self {
            db,
            persister,
            settings: CrawlSettings::from_config(config),
            workers: config.max_concurrent_channels,
            global_timeout: config.global_timeout(),
            running_guilds: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claims the guild for one indexing pass. Fails fast with
    /// [`IndexError::AlreadyRunning`] while another pass holds the guard;
    /// dropping the guard returns the guild to idle.
    pub fn begin_pass(&self, guild_id: u64) -> Result<PassGuard, IndexError> {
        let mut running = self.running_guilds.lock().unwrap();
        if !running.insert(guild_id) {
            return Err(IndexError::AlreadyRunning);
        }
        Ok(PassGuard {
            guilds: self.running_guilds.clone(),
            guild_id,
        })
    }

    /// Fully indexes one channel: reads the existing-ids snapshot from the
    /// store, then crawls history backward through the persister. Returns the
    /// newly indexed count.
    pub async fn index_channel(
        &self,
        source: &dyn MessageSource,
        channel: &ChannelRef,
        progress: Option<&ProgressHandle>,
    ) -> Result<u64, IndexError> {
        let channel_id = channel.id.clone();
        let existing = self
            .db
            .run_blocking(move |db| db.existing_ids(&channel_id))
            .await
            .map_err(IndexError::Store)?;

        ChannelCrawler::new(source, self.persister.as_ref(), self.settings.clone())
            .crawl(channel, existing, progress)
            .await
    }
}

/// RAII token for a running indexing pass; see [`Indexer::begin_pass`].
pub struct PassGuard {
    guilds: Arc<Mutex<HashSet<u64>>>,
    guild_id: u64,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.guilds.lock().unwrap().remove(&self.guild_id);
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::error::SourceError;
    use crate::source::{MessageSource, RawMessage};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Shared fake history source for indexer tests. Serves `totals[channel]`
    /// synthetic messages per channel (ids `{channel}-{n}`, newest first) and
    /// tracks how many fetches run at once.
    pub struct StubSource {
        pub totals: HashMap<String, u64>,
        pub denied: HashSet<String>,
        pub fetch_delay: Duration,
        pub hang: bool,
        current_fetches: AtomicUsize,
        pub max_concurrent_fetches: AtomicUsize,
    }

    impl StubSource {
        pub fn new(totals: HashMap<String, u64>) -> Self {
            Self {
                totals,
                denied: HashSet::new(),
                fetch_delay: Duration::ZERO,
                hang: false,
                current_fetches: AtomicUsize::new(0),
                max_concurrent_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MessageSource for StubSource {
        async fn fetch_page(
            &self,
            channel_id: &str,
            limit: usize,
            before: Option<&str>,
        ) -> Result<Vec<RawMessage>, SourceError> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(Vec::new());
            }
            if self.denied.contains(channel_id) {
                return Err(SourceError::PermissionDenied);
            }

            let current = self.current_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent_fetches
                .fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.fetch_delay).await;

            let total = self.totals.get(channel_id).copied().unwrap_or(0);
            let start = match before {
                Some(cursor) => {
                    let n: u64 = cursor.rsplit('-').next().unwrap().parse().unwrap();
                    n.saturating_sub(1)
                }
                None => total,
            };
            let page: Vec<RawMessage> = (0..limit as u64)
                .map_while(|i| start.checked_sub(i).filter(|n| *n >= 1))
                .map(|n| RawMessage {
                    id: Some(format!("{channel_id}-{n}")),
                    author_id: Some(format!("author-{}", n % 2)),
                    author_name: Some(format!("user-{}", n % 2)),
                    content: format!("message {n} in {channel_id}"),
                    created_at: Some(Utc::now()),
                })
                .collect();

            self.current_fetches.fetch_sub(1, Ordering::SeqCst);
            Ok(page)
        }
    }

    pub fn channels(ids: &[&str]) -> Vec<crate::source::ChannelRef> {
        ids.iter()
            .map(|id| crate::source::ChannelRef {
                id: id.to_string(),
                name: format!("#{id}"),
            })
            .collect()
    }
}
