use crate::error::IndexError;
use crate::indexer::Indexer;
use crate::progress::ProgressHandle;
use crate::source::{ChannelRef, MessageSource};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

impl Indexer {
    /// Indexes many channels with bounded parallelism.
    ///
    /// A queue is seeded with every channel followed by one stop marker per
    /// worker; `max_concurrent_channels` workers pull from it until they hit
    /// a marker. A channel that fails only costs that channel: permission
    /// problems are logged at warn, everything else at error, and siblings
    /// keep running. The whole pass runs under the global timeout, which
    /// cancels in-flight crawls and is fatal.
    ///
    /// Returns the aggregate count of newly indexed messages.
    pub async fn index_channels(
        self: Arc<Self>,
        source: Arc<dyn MessageSource>,
        channels: Vec<ChannelRef>,
        progress: Option<ProgressHandle>,
    ) -> Result<u64, IndexError> {
        let channel_count = channels.len();
        if channel_count == 0 {
            return Ok(0);
        }
        let workers = self.workers.clamp(1, channel_count);
        info!(
            "Indexer: starting pass over {} channels with {} workers",
            channel_count, workers
        );

        // Seed the full queue up front; capacity covers every item plus the
        // stop markers so sends never suspend.
        let (queue_tx, queue_rx) = mpsc::channel::<Option<ChannelRef>>(channel_count + workers);
        for channel in channels {
            queue_tx.send(Some(channel)).await.ok();
        }
        for _ in 0..workers {
            queue_tx.send(None).await.ok();
        }
        drop(queue_tx);
        let queue = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let total = Arc::new(AtomicU64::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for worker_id in 0..workers {
            let queue = queue.clone();
            let indexer = self.clone();
            let source = source.clone();
            let progress = progress.clone();
            let total = total.clone();
            let completed = completed.clone();

            tasks.spawn(async move {
                loop {
                    let item = queue.lock().await.recv().await;
                    let Some(Some(channel)) = item else {
                        debug!("Worker {}: stop marker, exiting", worker_id);
                        break;
                    };

                    info!("Worker {}: indexing channel {}", worker_id, channel.name);
                    match indexer
                        .index_channel(source.as_ref(), &channel, progress.as_ref())
                        .await
                    {
                        Ok(count) => {
                            total.fetch_add(count, Ordering::SeqCst);
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            // Always emit the final per-channel count; the
                            // crawl's own reports are throttled and may have
                            // stopped short of it.
                            if let Some(progress) = &progress {
                                progress.report(&channel, count);
                            }
                            info!(
                                "Worker {}: finished {} with {} new messages ({}/{} channels)",
                                worker_id, channel.name, count, done, channel_count
                            );
                        }
                        Err(IndexError::PermissionDenied(_)) => {
                            warn!(
                                "Worker {}: no permission to read {}, skipping",
                                worker_id, channel.name
                            );
                        }
                        Err(e) => {
                            error!(
                                "Worker {}: indexing {} failed: {}",
                                worker_id, channel.name, e
                            );
                        }
                    }
                }
            });
        }

        let drain = async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("Indexer: worker panicked: {}", e);
                }
            }
        };
        if tokio::time::timeout(self.global_timeout, drain).await.is_err() {
            tasks.abort_all();
            error!(
                "Indexer: pass timed out after {}",
                humantime::format_duration(self.global_timeout)
            );
            return Err(IndexError::Timeout(self.global_timeout));
        }

        let total = total.load(Ordering::SeqCst);
        info!("Indexer: pass complete, {} new messages", total);
        Ok(total)
    }
}
