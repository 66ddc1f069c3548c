use crate::source::ChannelRef;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// One progress update from a crawl: the running indexed count for a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub channel_id: String,
    pub channel_name: String,
    pub indexed: u64,
}

/// Aggregated view handed to the progress sink.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    /// Latest count per channel, in first-report order.
    pub channels: Vec<ProgressEvent>,
    pub total: u64,
}

/// Producer side of the progress pipeline. Crawlers report through this from
/// up to W workers at once; events flow into a bounded queue consumed by a
/// single reporter task, so the sink never sees concurrent calls.
#[derive(Clone)]
pub struct ProgressHandle {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressHandle {
    /// Best-effort report. A full queue drops the event instead of stalling
    /// the crawl; a later report supersedes it anyway.
    pub fn report(&self, channel: &ChannelRef, indexed: u64) {
        let _ = self.tx.try_send(ProgressEvent {
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            indexed,
        });
    }
}

/// Spawns the reporter task. The sink is invoked with a fresh snapshot at
/// most once per `interval` while events arrive, and once more with the
/// final totals when every [`ProgressHandle`] clone has been dropped.
pub fn spawn_reporter<S, Fut>(
    capacity: usize,
    interval: Duration,
    sink: S,
) -> (ProgressHandle, JoinHandle<()>)
where
    S: Fn(ProgressSnapshot) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(capacity);
    let task = tokio::spawn(async move {
        let mut snapshot = ProgressSnapshot::default();
        let mut last_emit: Option<Instant> = None;

        while let Some(event) = rx.recv().await {
            apply(&mut snapshot, event);
            let due = last_emit.map_or(true, |at| at.elapsed() >= interval);
            if due {
                sink(snapshot.clone()).await;
                last_emit = Some(Instant::now());
            }
        }

        // Senders are gone; emit the final state.
        debug!("Progress reporter: draining, emitting final snapshot");
        sink(snapshot).await;
    });
    (ProgressHandle { tx }, task)
}

fn apply(snapshot: &mut ProgressSnapshot, event: ProgressEvent) {
    match snapshot
        .channels
        .iter_mut()
        .find(|c| c.channel_id == event.channel_id)
    {
        Some(existing) => existing.indexed = event.indexed,
        None => snapshot.channels.push(event),
    }
    snapshot.total = snapshot.channels.iter().map(|c| c.indexed).sum();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn channel(id: &str) -> ChannelRef {
        ChannelRef {
            id: id.to_string(),
            name: format!("#{id}"),
        }
    }

    #[tokio::test]
    async fn reporter_aggregates_per_channel_totals() {
        let seen: Arc<Mutex<Vec<ProgressSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let (handle, task) = spawn_reporter(16, Duration::ZERO, move |snapshot| {
            let sink_seen = sink_seen.clone();
            async move {
                sink_seen.lock().unwrap().push(snapshot);
            }
        });

        handle.report(&channel("c1"), 100);
        handle.report(&channel("c2"), 50);
        handle.report(&channel("c1"), 250);
        drop(handle);
        task.await.unwrap();

        let snapshots = seen.lock().unwrap();
        let last = snapshots.last().unwrap();
        assert_eq!(last.total, 300);
        assert_eq!(last.channels.len(), 2);
        assert_eq!(last.channels[0].channel_id, "c1");
        assert_eq!(last.channels[0].indexed, 250);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        // Capacity 1 and a sink that never runs until we drop the handle.
        let (handle, task) = spawn_reporter(1, Duration::from_secs(3600), |_| async {});
        for i in 0..100 {
            // Must never suspend or panic even though the consumer is slow.
            handle.report(&channel("c1"), i);
        }
        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn throttles_to_interval_but_flushes_final_state() {
        let count = Arc::new(Mutex::new(0u32));
        let sink_count = count.clone();
        let (handle, task) = spawn_reporter(64, Duration::from_secs(3600), move |_| {
            let sink_count = sink_count.clone();
            async move {
                *sink_count.lock().unwrap() += 1;
            }
        });

        for i in 0..10 {
            handle.report(&channel("c1"), i);
        }
        drop(handle);
        task.await.unwrap();

        // First event emits immediately, the rest are throttled, plus the
        // final drain emit.
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
