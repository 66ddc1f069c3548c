use crate::db::Database;
use crate::error::IndexError;
use crate::source::MessageRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Sink for crawled message batches. The crawler only sees this trait, so
/// tests can swap in recording or failing persisters.
#[async_trait]
pub trait Persist: Send + Sync {
    /// Persists one batch transactionally. An error means nothing from the
    /// batch was committed.
    async fn save(&self, batch: Vec<MessageRecord>) -> Result<(), IndexError>;
}

/// Writes batches to the store on the blocking pool, with a global cap on
/// in-flight writes so a slow disk cannot pile up unbounded work. Callers
/// over the cap suspend until a permit frees.
pub struct BatchPersister {
    db: Database,
    write_permits: Arc<Semaphore>,
}

impl BatchPersister {
    pub fn new(db: Database, max_concurrent_writes: usize) -> Self {
        Self {
            db,
            write_permits: Arc::new(Semaphore::new(max_concurrent_writes)),
        }
    }
}

#[async_trait]
impl Persist for BatchPersister {
    async fn save(&self, batch: Vec<MessageRecord>) -> Result<(), IndexError> {
        if batch.is_empty() {
            return Ok(());
        }
        let _permit = self
            .write_permits
            .acquire()
            .await
            .map_err(|e| IndexError::Store(anyhow::anyhow!("write pool closed: {e}")))?;

        debug!("Persister: writing batch of {} messages", batch.len());
        self.db
            .run_blocking(move |db| db.append_batch(&batch))
            .await
            .map_err(IndexError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Utc;

    fn test_db() -> Database {
        let db = Database::new(&Config::for_tests()).unwrap();
        db.execute_init().unwrap();
        db
    }

    fn record(id: &str) -> MessageRecord {
        MessageRecord {
            message_id: id.to_string(),
            channel_id: "c1".to_string(),
            author_id: "a1".to_string(),
            author_name: "A".to_string(),
            content: "body".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_commits_batch() {
        let db = test_db();
        let persister = BatchPersister::new(db.clone(), 5);

        persister
            .save(vec![record("1"), record("2")])
            .await
            .unwrap();
        assert_eq!(db.channel_message_count("c1").unwrap(), 2);
    }

    #[tokio::test]
    async fn save_propagates_store_error() {
        let db = test_db();
        let persister = BatchPersister::new(db.clone(), 5);
        persister.save(vec![record("1")]).await.unwrap();

        // Duplicate id violates the UNIQUE constraint inside the store.
        let err = persister
            .save(vec![record("2"), record("1")])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
        // Rolled back: record "2" must not have been committed.
        assert_eq!(db.channel_message_count("c1").unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let db = test_db();
        let persister = BatchPersister::new(db.clone(), 5);
        persister.save(Vec::new()).await.unwrap();
        assert_eq!(db.channel_message_count("c1").unwrap(), 0);
    }
}
