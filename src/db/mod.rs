use crate::config::Config;
use crate::source::MessageRecord;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// Durable message store. One `messages` row per indexed message, keyed by
/// the platform message id.
///
/// rusqlite is synchronous; async callers go through [`Database::run_blocking`]
/// so the connection never blocks the cooperative scheduler.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> rusqlite::Result<Self> {
        let conn = Connection::open(&config.database_url)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: initializing schema");
        let sql = "
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                discord_id TEXT NOT NULL UNIQUE,
                channel_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages (channel_id);
            CREATE INDEX IF NOT EXISTS idx_messages_author ON messages (author_id);
            CREATE INDEX IF NOT EXISTS idx_messages_created ON messages (created_at);
        ";
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)?;
        debug!("Database: schema initialized");
        Ok(())
    }

    /// Runs a closure against the store on the blocking thread pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// All message ids already indexed for a channel. Read once at the start
    /// of a crawl to drive deduplication.
    pub fn existing_ids(&self, channel_id: &str) -> anyhow::Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT discord_id FROM messages WHERE channel_id = ?1")?;
        let rows = stmt.query_map([channel_id], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    /// Persists a batch in a single transaction. Either every record commits
    /// or none do; the error is propagated on rollback.
    ///
    /// Dedup happens upstream in the crawler, so a duplicate id reaching this
    /// point is a bug and fails the whole batch via the UNIQUE constraint.
    pub fn append_batch(&self, records: &[MessageRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages (discord_id, channel_id, author_id, author_name, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in records {
                stmt.execute((
                    &record.message_id,
                    &record.channel_id,
                    &record.author_id,
                    &record.author_name,
                    &record.content,
                    record.created_at.format(SQLITE_DATETIME).to_string(),
                ))?;
            }
        }
        tx.commit()?;
        debug!("Database: committed batch of {} messages", records.len());
        Ok(())
    }

    /// Case-insensitive substring search over message bodies, aggregated to
    /// a per-author count. `channel_ids` restricts the search when non-empty.
    pub fn search_keyword(
        &self,
        keyword: &str,
        channel_ids: Option<&[String]>,
    ) -> anyhow::Result<HashMap<String, u64>> {
        let conn = self.conn.lock().unwrap();

        // instr() instead of LIKE so %/_ in the keyword need no escaping.
        let mut sql = String::from(
            "SELECT author_name, COUNT(*) FROM messages
             WHERE instr(lower(content), lower(?1)) > 0",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(keyword.to_string())];

        if let Some(channels) = channel_ids.filter(|c| !c.is_empty()) {
            let placeholders: Vec<String> = (0..channels.len())
                .map(|i| format!("?{}", i + 2))
                .collect();
            sql.push_str(&format!(" AND channel_id IN ({})", placeholders.join(", ")));
            for channel in channels {
                params.push(Box::new(channel.clone()));
            }
        }
        sql.push_str(" GROUP BY author_name");

        let mut stmt = conn.prepare(&sql)?;
        let params_slice: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(&params_slice[..], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (author, count) = row?;
            counts.insert(author, count);
        }
        debug!(
            "Database: keyword '{}' matched {} authors",
            keyword,
            counts.len()
        );
        Ok(counts)
    }

    pub fn channel_message_count(&self, channel_id: &str) -> anyhow::Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
            [channel_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// One author's full history, newest first. Used by the JSONL export.
    pub fn messages_by_author(&self, author_name: &str) -> anyhow::Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT discord_id, channel_id, author_id, author_name, content, created_at
             FROM messages WHERE author_name = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([author_name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (message_id, channel_id, author_id, author_name, content, created_at) = row?;
            records.push(MessageRecord {
                message_id,
                channel_id,
                author_id,
                author_name,
                content,
                created_at: parse_sqlite_utc(&created_at).unwrap_or_else(Utc::now),
            });
        }
        Ok(records)
    }
}

fn parse_sqlite_utc(ts: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(ts, SQLITE_DATETIME).ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let config = Config::for_tests();
        let db = Database::new(&config).unwrap();
        db.execute_init().unwrap();
        db
    }

    fn record(id: &str, channel: &str, author: &str, content: &str) -> MessageRecord {
        MessageRecord {
            message_id: id.to_string(),
            channel_id: channel.to_string(),
            author_id: format!("{author}-id"),
            author_name: author.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn append_and_existing_ids() {
        let db = test_db();
        db.append_batch(&[record("1", "c1", "A", "hi"), record("2", "c1", "B", "yo")])
            .unwrap();
        db.append_batch(&[record("3", "c2", "A", "elsewhere")])
            .unwrap();

        let ids = db.existing_ids("c1").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1"));
        assert!(ids.contains("2"));
        assert!(!ids.contains("3"));
        assert_eq!(db.channel_message_count("c1").unwrap(), 2);
    }

    #[test]
    fn batch_is_atomic_on_failure() {
        let db = test_db();
        db.append_batch(&[record("dup", "c1", "A", "first")]).unwrap();

        // 1000 fresh records with a duplicate id buried in the middle. The
        // UNIQUE violation must roll back every record in the batch.
        let mut batch: Vec<MessageRecord> = (0..1000)
            .map(|i| record(&format!("m{i}"), "c1", "A", "body"))
            .collect();
        batch[500] = record("dup", "c1", "A", "collides");

        assert!(db.append_batch(&batch).is_err());
        assert_eq!(db.channel_message_count("c1").unwrap(), 1);
        assert!(!db.existing_ids("c1").unwrap().contains("m0"));
    }

    #[test]
    fn search_is_case_insensitive() {
        let db = test_db();
        db.append_batch(&[
            record("1", "c1", "A", "hello world"),
            record("2", "c1", "B", "say hello"),
            record("3", "c1", "A", "bye"),
        ])
        .unwrap();

        let counts = db.search_keyword("hello", None).unwrap();
        assert_eq!(counts.get("A"), Some(&1));
        assert_eq!(counts.get("B"), Some(&1));
        assert_eq!(counts.len(), 2);

        let upper = db.search_keyword("HELLO", None).unwrap();
        assert_eq!(upper, counts);
    }

    #[test]
    fn search_respects_channel_filter() {
        let db = test_db();
        db.append_batch(&[
            record("1", "c1", "A", "target here"),
            record("2", "c2", "B", "target there"),
        ])
        .unwrap();

        let all = db.search_keyword("target", None).unwrap();
        assert_eq!(all.len(), 2);

        let only_c1 = db
            .search_keyword("target", Some(&["c1".to_string()]))
            .unwrap();
        assert_eq!(only_c1.len(), 1);
        assert_eq!(only_c1.get("A"), Some(&1));
    }

    #[test]
    fn search_with_like_wildcards_in_keyword() {
        let db = test_db();
        db.append_batch(&[
            record("1", "c1", "A", "literal 100% sure"),
            record("2", "c1", "B", "nothing relevant"),
        ])
        .unwrap();

        let counts = db.search_keyword("100%", None).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("A"), Some(&1));
    }

    #[test]
    fn messages_by_author_newest_first() {
        let db = test_db();
        let mut older = record("1", "c1", "A", "older");
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        let newer = record("2", "c1", "A", "newer");
        db.append_batch(&[older, newer]).unwrap();

        let history = db.messages_by_author("A").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "newer");
        assert_eq!(history[1].content, "older");
        assert!(db.messages_by_author("B").unwrap().is_empty());
    }
}
