use crate::db::Database;
use std::collections::HashMap;
use tracing::info;

/// Stateless keyword analytics over the message store. Crawling and searching
/// are independent; this only reads.
pub struct KeywordSearch {
    db: Database,
}

impl KeywordSearch {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Per-author occurrence counts for every keyword, case-insensitive
    /// substring semantics. `channel_ids` restricts the search when given.
    pub async fn search(
        &self,
        keywords: &[String],
        channel_ids: Option<Vec<String>>,
    ) -> anyhow::Result<HashMap<String, HashMap<String, u64>>> {
        let keywords = keywords.to_vec();
        let results = self
            .db
            .run_blocking(move |db| {
                let mut results = HashMap::new();
                for keyword in keywords {
                    let counts = db.search_keyword(&keyword, channel_ids.as_deref())?;
                    results.insert(keyword, counts);
                }
                Ok(results)
            })
            .await?;
        info!("Search: analyzed {} keywords", results.len());
        Ok(results)
    }
}

/// Top `k` authors by count, descending. Ties break by author name so the
/// ordering is deterministic.
pub fn top_authors(counts: &HashMap<String, u64>, k: usize) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts
        .iter()
        .map(|(author, count)| (author.clone(), *count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
