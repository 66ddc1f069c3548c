use crate::db::Database;
use crate::source::MessageRecord;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One prompt/completion pair in the JSONL training format.
#[derive(Debug, Serialize, PartialEq)]
pub struct TrainingPair {
    pub prompt: String,
    pub completion: String,
}

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

/// Filters out bodies that carry no trainable text: whitespace-only content
/// and bare image links.
pub fn is_valid_content(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return false;
    }
    for word in trimmed.split_whitespace() {
        if !(word.starts_with("http://") || word.starts_with("https://")) {
            continue;
        }
        let lower = word.to_lowercase();
        if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return false;
        }
    }
    true
}

pub fn format_for_training(messages: &[MessageRecord]) -> Vec<TrainingPair> {
    messages
        .iter()
        .filter(|m| is_valid_content(&m.content))
        .map(|m| TrainingPair {
            prompt: format!("{}: ", m.author_name),
            completion: format!("{}\n", m.content),
        })
        .collect()
}

/// Dumps one author's message history (newest first) as JSONL. Returns the
/// number of pairs written.
pub async fn export_author_history(
    db: &Database,
    author_name: &str,
    output: &Path,
) -> anyhow::Result<usize> {
    let author = author_name.to_string();
    let messages = db
        .run_blocking(move |db| db.messages_by_author(&author))
        .await?;

    let pairs = format_for_training(&messages);
    let mut out = String::with_capacity(pairs.len() * 64);
    for pair in &pairs {
        out.push_str(&serde_json::to_string(pair)?);
        out.push('\n');
    }
    std::fs::write(output, out)?;

    info!(
        "Export: wrote {} messages for {} to {}",
        pairs.len(),
        author_name,
        output.display()
    );
    Ok(pairs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(content: &str) -> MessageRecord {
        MessageRecord {
            message_id: "1".to_string(),
            channel_id: "c1".to_string(),
            author_id: "a1".to_string(),
            author_name: "alice".to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_empty_and_image_links() {
        assert!(!is_valid_content(""));
        assert!(!is_valid_content("   \n"));
        assert!(!is_valid_content("https://cdn.example.com/cat.PNG"));
        assert!(!is_valid_content("look https://x.test/a.gif"));
        assert!(is_valid_content("plain text"));
        assert!(is_valid_content("a link https://example.com/page"));
    }

    #[test]
    fn formats_prompt_completion_pairs() {
        let messages = vec![record("hello there"), record("  "), record("second")];
        let pairs = format_for_training(&messages);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].prompt, "alice: ");
        assert_eq!(pairs[0].completion, "hello there\n");
        assert_eq!(pairs[1].completion, "second\n");
    }
}
