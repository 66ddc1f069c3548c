use crate::export::export_author_history;
use crate::{Context, Error};
use std::path::Path;

/// Export one author's indexed messages as JSONL training data
#[poise::command(slash_command, prefix_command, owners_only)]
pub async fn export(
    ctx: Context<'_>,
    #[description = "Author name whose history to export"] author: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let safe: String = author
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let filename = format!("{safe}_history.jsonl");

    let written = export_author_history(&ctx.data().db, &author, Path::new(&filename)).await?;
    if written == 0 {
        ctx.say(format!("No exportable messages found for `{author}`."))
            .await?;
    } else {
        ctx.say(format!(
            "Exported {written} messages for `{author}` to `{filename}`."
        ))
        .await?;
    }
    Ok(())
}
