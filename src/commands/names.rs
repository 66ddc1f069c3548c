use crate::{Context, Error};

/// Map a username to a display name for keyword result output
#[poise::command(slash_command, prefix_command)]
pub async fn names(
    ctx: Context<'_>,
    #[description = "Username as stored at index time"] username: String,
    #[description = "Display name to show instead; omit to look up"] display_name: Option<String>,
) -> Result<(), Error> {
    let cache = &ctx.data().name_cache;
    match display_name {
        Some(display) => {
            cache.update(&username, &display);
            cache.save()?;
            ctx.say(format!("Mapped `{username}` to `{display}`.")).await?;
        }
        None => {
            ctx.say(format!(
                "`{username}` is shown as `{}`.",
                cache.display_name(&username)
            ))
            .await?;
        }
    }
    Ok(())
}
