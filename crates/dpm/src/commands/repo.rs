//! `dpm repo`: thin read-only introspection over the Registry Client's
//! `list-tags` primitive (spec 4.A).

use anyhow::{Context, Result};

use super::Context as AppContext;
use crate::cli::RepoCommand;

pub async fn run(ctx: &AppContext, cmd: RepoCommand) -> Result<()> {
    match cmd {
        RepoCommand::ListTags(repo) => {
            let client = ctx.registry_client()?;
            let tags = client
                .list_tags(&repo)
                .await
                .with_context(|| format!("failed to list tags for {repo:?}"))?;
            if tags.is_empty() {
                println!("no tags published under {repo}");
            } else {
                for tag in tags {
                    println!("{tag}");
                }
            }
            Ok(())
        }
    }
}
