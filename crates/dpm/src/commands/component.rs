//! `dpm component`: operates on a single component directly (spec 4.C),
//! bypassing the Assembly Plan entirely. Useful for pre-warming the cache
//! or inspecting what's materialized.

use anyhow::{Context, Result};
use dpm_sdk::assembler::component_repo;
use dpm_sdk::puller::ComponentPuller;
use tokio_util::sync::CancellationToken;

use super::{Context as AppContext, parse_platform};
use crate::cli::{ComponentCommand, ComponentPullArgs};

pub async fn run(ctx: &AppContext, cmd: ComponentCommand) -> Result<()> {
    match cmd {
        ComponentCommand::Pull(args) => pull(ctx, args).await,
        ComponentCommand::List => list(ctx),
    }
}

async fn pull(ctx: &AppContext, args: ComponentPullArgs) -> Result<()> {
    let platform = args.platform.as_deref().map(parse_platform).transpose()?.unwrap_or_else(|| ctx.platform.clone());
    let cancel = CancellationToken::new();

    let registry = ctx.registry_client()?;
    // An explicit `component pull` is the user asking for it directly,
    // so it bypasses the auto-install gate that guards implicit pulls
    // during assembly.
    let puller = ComponentPuller::new(registry, ctx.config.home.components_dir(), true);

    let repo = component_repo(&args.name);
    let dest = puller
        .pull(&repo, &args.name, &args.reference, &platform, &cancel)
        .await
        .with_context(|| format!("failed to pull component {:?}@{:?}", args.name, args.reference))?;

    println!("pulled {} into {}", args.name, dest.display());
    Ok(())
}

fn list(ctx: &AppContext) -> Result<()> {
    let dir = ctx.config.home.components_dir();
    if !dir.is_dir() {
        println!("no components cached");
        return Ok(());
    }

    let mut found = false;
    for name_entry in std::fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let name_entry = name_entry?;
        if !name_entry.file_type()?.is_dir() {
            continue;
        }
        let name = name_entry.file_name().to_string_lossy().to_string();
        for version_entry in std::fs::read_dir(name_entry.path())? {
            let version_entry = version_entry?;
            let version = version_entry.file_name().to_string_lossy().to_string();
            println!("{name}@{version}");
            found = true;
        }
    }
    if !found {
        println!("no components cached");
    }
    Ok(())
}
