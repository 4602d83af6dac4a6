//! `dpm versions`/`dpm version`: read-only introspection of the installed
//! SDK manifests cache and the linked assistant binary.

use anyhow::{Context, Result};
use dpm_sdk::install_driver::linked_assistant_version;

use super::Context as AppContext;

pub fn list(ctx: &AppContext) -> Result<()> {
    let dir = ctx.config.home.sdk_manifests_dir_for(ctx.config.edition);
    let linked = linked_assistant_version(&ctx.config.home.assistant_link_path());

    let mut versions = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))? {
            let entry = entry?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                versions.push(name.to_string());
            }
        }
    }
    versions.sort();

    if versions.is_empty() {
        println!("no SDK versions installed for edition {}", ctx.config.edition);
        return Ok(());
    }

    for version in versions {
        let marker = match &linked {
            Some(v) if v.to_string() == version => " (linked)",
            _ => "",
        };
        println!("{version}{marker}");
    }
    Ok(())
}

pub fn current(ctx: &AppContext) -> Result<()> {
    match linked_assistant_version(&ctx.config.home.assistant_link_path()) {
        Some(version) => println!("{version}"),
        None => println!("no assistant is linked at {}", ctx.config.home.assistant_link_path().display()),
    }
    Ok(())
}
