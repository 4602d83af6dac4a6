//! `dpm uninstall`: removes a cached SDK manifest (spec "On-disk
//! layout", `cache/sdk/<edition>/<version>.yaml`). Materialized
//! component directories under `cache/components` are left alone since
//! other installed SDK versions may still reference them.

use anyhow::{Context, Result, bail};

use super::Context as AppContext;
use crate::cli::UninstallArgs;

pub fn run(ctx: &AppContext, args: UninstallArgs) -> Result<()> {
    let path = ctx.config.home.sdk_manifest_path(ctx.config.edition, &args.version);
    if !path.is_file() {
        bail!(
            "sdk {version} ({edition}) is not installed (no manifest at {path})",
            version = args.version,
            edition = ctx.config.edition,
            path = path.display(),
        );
    }
    std::fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
    println!("uninstalled dpm sdk {} ({})", args.version, ctx.config.edition);
    Ok(())
}
