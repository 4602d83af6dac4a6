//! `dpm install`/`bootstrap`/`update`: all three funnel into the same
//! Install Driver (spec 4.I); they differ only in how the reference to
//! install is chosen.

use std::path::Path;

use anyhow::{Context, Result};
use dpm_manifest::package_descriptor::PackageDescriptor;
use dpm_sdk::assembly_plan::PACKAGE_DESCRIPTOR_FILENAME;
use dpm_sdk::install_driver::InstallDriver;
use dpm_sdk::puller::ComponentPuller;
use tokio_util::sync::CancellationToken;

use super::{Context as AppContext, parse_platform};
use crate::cli::{BootstrapArgs, InstallArgs, UpdateArgs};

const DEFAULT_FLOATING_TAG: &str = "latest";

pub async fn install(ctx: &AppContext, args: InstallArgs) -> Result<()> {
    let platform = args.platform.as_deref().map(parse_platform).transpose()?.unwrap_or_else(|| ctx.platform.clone());
    run_install(ctx, &args.reference, &platform).await
}

pub async fn bootstrap(ctx: &AppContext, args: BootstrapArgs) -> Result<()> {
    let platform = args.platform.as_deref().map(parse_platform).transpose()?.unwrap_or_else(|| ctx.platform.clone());
    let reference = declared_sdk_version()?
        .context("no package descriptor with a declared sdk-version was found in this directory or any ancestor")?;
    run_install(ctx, &reference, &platform).await
}

pub async fn update(ctx: &AppContext, args: UpdateArgs) -> Result<()> {
    let platform = args.platform.as_deref().map(parse_platform).transpose()?.unwrap_or_else(|| ctx.platform.clone());
    let reference = args.reference.unwrap_or_else(|| DEFAULT_FLOATING_TAG.to_string());
    run_install(ctx, &reference, &platform).await
}

async fn run_install(ctx: &AppContext, reference: &str, platform: &dpm_core::Platform) -> Result<()> {
    let cancel = CancellationToken::new();

    let puller_registry = ctx.registry_client()?;
    let puller = ComponentPuller::new(puller_registry, ctx.config.home.components_dir(), ctx.config.auto_install);

    let driver_registry = ctx.registry_client()?;
    let driver = InstallDriver::new(&ctx.config, &driver_registry, &puller);

    let result = driver
        .install(reference, platform, &cancel)
        .await
        .with_context(|| format!("failed to install {reference:?}"))?;

    println!(
        "installed dpm sdk {version} ({edition}) with {n} components",
        version = result.manifest.spec.version,
        edition = ctx.config.edition,
        n = result.assembly.shallow.components.len(),
    );
    if result.assistant_linked {
        println!(
            "linked assistant at {}",
            ctx.config.home.assistant_link_path().display(),
        );
    }
    Ok(())
}

/// Walk up from the current directory looking for a package descriptor
/// with a declared `sdk-version` (spec 4.E step 3).
fn declared_sdk_version() -> Result<Option<String>> {
    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    let mut dir: &Path = &cwd;
    loop {
        let candidate = dir.join(PACKAGE_DESCRIPTOR_FILENAME);
        if candidate.is_file() {
            let contents = std::fs::read_to_string(&candidate)
                .with_context(|| format!("failed to read {}", candidate.display()))?;
            let descriptor = PackageDescriptor::from_contents(&contents)
                .with_context(|| format!("failed to parse {}", candidate.display()))?;
            return Ok(descriptor.sdk_version);
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Ok(None),
        }
    }
}
