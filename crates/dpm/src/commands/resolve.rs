//! `dpm resolve`: runs the Deep Resolver (spec 4.F) over the current
//! working directory and emits the Resolution document (spec 3).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dpm_sdk::assembler::Assembler;
use dpm_sdk::assembly_plan::AssemblyPlanBuilder;
use dpm_sdk::deep_resolver::DeepResolver;
use dpm_sdk::install_driver::InstallDriver;
use dpm_sdk::puller::ComponentPuller;
use tokio_util::sync::CancellationToken;

use super::Context as AppContext;
use crate::cli::ResolveArgs;

pub async fn run(ctx: &AppContext, args: ResolveArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    let cancel = CancellationToken::new();

    let puller_registry = ctx.registry_client()?;
    let puller = ComponentPuller::new(puller_registry, ctx.config.home.components_dir(), ctx.config.auto_install);

    let driver_registry = ctx.registry_client()?;
    let install_driver = InstallDriver::new(&ctx.config, &driver_registry, &puller);

    let plan_builder = AssemblyPlanBuilder::new(&ctx.config, Some(&install_driver));
    let assembler = Assembler::new(&puller, ctx.platform.clone());

    let locker_registry = ctx.registry_client()?;
    let resolver = DeepResolver::new(&ctx.config, &plan_builder, &assembler, &locker_registry);

    let resolution = resolver.run(&cwd, &cancel).await.context("deep resolution failed")?;

    let rendered = if args.json {
        serde_json::to_string_pretty(&resolution)?
    } else {
        serde_yaml::to_string(&resolution)?
    };

    let out_path = args.out.or_else(|| std::env::var_os("DPM_RESOLUTION_FILE").map(PathBuf::from));

    match out_path {
        Some(path) => {
            // `DPM_RESOLUTION_FILE` is created exclusively (spec 6): a
            // pre-existing file at that path is a caller bug, not
            // something we should silently overwrite.
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .with_context(|| format!("{} must not already exist", path.display()))?;
            file.write_all(rendered.as_bytes())?;
        }
        None => {
            print!("{rendered}");
        }
    }

    let failed = resolution.packages.values().any(|p| !p.errors.is_empty());
    if failed {
        anyhow::bail!("one or more packages failed to resolve; see the errors in the resolution document above");
    }
    Ok(())
}
