//! `dpm login`: credential stores and token caching are an explicit
//! out-of-scope external collaborator (spec section 1); the core only
//! ever reads whatever `DPM_REGISTRY_AUTH` points at (spec section 6).
//! This command just explains that rather than implementing a token
//! flow of its own.

use anyhow::Result;

use super::Context as AppContext;

pub fn run(ctx: &AppContext) -> Result<()> {
    match &ctx.config.registry.auth_file {
        Some(path) => println!("using credentials from {} (DPM_REGISTRY_AUTH)", path.display()),
        None => println!(
            "no DPM_REGISTRY_AUTH is configured; falling back to the host container tooling's own credential store"
        ),
    }
    Ok(())
}
