mod component;
mod install;
mod login;
mod repo;
mod resolve;
mod uninstall;
mod versions;

use anyhow::{Context, Result};
use dpm_core::Platform;
use dpm_registry::client::RegistryClient;
use dpm_registry::transport::HttpTransport;
use dpm_sdk::config::DpmConfig;

use crate::cli::{Command, DpmCli};

/// Everything a subcommand needs that isn't specific to its own
/// arguments: the loaded configuration and the host platform a bare
/// `--platform` flag defaults to.
pub struct Context {
    pub config: DpmConfig,
    pub platform: Platform,
}

impl Context {
    fn load() -> Result<Self> {
        let config = DpmConfig::load().context("failed to load dpm configuration")?;
        config.home.ensure_dirs().context("failed to create <home> directories")?;
        Ok(Self {
            config,
            platform: Platform::host(),
        })
    }

    /// A fresh `RegistryClient` over this context's configured registry.
    /// Each caller that needs one gets its own: `RegistryClient` isn't
    /// `Clone` (it owns its transport's connection pool), and the
    /// objects that borrow one (`ComponentPuller`, `InstallDriver`,
    /// `Locker`) only ever need it for the lifetime of one subcommand.
    fn registry_client(&self) -> Result<RegistryClient<HttpTransport>> {
        RegistryClient::http(&self.config.registry, self.config.home.oci_layout_dir())
            .context("failed to construct the registry client")
    }
}

pub fn parse_platform(value: &str) -> Result<Platform> {
    let (os, architecture) = value
        .split_once('/')
        .with_context(|| format!("platform {value:?} must be formatted as 'os/arch', e.g. 'linux/amd64'"))?;
    Ok(Platform {
        os: os.to_string(),
        architecture: architecture.to_string(),
    })
}

pub async fn dispatch(cli: DpmCli) -> Result<()> {
    let ctx = Context::load()?;

    match cli.command {
        Command::Resolve(args) => resolve::run(&ctx, args).await,
        Command::Install(args) => install::install(&ctx, args).await,
        Command::Bootstrap(args) => install::bootstrap(&ctx, args).await,
        Command::Update(args) => install::update(&ctx, args).await,
        Command::Uninstall(args) => uninstall::run(&ctx, args),
        Command::Versions => versions::list(&ctx),
        Command::Version => versions::current(&ctx),
        Command::Component(cmd) => component::run(&ctx, cmd).await,
        Command::Repo(cmd) => repo::run(&ctx, cmd).await,
        Command::Login => login::run(&ctx),
    }
}
