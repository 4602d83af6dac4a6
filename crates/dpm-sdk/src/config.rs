//! Layered configuration: built-in defaults, overridden by
//! `<home>/dpm-config.yaml`, overridden by environment variables (spec
//! section 6, "Configuration"). Grounded on the `config` crate usage in
//! `examples/flox-flox/crates/flox-cli/src/config/mod.rs` and
//! `examples/original_source/pkg/assistantconfig/config.go`'s env var
//! precedence.

use std::path::PathBuf;

use config::{Config as LayeredConfig, Environment, File, FileFormat};
use dpm_core::Edition;
use serde::Deserialize;
use thiserror::Error;

use crate::home::{Home, HomeError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Home(#[from] HomeError),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// The assembled runtime configuration every other dpm-sdk component is
/// constructed from.
#[derive(Debug, Clone)]
pub struct DpmConfig {
    pub home: Home,
    /// Whether a missing SDK version may be installed automatically
    /// rather than erroring (`DPM_AUTO_INSTALL`).
    pub auto_install: bool,
    /// Whether the Deep Resolver ensures/checks a package's lockfile
    /// (`DPM_LOCKFILES_ENABLED`). Defaults to enabled.
    pub lockfiles_enabled: bool,
    pub edition: Edition,
    pub registry: dpm_registry::RegistryConfig,
}

/// Shape of the fields `dpm-config.yaml` and the environment may set;
/// mirrors `DpmConfig` but with everything optional so layering can fill
/// in gaps from defaults.
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    auto_install: Option<bool>,
    #[serde(default)]
    lockfiles_enabled: Option<bool>,
    #[serde(default)]
    edition: Option<Edition>,
    #[serde(default)]
    registry: Option<String>,
    #[serde(default)]
    insecure_registry: Option<bool>,
    #[serde(default)]
    registry_auth: Option<PathBuf>,
}

impl DpmConfig {
    /// Resolve `<home>` per spec section 6, then load configuration
    /// layered under it.
    pub fn load() -> Result<Self, ConfigError> {
        let home = Home::resolve()?;
        Self::load_with_home(home)
    }

    /// Load configuration for an already-resolved `<home>`, useful for
    /// tests pointing at a temp directory.
    pub fn load_with_home(home: Home) -> Result<Self, ConfigError> {
        let mut builder = LayeredConfig::builder()
            .set_default("auto_install", false)?
            .set_default("lockfiles_enabled", true)?
            .set_default("edition", Edition::default().to_string())?;

        let config_path = home.config_path();
        if config_path.exists() {
            builder = builder.add_source(File::new(
                config_path.to_string_lossy().as_ref(),
                FileFormat::Yaml,
            ));
        }

        builder = builder.add_source(Environment::with_prefix("DPM").try_parsing(true));

        let raw: RawConfig = builder.build()?.try_deserialize()?;

        let mut registry = dpm_registry::RegistryConfig::default();
        if let Some(endpoint) = raw.registry {
            registry.endpoint = endpoint;
        }
        if let Some(insecure) = raw.insecure_registry {
            registry.insecure = insecure;
        }
        if let Some(auth_file) = raw.registry_auth {
            registry.auth_file = Some(auth_file);
        }

        Ok(Self {
            home,
            auto_install: raw.auto_install.unwrap_or(false),
            lockfiles_enabled: raw.lockfiles_enabled.unwrap_or(true),
            edition: raw.edition.unwrap_or_default(),
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_file_and_no_env() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path());
        let config = DpmConfig::load_with_home(home).unwrap();
        assert!(!config.auto_install);
        assert_eq!(config.edition, Edition::OpenSource);
        assert_eq!(config.registry.endpoint, dpm_registry::DEFAULT_REGISTRY_ENDPOINT);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path());
        std::fs::write(
            home.config_path(),
            "auto_install: true\nedition: enterprise\n",
        )
        .unwrap();
        let config = DpmConfig::load_with_home(home).unwrap();
        assert!(config.auto_install);
        assert_eq!(config.edition, Edition::Enterprise);
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path());
        std::fs::write(home.config_path(), "auto_install: false\n").unwrap();

        temp_env::with_var("DPM_AUTO_INSTALL", Some("true"), || {
            let config = DpmConfig::load_with_home(home.clone()).unwrap();
            assert!(config.auto_install);
        });
    }
}
