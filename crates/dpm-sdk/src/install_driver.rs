//! Install Driver (spec 4.I): given a user-supplied version reference
//! (strict semver or floating tag), resolves it against the edition's
//! SDK-manifest repository, caches the manifest, pulls every component it
//! names via the [`Assembler`], and (re)links the assistant binary.
//! Grounded on `examples/original_source/pkg/sdkinstall/install.go` together
//! with the teacher's environment-build entry point in
//! `flox-rust-sdk/src/models/environment/core_environment.rs`.

use std::path::{Path, PathBuf};

use dpm_core::{Platform, SemVer, write_atomically};
use dpm_manifest::sdk_manifest::{SdkManifest, SdkManifestError};
use dpm_registry::client::RegistryClient;
use dpm_registry::transport::{HttpTransport, RegistryTransport};
use dpm_registry_types::annotations;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::assembler::{AssembleError, Assembler, AssemblyOutput, ComponentLayer};
use crate::config::DpmConfig;
use crate::install_lock::{InstallLock, InstallLockError};
use crate::puller::ComponentPuller;

/// The single well-known file name an SDK manifest's index publishes its
/// one layer under.
pub const SDK_MANIFEST_BLOB_NAME: &str = "manifest.yaml";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Registry(#[from] dpm_registry::error::RegistryError),
    #[error("SDK manifest index for {reference:?} is missing the {key:?} annotation")]
    MissingAnnotation { reference: String, key: &'static str },
    #[error(transparent)]
    Manifest(#[from] SdkManifestError),
    #[error(
        "SDK manifest {version} is for edition {found}, but this installation is configured for {expected}"
    )]
    EditionMismatch {
        version: String,
        found: dpm_core::Edition,
        expected: dpm_core::Edition,
    },
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Lock(#[from] InstallLockError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Write(#[from] dpm_core::WriteError),
}

pub struct InstallResult {
    pub manifest: SdkManifest,
    pub assembly: AssemblyOutput,
    pub assistant_linked: bool,
}

pub struct InstallDriver<'a, T: RegistryTransport = HttpTransport> {
    config: &'a DpmConfig,
    registry: &'a RegistryClient<T>,
    puller: &'a ComponentPuller<T>,
}

impl<'a, T: RegistryTransport> InstallDriver<'a, T> {
    pub fn new(config: &'a DpmConfig, registry: &'a RegistryClient<T>, puller: &'a ComponentPuller<T>) -> Self {
        Self { config, registry, puller }
    }

    #[instrument(skip(self, cancel), fields(reference))]
    pub async fn install(
        &self,
        reference: &str,
        platform: &Platform,
        cancel: &CancellationToken,
    ) -> Result<InstallResult, InstallError> {
        let repo = self.config.edition.sdk_manifests_repo();

        let version = self.registry.resolve_tag(repo, reference, cancel).await?;

        let lock = InstallLock::new(self.config.home.install_lock_path());
        let (manifest, cached_path) = lock
            .with_lock(cancel, |_guard| async {
                self.pull_and_cache_manifest(repo, &version, cancel).await
            })
            .await??;

        if manifest.spec.edition != self.config.edition {
            return Err(InstallError::EditionMismatch {
                version: version.to_string(),
                found: manifest.spec.edition,
                expected: self.config.edition,
            });
        }

        let layer = ComponentLayer::new(
            cached_path.parent().unwrap_or(&cached_path),
            manifest.spec.components.clone(),
        );
        let assembler = Assembler::new(self.puller, platform.clone());
        let assembly = assembler
            .assemble(
                &[layer],
                Some(version.to_string()),
                manifest.spec.assistant.clone(),
                cancel,
            )
            .await?;

        let assistant_linked = if let Some(assistant_path) = &assembly.assistant_path {
            self.maybe_relink_assistant(assistant_path, &version)?
        } else {
            false
        };

        Ok(InstallResult {
            manifest,
            assembly,
            assistant_linked,
        })
    }

    async fn pull_and_cache_manifest(
        &self,
        repo: &str,
        version: &SemVer,
        cancel: &CancellationToken,
    ) -> Result<(SdkManifest, PathBuf), InstallError> {
        let cached_path = self.config.home.sdk_manifest_path(self.config.edition, &version.to_string());
        if cached_path.is_file() {
            let manifest = SdkManifest::read_from_file(&cached_path)?;
            return Ok((manifest, cached_path));
        }

        let platform = Platform::host();
        let pulled = self.registry.pull(repo, &version.to_string(), &platform, cancel).await?;
        let layer = pulled
            .layers
            .iter()
            .find(|layer| layer.annotations.get(annotations::FILE_NAME).map(String::as_str) == Some(SDK_MANIFEST_BLOB_NAME))
            .or_else(|| pulled.layers.first())
            .ok_or_else(|| InstallError::MissingAnnotation {
                reference: version.to_string(),
                key: annotations::FILE_NAME,
            })?;

        let contents = std::fs::read_to_string(&layer.blob_path)?;
        let manifest = SdkManifest::from_contents(&contents)?;

        if let Some(parent) = cached_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomically(&cached_path, contents.as_bytes())?;

        let mut manifest = manifest;
        manifest.absolute_path = Some(cached_path.clone());
        Ok((manifest, cached_path))
    }

    /// Create or replace `<home>/bin/dpm[.cmd]` if no assistant is
    /// currently linked or the linked one is older than `version` (spec
    /// 4.I step 5). Returns whether a link was (re)written.
    fn maybe_relink_assistant(&self, assistant_path: &Path, version: &SemVer) -> Result<bool, InstallError> {
        let link_path = self.config.home.assistant_link_path();
        let should_link = match linked_assistant_version(&link_path) {
            Some(current) => *version >= current,
            None => true,
        };
        if !should_link {
            return Ok(false);
        }

        if let Some(parent) = link_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if link_path.symlink_metadata().is_ok() {
            std::fs::remove_file(&link_path)?;
        }

        if cfg!(windows) {
            let script = format!(
                ":: version {version}\r\n@echo off\r\n\"{target}\" %*\r\n",
                target = assistant_path.display()
            );
            write_atomically(&link_path, script.as_bytes())?;
        } else {
            let relative_target = relative_path(link_path.parent().unwrap_or(Path::new("/")), assistant_path);
            symlink(&relative_target, &link_path)?;
        }

        info!(version = %version, path = %link_path.display(), "linked assistant");
        Ok(true)
    }
}

/// The version of the assistant binary currently linked at
/// `link_path`, decoded from the link's target path (POSIX) or its
/// wrapper script's version comment (Windows); `None` if nothing is
/// linked yet or its version can't be determined.
#[cfg(windows)]
pub fn linked_assistant_version(link_path: &Path) -> Option<SemVer> {
    let contents = std::fs::read_to_string(link_path).ok()?;
    let first_line = contents.lines().next()?;
    let version_str = first_line.strip_prefix(":: version ")?.trim();
    SemVer::parse(version_str).ok()
}

#[cfg(not(windows))]
pub fn linked_assistant_version(link_path: &Path) -> Option<SemVer> {
    let target = std::fs::read_link(link_path).ok()?;
    target
        .components()
        .find_map(|c| SemVer::parse(&c.as_os_str().to_string_lossy()).ok())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(_original: &Path, _link: &Path) -> std::io::Result<()> {
    unreachable!("only used on the POSIX link path")
}

/// Compute `to` expressed relative to `from_dir`, the way a relocatable
/// symlink needs it (spec 4.I: "a relative symlink, so the home
/// directory remains relocatable").
fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from_dir.components().collect();
    let to_components: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for component in &to_components[common..] {
        result.push(component.as_os_str());
    }
    result
}
