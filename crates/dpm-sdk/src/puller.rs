//! Component Puller (spec 4.C): turns a [`RegistryClient::pull`] result
//! into files on disk under `<home>/cache/components/<name>/<version>/`,
//! applying each layer's `file-name`/`file-mode`/`file-mtime`
//! annotations. Grounded on
//! `examples/original_source/pkg/ocipuller/puller.go` and
//! `examples/original_source/pkg/utils/fileinfo/fileinfo.go`.

use std::path::{Path, PathBuf};

use dpm_core::Platform;
use dpm_registry::client::{PulledLayer, RegistryClient};
use dpm_registry::transport::{HttpTransport, RegistryTransport};
use dpm_registry_types::{annotations, parse_file_mode, parse_file_mtime, InvalidFileMode};
use thiserror::Error;
use time::error::Parse as TimeParseError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum PullError {
    #[error(transparent)]
    Registry(#[from] dpm_registry::error::RegistryError),
    #[error("component {repo}:{reference} is not cached locally and auto-install is disabled")]
    AutoInstallDisabled { repo: String, reference: String },
    #[error("layer in {repo}:{reference} is missing the {key:?} annotation")]
    MissingAnnotation {
        repo: String,
        reference: String,
        key: &'static str,
    },
    #[error(transparent)]
    InvalidFileMode(#[from] InvalidFileMode),
    #[error("invalid file-mtime annotation: {0}")]
    InvalidFileMtime(#[from] TimeParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Pulls components (and, via the same client, SDK manifests and
/// dependency artifacts) into a content-addressed local layout, skipping
/// the registry entirely when the destination is already populated.
pub struct ComponentPuller<T: RegistryTransport = HttpTransport> {
    client: RegistryClient<T>,
    components_dir: PathBuf,
    auto_install: bool,
}

impl<T: RegistryTransport> ComponentPuller<T> {
    pub fn new(client: RegistryClient<T>, components_dir: PathBuf, auto_install: bool) -> Self {
        Self {
            client,
            components_dir,
            auto_install,
        }
    }

    fn dest_dir(&self, name: &str, version: &str) -> PathBuf {
        self.components_dir.join(name).join(version)
    }

    /// Ensure `repo:reference`'s platform manifest is materialized on
    /// disk for `platform`, pulling it if missing. Returns the directory
    /// its files were written into.
    #[instrument(skip(self, cancel), fields(repo, reference))]
    pub async fn pull(
        &self,
        repo: &str,
        name: &str,
        reference: &str,
        platform: &Platform,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PullError> {
        let dest = self.dest_dir(name, reference);
        if dest.is_dir() && dest.read_dir()?.next().is_some() {
            debug!(?dest, "component already cached");
            return Ok(dest);
        }

        if !self.auto_install {
            return Err(PullError::AutoInstallDisabled {
                repo: repo.to_string(),
                reference: reference.to_string(),
            });
        }

        let pulled = self.client.pull(repo, reference, platform, cancel).await?;
        std::fs::create_dir_all(&dest)?;
        for layer in &pulled.layers {
            self.materialize_layer(repo, reference, layer, &dest)?;
        }
        Ok(dest)
    }

    fn materialize_layer(
        &self,
        repo: &str,
        reference: &str,
        layer: &PulledLayer,
        dest_dir: &Path,
    ) -> Result<(), PullError> {
        let file_name = layer
            .annotations
            .get(annotations::FILE_NAME)
            .ok_or_else(|| PullError::MissingAnnotation {
                repo: repo.to_string(),
                reference: reference.to_string(),
                key: annotations::FILE_NAME,
            })?;
        let mode_raw = layer
            .annotations
            .get(annotations::FILE_MODE)
            .ok_or_else(|| PullError::MissingAnnotation {
                repo: repo.to_string(),
                reference: reference.to_string(),
                key: annotations::FILE_MODE,
            })?;
        let mtime_raw = layer
            .annotations
            .get(annotations::FILE_MTIME)
            .ok_or_else(|| PullError::MissingAnnotation {
                repo: repo.to_string(),
                reference: reference.to_string(),
                key: annotations::FILE_MTIME,
            })?;

        let mode = parse_file_mode(mode_raw)?;
        let mtime = parse_file_mtime(mtime_raw)?;

        let target = dest_dir.join(file_name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&layer.blob_path, &target)?;
        apply_file_info(&target, mode, mtime)?;
        Ok(())
    }
}

#[cfg(unix)]
fn apply_file_info(path: &Path, mode: u32, mtime: time::OffsetDateTime) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    let unix_time = mtime.unix_timestamp();
    let when = filetime::FileTime::from_unix_time(unix_time, mtime.nanosecond());
    filetime::set_file_mtime(path, when)
}

#[cfg(not(unix))]
fn apply_file_info(path: &Path, _mode: u32, mtime: time::OffsetDateTime) -> std::io::Result<()> {
    let unix_time = mtime.unix_timestamp();
    let when = filetime::FileTime::from_unix_time(unix_time, mtime.nanosecond());
    filetime::set_file_mtime(path, when)
}
