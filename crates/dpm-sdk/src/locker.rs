//! Lockfile Locker (spec 4.G): computes the lockfile a package's declared
//! dependencies expect, pins floating tags to concrete versions via the
//! registry, and either writes it (`Regular`/`Force`) or diffs it against
//! what's already on disk (`CheckOnly`). Grounded on
//! `examples/original_source/pkg/packagelock/locker.go`, adapted to this
//! crate's single-endpoint `RegistryClient` (dependency URIs naming a
//! different registry host than the configured endpoint are not
//! supported; see DESIGN.md).

use std::path::{Path, PathBuf};

use dpm_core::{Platform, path_hash};
use dpm_manifest::lockfile::{Dar, LOCKFILE_FILENAME, PackageLock, PackageLockError};
use dpm_manifest::package_descriptor::{PackageDescriptor, PackageDescriptorError, ResolvedDependency};
use dpm_registry::client::RegistryClient;
use dpm_registry::transport::{HttpTransport, RegistryTransport};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::assembly_plan::PACKAGE_DESCRIPTOR_FILENAME;
use crate::home::Home;

#[derive(Debug, Error)]
pub enum LockerError {
    #[error(transparent)]
    ReadPackageDescriptor(#[from] PackageDescriptorError),
    #[error("couldn't resolve one or more dependencies: {0:?}")]
    ResolveDependencies(Vec<PackageDescriptorError>),
    #[error(transparent)]
    Lock(#[from] PackageLockError),
    #[error("{path} needs to be updated; run the lock-refresh command", path = path.display())]
    OutOfSync { path: PathBuf },
    #[error("{path} does not exist", path = path.display())]
    Missing { path: PathBuf },
    #[error(transparent)]
    Registry(#[from] dpm_registry::error::RegistryError),
    #[error("dependency URI {0:?} is not a well-formed 'oci://host/repo:tag' reference")]
    MalformedDependencyUri(String),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Write(#[from] dpm_core::WriteError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Diff the expected lockfile against what's on disk; never writes,
    /// never pulls.
    CheckOnly,
    /// Compute the expected lockfile, pin floating tags via the registry
    /// (reusing pins an in-sync existing lockfile already has), and
    /// (re)write the file.
    Regular,
    /// `Regular`, but a corrupt existing lockfile is treated as absent
    /// rather than an error (spec 4.G open question).
    Force,
}

pub struct Locker<'a, T: RegistryTransport = HttpTransport> {
    home: &'a Home,
    registry: &'a RegistryClient<T>,
    mode: LockMode,
}

impl<'a, T: RegistryTransport> Locker<'a, T> {
    pub fn new(home: &'a Home, registry: &'a RegistryClient<T>, mode: LockMode) -> Self {
        Self { home, registry, mode }
    }

    #[instrument(skip(self, cancel), fields(mode = ?self.mode))]
    pub async fn ensure_lockfile(
        &self,
        package_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PackageLock, LockerError> {
        let descriptor = self.read_descriptor(package_dir)?;
        let lockfile_path = package_dir.join(LOCKFILE_FILENAME);
        let expected = expected_lockfile(&descriptor)?;

        match self.mode {
            LockMode::CheckOnly => self.check(&expected, &lockfile_path),
            LockMode::Regular => self.write(&expected, &lockfile_path, None, cancel).await,
            LockMode::Force => {
                let tolerated = PackageLock::read_from_file(&lockfile_path).ok();
                self.write(&expected, &lockfile_path, tolerated, cancel).await
            }
        }
    }

    fn read_descriptor(&self, package_dir: &Path) -> Result<PackageDescriptor, LockerError> {
        let contents = std::fs::read_to_string(package_dir.join(PACKAGE_DESCRIPTOR_FILENAME))?;
        Ok(PackageDescriptor::from_contents(&contents)?)
    }

    fn check(&self, expected: &PackageLock, lockfile_path: &Path) -> Result<PackageLock, LockerError> {
        let existing = match PackageLock::read_from_file(lockfile_path) {
            Ok(lock) => lock,
            Err(PackageLockError::Io(_)) => {
                return Err(LockerError::Missing { path: lockfile_path.to_path_buf() });
            }
            Err(e) => return Err(e.into()),
        };
        if existing.is_in_sync(expected)? {
            Ok(existing)
        } else {
            Err(LockerError::OutOfSync { path: lockfile_path.to_path_buf() })
        }
    }

    /// Reuse `existing`'s pins for any expected entry it already
    /// satisfies, resolving and pulling the rest.
    async fn write(
        &self,
        expected: &PackageLock,
        lockfile_path: &Path,
        existing: Option<PackageLock>,
        cancel: &CancellationToken,
    ) -> Result<PackageLock, LockerError> {
        let existing = existing.or_else(|| PackageLock::read_from_file(lockfile_path).ok());

        let mut dars = Vec::with_capacity(expected.dars.len());
        let mut errors = Vec::new();
        for dar in &expected.dars {
            let reused = existing
                .as_ref()
                .and_then(|lock| reusable_pin(lock, dar));
            let result = match reused {
                Some(pinned) => Ok(pinned),
                None => self.pin(dar, cancel).await,
            };
            match result {
                Ok(pinned) => dars.push(pinned),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            // Surface the first; the registry error itself doesn't
            // compose well across dependencies.
            return Err(errors.into_iter().next().unwrap());
        }
        dars.sort_by(|a, b| a.uri.cmp(&b.uri));

        let lock = PackageLock::new(dars);
        let yaml = serde_yaml::to_string(&lock)?;
        dpm_core::write_atomically(lockfile_path, yaml.as_bytes())?;
        Ok(lock)
    }

    async fn pin(&self, dar: &Dar, cancel: &CancellationToken) -> Result<Dar, LockerError> {
        if !dar.uri.starts_with("oci://") {
            // A builtin dependency: recorded with no digest and never pulled.
            return Ok(dar.clone());
        }

        let (repo, tag) = split_repo_and_tag(&dar.uri)?;
        let version = self.registry.resolve_tag(&repo, &tag, cancel).await?;
        let platform = Platform::host();
        let pulled = self.registry.pull(&repo, &version.to_string(), &platform, cancel).await?;

        let cache_key = path_hash(format!("{repo}:{version}"));
        let cache_path = self.home.dars_dir().join(&cache_key);
        let digest = if let Some(layer) = pulled.layers.first() {
            let bytes = std::fs::read(&layer.blob_path)?;
            if let Some(parent) = cache_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            dpm_core::write_atomically(&cache_path, &bytes)?;
            Some(layer.digest.clone())
        } else {
            None
        };

        Ok(Dar {
            uri: format!("oci://{repo}:{version}"),
            digest,
        })
    }
}

fn expected_lockfile(descriptor: &PackageDescriptor) -> Result<PackageLock, LockerError> {
    let resolved = descriptor.resolve_dependencies().map_err(LockerError::ResolveDependencies)?;
    let mut dars: Vec<Dar> = resolved
        .iter()
        .map(|(name, dep): (&String, &Option<ResolvedDependency>)| match dep {
            Some(dep) => Dar { uri: dep.full_url.to_string(), digest: None },
            None => Dar { uri: format!("builtin://{name}"), digest: None },
        })
        .collect();
    dars.sort_by(|a, b| a.uri.cmp(&b.uri));
    Ok(PackageLock::new(dars))
}

/// An existing lockfile entry satisfies `expected` either by an exact URI
/// match, or by pinning the same base repo with a concrete version where
/// `expected`'s tag is floating (spec "Lockfile bump" example). Builtin
/// entries (`builtin://<name>`) only ever match themselves exactly.
fn reusable_pin(existing: &PackageLock, expected: &Dar) -> Option<Dar> {
    if !expected.uri.starts_with("oci://") {
        return existing.dars.iter().find(|c| c.uri == expected.uri).cloned();
    }
    let (expected_repo, expected_tag) = split_repo_and_tag(&expected.uri).ok()?;
    for candidate in &existing.dars {
        let Ok((repo, tag)) = split_repo_and_tag(&candidate.uri) else {
            continue;
        };
        if repo != expected_repo {
            continue;
        }
        if tag == expected_tag {
            return Some(candidate.clone());
        }
        let expected_is_floating = semver::Version::parse(&expected_tag).is_err();
        let candidate_is_concrete = semver::Version::parse(&tag).is_ok();
        if expected_is_floating && candidate_is_concrete {
            return Some(candidate.clone());
        }
    }
    None
}

/// The local cache path a pinned lockfile entry's bytes were (or would
/// be) materialized to, derived from its own URI so callers don't need
/// to keep the pull result around. Builtin entries have no cached bytes.
pub fn dar_cache_path(home: &Home, uri: &str) -> Result<PathBuf, LockerError> {
    if !uri.starts_with("oci://") {
        return Ok(home.dars_dir().join(path_hash(uri)));
    }
    let (repo, tag) = split_repo_and_tag(uri)?;
    Ok(home.dars_dir().join(path_hash(format!("{repo}:{tag}"))))
}

/// Split `oci://host/repo/path:tag` into `(host/repo/path, tag)`.
fn split_repo_and_tag(uri: &str) -> Result<(String, String), LockerError> {
    let stripped = uri
        .strip_prefix("oci://")
        .ok_or_else(|| LockerError::MalformedDependencyUri(uri.to_string()))?;
    let (repo, tag) = stripped
        .rsplit_once(':')
        .ok_or_else(|| LockerError::MalformedDependencyUri(uri.to_string()))?;
    Ok((repo.to_string(), tag.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpm_registry::mock::MockTransport;
    use dpm_registry_types::{Descriptor, INDEX_MEDIA_TYPE, Index, MANIFEST_MEDIA_TYPE, Manifest};
    use std::collections::BTreeMap;

    fn seed_dependency(transport: &MockTransport, repo: &str, floating_tag: &str, version: &str) {
        let mut index_annotations = BTreeMap::new();
        index_annotations.insert("version".to_string(), version.to_string());
        transport.seed_index(
            repo,
            floating_tag,
            Index {
                schema_version: 2,
                media_type: INDEX_MEDIA_TYPE.to_string(),
                manifests: vec![Descriptor {
                    media_type: MANIFEST_MEDIA_TYPE.to_string(),
                    digest: "sha256:manifest".to_string(),
                    size: 1,
                    platform: None,
                    annotations: BTreeMap::new(),
                }],
                annotations: index_annotations,
            },
        );
        transport.seed_manifest(
            repo,
            "sha256:manifest",
            Manifest {
                schema_version: 2,
                media_type: MANIFEST_MEDIA_TYPE.to_string(),
                layers: vec![Descriptor {
                    media_type: "application/octet-stream".to_string(),
                    digest: "sha256:layer1".to_string(),
                    size: 3,
                    platform: None,
                    annotations: BTreeMap::new(),
                }],
                annotations: BTreeMap::new(),
            },
        );
        transport.seed_blob(repo, "sha256:layer1", b"dar-bytes".to_vec());
    }

    fn package_with_dependency(dir: &Path, dependency: &str) {
        std::fs::write(
            dir.join(PACKAGE_DESCRIPTOR_FILENAME),
            format!(
                "artifact-locations:\n  default:\n    url: oci://registry.example.com/pkgs\n    default: true\ndependencies:\n  - {dependency}\n"
            ),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn regular_mode_pins_a_floating_tag_and_writes_the_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path().join("home"));
        let transport = MockTransport::new();
        seed_dependency(&transport, "pkgs/foo", "latest", "1.0.0");
        let client = RegistryClient::new(transport, home.oci_layout_dir());

        package_with_dependency(dir.path(), "foo:latest");

        let locker = Locker::new(&home, &client, LockMode::Regular);
        let lock = locker.ensure_lockfile(dir.path(), &CancellationToken::new()).await.unwrap();

        assert_eq!(lock.dars.len(), 1);
        assert_eq!(lock.dars[0].uri, "oci://registry.example.com/pkgs/foo:1.0.0");
        assert!(lock.dars[0].digest.is_some());
        assert!(dir.path().join(LOCKFILE_FILENAME).is_file());
    }

    #[tokio::test]
    async fn regular_mode_reuses_an_existing_concrete_pin_without_a_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path().join("home"));
        // No dependency seeded: a network resolve would fail outright.
        let transport = MockTransport::new();
        let client = RegistryClient::new(transport, home.oci_layout_dir());

        package_with_dependency(dir.path(), "foo:latest");
        std::fs::write(
            dir.path().join(LOCKFILE_FILENAME),
            "dars:\n  - uri: oci://registry.example.com/pkgs/foo:1.2.3\n    digest: blake3:deadbeef\n",
        )
        .unwrap();

        let locker = Locker::new(&home, &client, LockMode::Regular);
        let lock = locker.ensure_lockfile(dir.path(), &CancellationToken::new()).await.unwrap();

        assert_eq!(lock.dars[0].uri, "oci://registry.example.com/pkgs/foo:1.2.3");
        assert_eq!(lock.dars[0].digest.as_deref(), Some("blake3:deadbeef"));
    }

    #[tokio::test]
    async fn check_only_reports_out_of_sync_for_a_removed_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path().join("home"));
        let transport = MockTransport::new();
        let client = RegistryClient::new(transport, home.oci_layout_dir());

        package_with_dependency(dir.path(), "foo:latest");
        std::fs::write(
            dir.path().join(LOCKFILE_FILENAME),
            "dars:\n  - uri: oci://registry.example.com/pkgs/bar:1.0.0\n",
        )
        .unwrap();

        let locker = Locker::new(&home, &client, LockMode::CheckOnly);
        let err = locker
            .ensure_lockfile(dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LockerError::OutOfSync { .. }));
    }

    #[tokio::test]
    async fn check_only_reports_missing_when_no_lockfile_exists() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path().join("home"));
        let transport = MockTransport::new();
        let client = RegistryClient::new(transport, home.oci_layout_dir());

        package_with_dependency(dir.path(), "foo:latest");

        let locker = Locker::new(&home, &client, LockMode::CheckOnly);
        let err = locker
            .ensure_lockfile(dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LockerError::Missing { .. }));
    }
}
