//! `RegistryClient`: the three primitives spec 4.A names (`pull`, `push`,
//! `list-tags`) layered over a [`RegistryTransport`] and a local
//! content-addressed blob cache under `<home>/cache/oci-layout/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dpm_core::{Platform, SemVer};
use dpm_registry_types::Descriptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::RegistryError;
use crate::transport::{HttpTransport, PushLayer, RegistryTransport};

/// One selected platform-manifest's worth of layers, each backed by a file
/// already present in the local blob cache.
#[derive(Debug)]
pub struct PulledManifest {
    /// The index's `version` annotation, if resolvable. `None` for indexes
    /// published before that annotation was required.
    pub version: Option<SemVer>,
    pub layers: Vec<PulledLayer>,
}

#[derive(Debug)]
pub struct PulledLayer {
    /// The descriptor's own content digest, `"<algo>:<hex>"` (e.g.
    /// `sha256:...`), as returned by the registry — not recomputed locally.
    pub digest: String,
    pub annotations: BTreeMap<String, String>,
    /// Absolute path to this layer's bytes inside the local blob cache.
    pub blob_path: PathBuf,
}

pub struct RegistryClient<T: RegistryTransport = HttpTransport> {
    transport: T,
    blob_cache_dir: PathBuf,
}

impl RegistryClient<HttpTransport> {
    pub fn http(config: &crate::config::RegistryConfig, blob_cache_dir: PathBuf) -> Result<Self, RegistryError> {
        let transport = HttpTransport::new(config)
            .map_err(|source| RegistryError::FetchIndex {
                repo: String::new(),
                reference: String::new(),
                source,
            })?;
        Ok(Self {
            transport,
            blob_cache_dir,
        })
    }
}

impl<T: RegistryTransport> RegistryClient<T> {
    pub fn new(transport: T, blob_cache_dir: PathBuf) -> Self {
        Self {
            transport,
            blob_cache_dir,
        }
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.blob_cache_dir.join(digest.replace(':', "_"))
    }

    /// Fetch and materialize into the local blob cache every layer of the
    /// manifest selected for `platform` out of `repo:reference`'s index.
    /// Returns cache-local paths the caller (the Component Puller) is
    /// responsible for unpacking, applying file-mode/mtime fixups from
    /// each layer's annotations.
    #[instrument(skip(self, cancel), fields(repo, reference))]
    pub async fn pull(
        &self,
        repo: &str,
        reference: &str,
        platform: &Platform,
        cancel: &CancellationToken,
    ) -> Result<PulledManifest, RegistryError> {
        let index = self
            .transport
            .fetch_index(repo, reference, cancel)
            .await
            .map_err(|source| RegistryError::FetchIndex {
                repo: repo.to_string(),
                reference: reference.to_string(),
                source,
            })?;

        let descriptor =
            index
                .select_platform(platform)
                .map_err(|source| RegistryError::PlatformNotPresent {
                    repo: repo.to_string(),
                    reference: reference.to_string(),
                    source,
                })?;

        let manifest = self
            .transport
            .fetch_manifest(repo, &descriptor.digest, cancel)
            .await
            .map_err(|source| RegistryError::FetchManifest {
                repo: repo.to_string(),
                digest: descriptor.digest.clone(),
                source,
            })?;

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for layer in &manifest.layers {
            if cancel.is_cancelled() {
                return Err(RegistryError::Cancelled);
            }
            let path = self.ensure_blob_cached(repo, layer, cancel).await?;
            layers.push(PulledLayer {
                digest: layer.digest.clone(),
                annotations: layer.annotations.clone(),
                blob_path: path,
            });
        }

        let version = index.version_annotation(repo, reference).ok();
        debug!(layers = layers.len(), ?version, "pulled manifest");
        Ok(PulledManifest { version, layers })
    }

    async fn ensure_blob_cached(
        &self,
        repo: &str,
        descriptor: &Descriptor,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, RegistryError> {
        let path = self.blob_path(&descriptor.digest);
        if path.exists() {
            return Ok(path);
        }
        let blob = self
            .transport
            .fetch_blob(repo, &descriptor.digest, cancel)
            .await
            .map_err(|source| RegistryError::FetchBlob {
                repo: repo.to_string(),
                digest: descriptor.digest.clone(),
                source,
            })?;
        std::fs::create_dir_all(&self.blob_cache_dir)?;
        dpm_core::write_atomically(&path, &blob.bytes).map_err(|e| {
            RegistryError::Cache(std::io::Error::other(e.to_string()))
        })?;
        Ok(path)
    }

    /// Resolve `reference` to a strict semver. A reference that already
    /// parses as strict semver is returned unchanged without any network
    /// call (it is, by definition, not floating); anything else is
    /// resolved by fetching the index and reading its `version`
    /// annotation.
    pub async fn resolve_tag(
        &self,
        repo: &str,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<SemVer, RegistryError> {
        if let Ok(version) = SemVer::parse(reference) {
            return Ok(version);
        }
        let index = self
            .transport
            .fetch_index(repo, reference, cancel)
            .await
            .map_err(|source| RegistryError::FetchIndex {
                repo: repo.to_string(),
                reference: reference.to_string(),
                source,
            })?;
        index
            .version_annotation(repo, reference)
            .map_err(RegistryError::from)
    }

    pub async fn push(
        &self,
        repo: &str,
        tag: &str,
        layers: &[(PathBuf, BTreeMap<String, String>)],
        annotations: BTreeMap<String, String>,
    ) -> Result<Descriptor, RegistryError> {
        let push_layers: Vec<PushLayer> = layers
            .iter()
            .map(|(path, annotations)| PushLayer {
                path: path.clone(),
                annotations: annotations.clone(),
            })
            .collect();
        self.transport
            .push(repo, tag, &push_layers, annotations)
            .await
            .map_err(|source| RegistryError::Push {
                repo: repo.to_string(),
                tag: tag.to_string(),
                source,
            })
    }

    pub async fn list_tags(&self, repo: &str) -> Result<Vec<String>, RegistryError> {
        self.transport
            .list_tags(repo)
            .await
            .map_err(|source| RegistryError::ListTags {
                repo: repo.to_string(),
                source,
            })
    }
}

/// Returns the absolute path `<home>/cache/oci-layout` used as the default
/// blob cache directory.
pub fn default_blob_cache_dir(home: &Path) -> PathBuf {
    home.join("cache").join("oci-layout")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use dpm_registry_types::{Descriptor, Index, Manifest, INDEX_MEDIA_TYPE, MANIFEST_MEDIA_TYPE};

    use super::*;
    use crate::mock::MockTransport;

    fn linux_amd64() -> Platform {
        Platform {
            os: "linux".to_string(),
            architecture: "amd64".to_string(),
        }
    }

    fn seeded_client(dir: &Path) -> (RegistryClient<MockTransport>, ()) {
        let transport = MockTransport::new();

        let mut index_annotations = BTreeMap::new();
        index_annotations.insert("version".to_string(), "1.2.3".to_string());
        let manifest_descriptor = Descriptor {
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            digest: "sha256:manifest".to_string(),
            size: 1,
            platform: Some((&linux_amd64()).into()),
            annotations: BTreeMap::new(),
        };
        transport.seed_index(
            "meep",
            "latest",
            Index {
                schema_version: 2,
                media_type: INDEX_MEDIA_TYPE.to_string(),
                manifests: vec![manifest_descriptor],
                annotations: index_annotations,
            },
        );

        let mut layer_annotations = BTreeMap::new();
        layer_annotations.insert("file-name".to_string(), "bin/meep".to_string());
        layer_annotations.insert("file-mode".to_string(), "0755".to_string());
        layer_annotations.insert(
            "file-mtime".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        );
        transport.seed_manifest(
            "meep",
            "sha256:manifest",
            Manifest {
                schema_version: 2,
                media_type: MANIFEST_MEDIA_TYPE.to_string(),
                layers: vec![Descriptor {
                    media_type: "application/octet-stream".to_string(),
                    digest: "sha256:layer1".to_string(),
                    size: 3,
                    platform: None,
                    annotations: layer_annotations,
                }],
                annotations: BTreeMap::new(),
            },
        );
        transport.seed_blob("meep", "sha256:layer1", b"abc".to_vec());

        (RegistryClient::new(transport, dir.join("oci-layout")), ())
    }

    #[tokio::test]
    async fn pull_materializes_layers_into_the_blob_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = seeded_client(dir.path());
        let cancel = CancellationToken::new();

        let pulled = client
            .pull("meep", "latest", &linux_amd64(), &cancel)
            .await
            .unwrap();

        assert_eq!(pulled.version.unwrap().to_string(), "1.2.3");
        assert_eq!(pulled.layers.len(), 1);
        let layer = &pulled.layers[0];
        assert!(layer.blob_path.exists());
        assert_eq!(std::fs::read(&layer.blob_path).unwrap(), b"abc");
        assert_eq!(layer.annotations.get("file-mode").unwrap(), "0755");
    }

    #[tokio::test]
    async fn pull_is_idempotent_against_a_warm_blob_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = seeded_client(dir.path());
        let cancel = CancellationToken::new();

        let first = client.pull("meep", "latest", &linux_amd64(), &cancel).await.unwrap();
        let second = client.pull("meep", "latest", &linux_amd64(), &cancel).await.unwrap();
        assert_eq!(first.layers[0].blob_path, second.layers[0].blob_path);
    }

    #[tokio::test]
    async fn pull_fails_for_unknown_platform() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = seeded_client(dir.path());
        let cancel = CancellationToken::new();
        let darwin = Platform {
            os: "darwin".to_string(),
            architecture: "arm64".to_string(),
        };

        let err = client.pull("meep", "latest", &darwin, &cancel).await.unwrap_err();
        assert!(matches!(err, RegistryError::PlatformNotPresent { .. }));
    }

    #[tokio::test]
    async fn resolve_tag_skips_network_for_already_strict_semver() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let client = RegistryClient::new(transport, dir.path().join("oci-layout"));
        let cancel = CancellationToken::new();

        let version = client.resolve_tag("meep", "1.2.3", &cancel).await.unwrap();
        assert_eq!(version.to_string(), "1.2.3");
    }

    #[tokio::test]
    async fn resolve_tag_reads_version_annotation_for_floating_tags() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = seeded_client(dir.path());
        let cancel = CancellationToken::new();

        let version = client.resolve_tag("meep", "latest", &cancel).await.unwrap();
        assert_eq!(version.to_string(), "1.2.3");
    }
}
