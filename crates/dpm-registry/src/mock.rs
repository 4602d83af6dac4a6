//! An in-memory [`RegistryTransport`] for tests: `dpm-sdk`'s assembler,
//! assembly-plan, deep-resolver, and locker tests all drive a
//! `RegistryClient<MockTransport>` instead of talking to a real registry.

use std::collections::BTreeMap;
use std::sync::Mutex;

use dpm_registry_types::{Index, Manifest};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{FetchedBlob, PushLayer, RegistryTransport};

#[derive(Default)]
pub struct MockTransport {
    indexes: Mutex<BTreeMap<(String, String), Index>>,
    manifests: Mutex<BTreeMap<(String, String), Manifest>>,
    blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_index(&self, repo: impl Into<String>, tag: impl Into<String>, index: Index) {
        self.indexes.lock().unwrap().insert((repo.into(), tag.into()), index);
    }

    pub fn seed_manifest(&self, repo: impl Into<String>, digest: impl Into<String>, manifest: Manifest) {
        self.manifests
            .lock()
            .unwrap()
            .insert((repo.into(), digest.into()), manifest);
    }

    pub fn seed_blob(&self, repo: impl Into<String>, digest: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert((repo.into(), digest.into()), bytes);
    }
}

impl RegistryTransport for MockTransport {
    async fn fetch_index(
        &self,
        repo: &str,
        reference: &str,
        _cancel: &CancellationToken,
    ) -> Result<Index, TransportError> {
        self.indexes
            .lock()
            .unwrap()
            .get(&(repo.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("{repo}:{reference}")))
    }

    async fn fetch_manifest(
        &self,
        repo: &str,
        digest: &str,
        _cancel: &CancellationToken,
    ) -> Result<Manifest, TransportError> {
        self.manifests
            .lock()
            .unwrap()
            .get(&(repo.to_string(), digest.to_string()))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("{repo}@{digest}")))
    }

    async fn fetch_blob(
        &self,
        repo: &str,
        digest: &str,
        _cancel: &CancellationToken,
    ) -> Result<FetchedBlob, TransportError> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(repo.to_string(), digest.to_string()))
            .cloned()
            .map(|bytes| FetchedBlob { bytes })
            .ok_or_else(|| TransportError::NotFound(format!("{repo}@{digest}")))
    }

    async fn push(
        &self,
        repo: &str,
        tag: &str,
        layers: &[PushLayer],
        annotations: BTreeMap<String, String>,
    ) -> Result<dpm_registry_types::Descriptor, TransportError> {
        let _ = (repo, tag, layers, &annotations);
        Ok(dpm_registry_types::Descriptor {
            media_type: dpm_registry_types::MANIFEST_MEDIA_TYPE.to_string(),
            digest: "sha256:mock".to_string(),
            size: 0,
            platform: None,
            annotations,
        })
    }

    async fn list_tags(&self, repo: &str) -> Result<Vec<String>, TransportError> {
        Ok(self
            .indexes
            .lock()
            .unwrap()
            .keys()
            .filter(|(r, _)| r == repo)
            .map(|(_, tag)| tag.clone())
            .collect())
    }
}
