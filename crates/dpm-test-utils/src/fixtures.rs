//! A seeded [`MockTransport`] builder, generalizing the
//! `seed_index`/`seed_manifest`/`seed_blob` boilerplate duplicated across
//! `dpm-sdk`'s own test modules (`puller.rs`, `locker.rs`,
//! `deep_resolver.rs`, `assembler.rs`) into one place.

use std::collections::BTreeMap;

use dpm_registry::mock::MockTransport;
use dpm_registry_types::{Descriptor, INDEX_MEDIA_TYPE, Index, MANIFEST_MEDIA_TYPE, Manifest};

/// One file to seed as a layer blob, with the annotations the puller
/// requires on every layer descriptor.
pub struct FixtureLayer {
    pub file_name: String,
    pub file_mode: String,
    pub file_mtime: String,
    pub bytes: Vec<u8>,
}

impl FixtureLayer {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            file_mode: "0755".to_string(),
            file_mtime: "2024-01-01T00:00:00Z".to_string(),
            bytes: bytes.into(),
        }
    }
}

/// Seeds `transport` with a single-platform tag resolving to one manifest
/// of `layers`, tagged with `version` as both the floating `reference` and
/// the index's `version` annotation. Returns the transport for chaining.
pub fn seed_component(
    transport: &MockTransport,
    repo: &str,
    reference: &str,
    version: &str,
    layers: Vec<FixtureLayer>,
) {
    let manifest_digest = format!("sha256:manifest-{repo}-{version}");

    let mut index_annotations = BTreeMap::new();
    index_annotations.insert("version".to_string(), version.to_string());
    transport.seed_index(
        repo,
        reference,
        Index {
            schema_version: 2,
            media_type: INDEX_MEDIA_TYPE.to_string(),
            manifests: vec![Descriptor {
                media_type: MANIFEST_MEDIA_TYPE.to_string(),
                digest: manifest_digest.clone(),
                size: 1,
                platform: None,
                annotations: BTreeMap::new(),
            }],
            annotations: index_annotations,
        },
    );

    let mut manifest_layers = Vec::with_capacity(layers.len());
    for (i, layer) in layers.into_iter().enumerate() {
        let digest = format!("sha256:layer-{repo}-{version}-{i}");
        let mut annotations = BTreeMap::new();
        annotations.insert(
            dpm_registry_types::annotations::FILE_NAME.to_string(),
            layer.file_name,
        );
        annotations.insert(
            dpm_registry_types::annotations::FILE_MODE.to_string(),
            layer.file_mode,
        );
        annotations.insert(
            dpm_registry_types::annotations::FILE_MTIME.to_string(),
            layer.file_mtime,
        );
        manifest_layers.push(Descriptor {
            media_type: "application/octet-stream".to_string(),
            digest: digest.clone(),
            size: layer.bytes.len() as u64,
            platform: None,
            annotations,
        });
        transport.seed_blob(repo, digest, layer.bytes);
    }

    transport.seed_manifest(
        repo,
        manifest_digest,
        Manifest {
            schema_version: 2,
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            layers: manifest_layers,
            annotations: BTreeMap::new(),
        },
    );
}

/// A [`MockTransport`] pre-seeded with one component, `"meep"` at version
/// `"1.0.0"`, a single executable layer at `bin/meep`. Covers the common
/// case where a test only needs *a* resolvable component, not a
/// hand-tailored one.
pub fn single_component_transport() -> MockTransport {
    let transport = MockTransport::new();
    seed_component(
        &transport,
        "meep",
        "1.0.0",
        "1.0.0",
        vec![FixtureLayer::new("bin/meep", b"#!/bin/sh\necho meep\n".to_vec())],
    );
    transport
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn seeded_component_resolves_and_pulls() {
        use dpm_registry::transport::RegistryTransport;

        let transport = single_component_transport();
        let cancel = CancellationToken::new();
        let index = transport.fetch_index("meep", "1.0.0", &cancel).await.unwrap();
        assert_eq!(index.version_annotation("meep", "1.0.0").unwrap().to_string(), "1.0.0");
    }
}
