//! Wire types for the content-addressed artifact registry: the per-tag
//! `Index` that fans out to one descriptor per platform, the per-platform
//! `Manifest` listing a component's file layers, and the annotation
//! vocabulary both carry. Grounded on `examples/original_source/pkg/ociindex`
//! and restructured away from OpenAPI-generated client code towards this
//! spec's simpler content-addressed model.
//!
//! Registry artifacts are JSON, not YAML (the registry transport is an
//! OCI-like distribution API; only descriptor files authored by hand —
//! SDK manifests, component manifests, package descriptors — are YAML).

use std::collections::BTreeMap;

use dpm_core::Platform;
use dpm_core::platform::PlatformSelectionError;
use serde::{Deserialize, Serialize};

/// Required and well-known annotation keys. `NAME`/`VERSION` are required on
/// every index; `FILE_NAME`/`FILE_MODE`/`FILE_MTIME` are required on every
/// layer descriptor inside a component's per-platform manifest, since the
/// transport does not preserve file mode or mtime itself.
pub mod annotations {
    pub const NAME: &str = "name";
    pub const VERSION: &str = "version";
    /// Fallback read when `VERSION` is absent on an older index.
    pub const VENDOR_VERSION: &str = "com.digitalasset.dpm.version";
    pub const FILE_NAME: &str = "file-name";
    pub const FILE_MODE: &str = "file-mode";
    pub const FILE_MTIME: &str = "file-mtime";
}

pub const INDEX_MEDIA_TYPE: &str = "application/vnd.dpm.index.v1+json";
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.dpm.manifest.v1+json";
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.dpm.layer.v1.tar+gzip";

/// The `(os, architecture)` pair carried on a descriptor, distinct from
/// [`dpm_core::Platform`] only in that it round-trips through JSON with the
/// field names the registry actually uses on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorPlatform {
    pub os: String,
    pub architecture: String,
}

impl From<&Platform> for DescriptorPlatform {
    fn from(p: &Platform) -> Self {
        Self {
            os: p.os.clone(),
            architecture: p.architecture.clone(),
        }
    }
}

impl From<&DescriptorPlatform> for Platform {
    fn from(p: &DescriptorPlatform) -> Self {
        Self {
            os: p.os.clone(),
            architecture: p.architecture.clone(),
        }
    }
}

/// A pointer to one blob in the registry: either one platform's manifest
/// (in an `Index`) or one file layer (in a `Manifest`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub media_type: String,
    /// Content digest of the referenced blob, `"<algo>:<hex>"`.
    pub digest: String,
    pub size: u64,
    /// Absent for the single generic (platform-independent) descriptor in
    /// an index; always absent on layer descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<DescriptorPlatform>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// A tag's index: one descriptor per platform the artifact was published
/// for, or a single platform-less descriptor for platform-independent
/// artifacts (jars, metadata-only components).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub schema_version: u32,
    pub media_type: String,
    pub manifests: Vec<Descriptor>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// One platform's concrete manifest: the list of file layers that make up
/// a component, or the single layer that makes up a dependency artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub layers: Vec<Descriptor>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("index for {repo:?}:{tag:?} is missing the required {key:?} annotation")]
    Missing {
        repo: String,
        tag: String,
        key: &'static str,
    },
    #[error("index for {repo:?}:{tag:?} has a malformed {key:?} annotation {value:?}: {source}")]
    Malformed {
        repo: String,
        tag: String,
        key: &'static str,
        value: String,
        #[source]
        source: semver::Error,
    },
}

impl Index {
    /// Select the descriptor matching `wanted` exactly, falling back to the
    /// sole platform-less descriptor (`4.A Platform selection policy`).
    pub fn select_platform(
        &self,
        wanted: &Platform,
    ) -> Result<&Descriptor, PlatformSelectionError> {
        let candidates: Vec<(Option<Platform>, &Descriptor)> = self
            .manifests
            .iter()
            .map(|d| (d.platform.as_ref().map(Platform::from), d))
            .collect();
        dpm_core::platform::select_platform(wanted, &candidates).map(|d| *d)
    }

    /// Resolve a floating tag to the strict semver the index's `version`
    /// annotation declares, falling back to the legacy vendor annotation.
    pub fn version_annotation(
        &self,
        repo: &str,
        tag: &str,
    ) -> Result<dpm_core::SemVer, AnnotationError> {
        let raw = self
            .annotations
            .get(annotations::VERSION)
            .or_else(|| self.annotations.get(annotations::VENDOR_VERSION))
            .ok_or_else(|| AnnotationError::Missing {
                repo: repo.to_string(),
                tag: tag.to_string(),
                key: annotations::VERSION,
            })?;
        dpm_core::SemVer::parse(raw).map_err(|source| AnnotationError::Malformed {
            repo: repo.to_string(),
            tag: tag.to_string(),
            key: annotations::VERSION,
            value: raw.clone(),
            source,
        })
    }

    pub fn required_annotation(
        &self,
        repo: &str,
        tag: &str,
        key: &'static str,
    ) -> Result<&str, AnnotationError> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .ok_or(AnnotationError::Missing {
                repo: repo.to_string(),
                tag: tag.to_string(),
                key,
            })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid file-mode annotation {0:?}: expected an octal string")]
pub struct InvalidFileMode(String);

/// Parse the `file-mode` layer annotation, an octal string like `"0755"`.
pub fn parse_file_mode(raw: &str) -> Result<u32, InvalidFileMode> {
    u32::from_str_radix(raw.trim_start_matches("0o"), 8).map_err(|_| InvalidFileMode(raw.to_string()))
}

/// Parse the `file-mtime` layer annotation, an RFC 3339 timestamp.
pub fn parse_file_mtime(raw: &str) -> Result<time::OffsetDateTime, time::error::Parse> {
    time::OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339)
}

pub fn format_file_mtime(t: time::OffsetDateTime) -> Result<String, time::error::Format> {
    t.format(&time::format_description::well_known::Rfc3339)
}
