//! Error taxonomy for registry operations (spec section 7, "Registry
//! errors"): tag resolution failures, missing platforms, and missing
//! annotations, plus the transport-level I/O each of those wraps.

use dpm_core::platform::PlatformSelectionError;
use dpm_registry_types::AnnotationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to fetch index for {repo}:{reference}")]
    FetchIndex {
        repo: String,
        reference: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to fetch manifest {digest} for {repo}")]
    FetchManifest {
        repo: String,
        digest: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to fetch blob {digest} for {repo}")]
    FetchBlob {
        repo: String,
        digest: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to push {repo}:{tag}")]
    Push {
        repo: String,
        tag: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to list tags for {repo}")]
    ListTags {
        repo: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error("no platform-matching manifest in {repo}:{reference}")]
    PlatformNotPresent {
        repo: String,
        reference: String,
        #[source]
        source: PlatformSelectionError,
    },

    #[error("failed to resolve tag '{repo}:{reference}' to a version: {reason}")]
    TagResolutionFailed {
        repo: String,
        reference: String,
        reason: String,
    },

    #[error("failed to write blob to local cache: {0}")]
    Cache(#[from] std::io::Error),

    #[error("pull cancelled")]
    Cancelled,
}

/// Errors surfaced by a [`crate::transport::RegistryTransport`]
/// implementation, independent of which one (HTTP, in-memory mock) is in
/// play.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tag {0:?} not found")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}
