//! Component A: a content-addressed registry client. Presents the three
//! primitives spec 4.A names — `pull`, `push`, `list-tags` — against an
//! injected [`transport::RegistryTransport`], backed by a local blob
//! cache. Restructured from the teacher's OpenAPI-generated catalog client
//! towards the spec's simpler index/manifest/layer model (see
//! `examples/original_source/pkg/ociindex`).

pub mod client;
pub mod config;
pub mod error;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{PulledLayer, PulledManifest, RegistryClient, default_blob_cache_dir};
pub use config::{DEFAULT_REGISTRY_ENDPOINT, RegistryConfig};
pub use error::{RegistryError, TransportError};
pub use transport::{HttpTransport, RegistryTransport};

// Re-export the wire types consumers need without depending on
// `dpm-registry-types` directly.
pub use dpm_registry_types::{annotations, Descriptor, Index, Manifest};
