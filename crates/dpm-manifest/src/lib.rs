//! Parsed representations of every on-disk descriptor `dpm` reads: the
//! SDK manifest, component manifests, package and multi-package
//! descriptors, the local override file, and the package lockfile.

pub mod component_manifest;
pub mod local_override;
pub mod lockfile;
pub mod multi_package;
pub mod package_descriptor;
pub mod sdk_manifest;

pub use component_manifest::{ComponentManifest, ComponentManifestError};
pub use local_override::{LocalOverride, LocalOverrideError};
pub use lockfile::{Dar, PackageLock, PackageLockError};
pub use multi_package::{MultiPackageDescriptor, MultiPackageError};
pub use package_descriptor::{PackageDescriptor, PackageDescriptorError, ResolvedDependency};
pub use sdk_manifest::{SdkManifest, SdkManifestError};
