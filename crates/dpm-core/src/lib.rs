//! Primitives shared by every other `dpm` crate: the SemVer/Edition/Platform
//! newtypes, the `ComponentRef` union used by both `SdkManifest` and
//! `ComponentManifest`, the `ManifestMeta` schema preamble, and the
//! atomic-write/path helpers manifests and the lockfile lean on.

pub mod canonical_path;
pub mod component_ref;
pub mod edition;
pub mod env_interp;
pub mod manifest_meta;
pub mod platform;
pub mod semver;

pub use canonical_path::{CanonicalPath, CanonicalizeError};
pub use component_ref::ComponentRef;
pub use edition::Edition;
pub use manifest_meta::{ManifestMeta, SchemaError};
pub use platform::Platform;
pub use semver::SemVer;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fslock::LockFile;
use serde::Serialize;

/// The OCI repository name under which the assistant binary itself is
/// published; also the one name a component's commands may never shadow.
pub const ASSISTANT_NAME: &str = "dpm";

/// Closed set of command names the assistant itself implements. A
/// component that defines a command under one of these names fails
/// assembly validation.
pub const BUILTIN_COMMANDS: &[&str] = &[
    "versions",
    "version",
    "update",
    "bootstrap",
    "install",
    "uninstall",
    "component",
    "repo",
    "resolve",
    "login",
];

pub const N_HASH_CHARS: usize = 8;

/// Returns the truncated hash of a [Path], used to namespace cache
/// directories that are keyed by an absolute path.
pub fn path_hash(p: impl AsRef<Path>) -> String {
    let lossy = p.as_ref().to_string_lossy();
    let mut chars = blake3::hash(lossy.as_bytes()).to_hex();
    chars.truncate(N_HASH_CHARS);
    chars.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("file stored in an invalid location: {0}")]
    InvalidLocation(PathBuf),
    #[error("failed to open temporary file")]
    OpenTmpFile(#[source] std::io::Error),
    #[error("failed to rename temporary file")]
    RenameTmpFile(#[source] tempfile::PersistError),
    #[error("failed to write temporary file")]
    SerdeWriteTmpFile(#[source] serde_json::Error),
    #[error("failed to write temporary file")]
    WriteTmpFile(#[source] std::io::Error),
}

/// Serialize a value to JSON and write it to disk atomically (write to a
/// sibling temp file, then rename). Takes a [LockFile] to ensure the write
/// only happens while the caller holds the corresponding lock; it is a bug
/// to pass a lock that doesn't correspond to `path`.
pub fn serialize_atomically<T>(
    value: &T,
    path: &impl AsRef<Path>,
    _lock: LockFile,
) -> Result<(), WriteError>
where
    T: ?Sized + Serialize,
{
    let parent = path
        .as_ref()
        .parent()
        .ok_or_else(|| WriteError::InvalidLocation(path.as_ref().to_path_buf()))?;
    let temp_file = tempfile::NamedTempFile::new_in(parent).map_err(WriteError::OpenTmpFile)?;

    let writer = BufWriter::new(&temp_file);
    serde_json::to_writer_pretty(writer, value).map_err(WriteError::SerdeWriteTmpFile)?;
    temp_file
        .persist(path.as_ref())
        .map_err(WriteError::RenameTmpFile)?;
    Ok(())
}

/// Write raw bytes to a file atomically by renaming a tempfile.
pub fn write_atomically(
    path: &impl AsRef<Path>,
    contents: impl AsRef<[u8]>,
) -> Result<(), WriteError> {
    let parent = path
        .as_ref()
        .parent()
        .ok_or_else(|| WriteError::InvalidLocation(path.as_ref().to_path_buf()))?;

    let mut tempfile = tempfile::NamedTempFile::new_in(parent).map_err(WriteError::OpenTmpFile)?;

    tempfile
        .write_all(contents.as_ref())
        .map_err(WriteError::WriteTmpFile)?;

    tempfile
        .persist(path.as_ref())
        .map_err(WriteError::RenameTmpFile)?;
    Ok(())
}

/// Returns a `tracing`-compatible form of a [Path].
pub fn traceable_path(p: impl AsRef<Path>) -> impl tracing::Value {
    let path = p.as_ref();
    path.display().to_string()
}
