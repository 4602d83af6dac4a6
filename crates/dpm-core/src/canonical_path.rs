use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// A path that is guaranteed to be canonicalized.
///
/// Deep Resolution canonicalizes each package path up front so that two
/// manifest entries pointing at the same package via different relative
/// paths collapse to a single resolved package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, derive_more::Deref, derive_more::AsRef)]
#[deref(forward)]
#[as_ref(forward)]
pub struct CanonicalPath(PathBuf);

#[derive(Debug, Error)]
#[error("couldn't canonicalize path {path:?}: {err}")]
pub struct CanonicalizeError {
    pub path: PathBuf,
    #[source]
    pub err: std::io::Error,
}

impl CanonicalPath {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CanonicalizeError> {
        let canonicalized = std::fs::canonicalize(&path).map_err(|e| CanonicalizeError {
            path: path.as_ref().to_path_buf(),
            err: e,
        })?;
        Ok(Self(canonicalized))
    }

    /// Create a [`CanonicalPath`] without checking if the path is canonical or
    /// exists. Only to be used when dealing with paths that are known to be
    /// deleted.
    pub fn new_unchecked(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().to_path_buf())
    }

    /// Destruct the [`CanonicalPath`] and return the inner [`PathBuf`]
    pub fn into_inner(self) -> PathBuf {
        self.0
    }
}
