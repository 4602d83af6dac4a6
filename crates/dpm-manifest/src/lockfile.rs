//! The package lockfile (`dpm-lock.yaml`): the pinned set of remote
//! dependency references a package resolved to the last time it was
//! locked.

use dpm_core::ManifestMeta;
use dpm_core::manifest_meta::API_GROUP;
use schemars::JsonSchema;
use semver::Version;
use serde::{Deserialize, Serialize};

pub const PACKAGE_LOCK_KIND: &str = "PackageLock";
pub const PACKAGE_LOCK_SCHEMA_VERSION: &str = "v1";
pub const LOCKFILE_FILENAME: &str = "dpm-lock.yaml";

pub fn package_lock_api_version() -> String {
    format!("{API_GROUP}/{PACKAGE_LOCK_SCHEMA_VERSION}")
}

#[derive(Debug, thiserror::Error)]
pub enum PackageLockError {
    #[error(transparent)]
    Schema(#[from] dpm_core::SchemaError),
    #[error("failed to parse lockfile YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to read lockfile: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed dar reference {0:?}: expected '<registry>/<repository>:<tag>'")]
    MalformedDarUri(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct PackageLock {
    #[serde(flatten)]
    pub meta: Option<ManifestMeta>,
    pub dars: Vec<Dar>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Dar {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl PackageLock {
    pub fn new(dars: Vec<Dar>) -> Self {
        Self {
            meta: Some(ManifestMeta {
                api_version: package_lock_api_version(),
                kind: PACKAGE_LOCK_KIND.to_string(),
            }),
            dars,
        }
    }

    pub fn from_contents(contents: &str) -> Result<Self, PackageLockError> {
        let lock: Self = serde_yaml::from_str(contents)?;
        if let Some(meta) = &lock.meta {
            meta.validate_schema(&package_lock_api_version(), PACKAGE_LOCK_KIND)?;
        }
        Ok(lock)
    }

    pub fn read_from_file(path: &std::path::Path) -> Result<Self, PackageLockError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_contents(&contents)
    }

    /// Whether `self` (the lockfile as it exists on disk) already
    /// satisfies `expected` (what the current package descriptor would
    /// produce), without needing to re-resolve.
    ///
    /// Two dar sets are compared by the `(registry, repository)` each
    /// entry's URI resolves to, ignoring the tag: the set of base
    /// references must match exactly between `self` and `expected`. For
    /// each matching base reference, the tags must either match exactly,
    /// or `expected`'s tag must be a floating (non-semver) tag that
    /// `self`'s concrete, semver-pinned tag satisfies — an existing pin
    /// always satisfies a floating expectation.
    pub fn is_in_sync(&self, expected: &PackageLock) -> Result<bool, PackageLockError> {
        use std::collections::BTreeMap;

        let existing: BTreeMap<&str, &str> = self
            .dars
            .iter()
            .map(|d| split_base_and_tag(&d.uri))
            .collect::<Result<_, _>>()?;
        let wanted: BTreeMap<&str, &str> = expected
            .dars
            .iter()
            .map(|d| split_base_and_tag(&d.uri))
            .collect::<Result<_, _>>()?;

        if existing.keys().collect::<std::collections::BTreeSet<_>>()
            != wanted.keys().collect::<std::collections::BTreeSet<_>>()
        {
            return Ok(false);
        }

        for (base, existing_tag) in &existing {
            let wanted_tag = wanted[base];
            if *existing_tag == wanted_tag {
                continue;
            }
            let wanted_is_floating = Version::parse(wanted_tag).is_err();
            let existing_is_concrete = Version::parse(existing_tag).is_ok();
            if wanted_is_floating && existing_is_concrete {
                continue;
            }
            return Ok(false);
        }

        Ok(true)
    }
}

fn split_base_and_tag(uri: &str) -> Result<(&str, &str), PackageLockError> {
    uri.rsplit_once(':')
        .ok_or_else(|| PackageLockError::MalformedDarUri(uri.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(uris: &[&str]) -> PackageLock {
        PackageLock {
            meta: None,
            dars: uris
                .iter()
                .map(|u| Dar {
                    uri: u.to_string(),
                    digest: None,
                })
                .collect(),
        }
    }

    #[test]
    fn no_diff_is_in_sync() {
        let expected = mk(&[
            "oci://example1.com/a:latest",
            "oci://example2.com/b:1.2.3",
        ]);
        let existing = mk(&[
            "oci://example1.com/a:latest",
            "oci://example2.com/b:1.2.3",
        ]);
        assert!(existing.is_in_sync(&expected).unwrap());
    }

    #[test]
    fn only_removed_is_out_of_sync() {
        let expected = mk(&[
            "oci://example1.com/a:latest",
            "oci://example2.com/b:1.2.3",
        ]);
        let existing = mk(&["oci://example1.com/a:latest"]);
        assert!(!existing.is_in_sync(&expected).unwrap());
    }

    #[test]
    fn only_added_is_out_of_sync() {
        let expected = mk(&["oci://example1.com/a:latest"]);
        let existing = mk(&[
            "oci://example1.com/a:latest",
            "oci://example2.com/b:1.2.3",
        ]);
        assert!(!existing.is_in_sync(&expected).unwrap());
    }

    #[test]
    fn added_and_removed_is_out_of_sync() {
        let expected = mk(&[
            "oci://example1.com/a:latest",
            "oci://example2.com/b:1.2.3",
        ]);
        let existing = mk(&[
            "oci://example2.com/b:1.2.3",
            "oci://example3.com/c:4.5.6",
        ]);
        assert!(!existing.is_in_sync(&expected).unwrap());
    }

    #[test]
    fn floating_expectation_is_satisfied_by_concrete_pin() {
        let expected = mk(&["oci://example2.com/b:latest"]);
        let existing = mk(&["oci://example2.com/b:1.2.3"]);
        assert!(existing.is_in_sync(&expected).unwrap());
    }
}
