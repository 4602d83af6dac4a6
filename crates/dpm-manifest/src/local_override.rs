//! `dpm.local.yaml`: an uncommitted, workspace-local override file. When
//! `DPM_ASSEMBLY` is not set, assembly plan construction walks from the
//! current directory up through its ancestors looking for this file; if
//! found, it is the sole base of the plan (no package descriptor overlay
//! is applied on top of it).

use std::collections::BTreeMap;

use dpm_core::ComponentRef;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const LOCAL_OVERRIDE_FILENAME: &str = "dpm.local.yaml";

#[derive(Debug, thiserror::Error)]
pub enum LocalOverrideError {
    #[error("failed to parse {LOCAL_OVERRIDE_FILENAME} YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    InvalidComponentRef(#[from] dpm_core::component_ref::ComponentRefError),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct LocalOverride {
    #[serde(rename = "override-components")]
    pub override_components: BTreeMap<String, ComponentRef>,
}

impl LocalOverride {
    pub fn from_contents(contents: &str) -> Result<Self, LocalOverrideError> {
        let local: Self = serde_yaml::from_str(contents)?;
        for component in local.override_components.values() {
            component.validate()?;
        }
        Ok(local)
    }

    /// Search `start` and every ancestor directory for a `dpm.local.yaml`,
    /// returning the first one found.
    pub fn find_ancestor(start: &std::path::Path) -> Option<std::path::PathBuf> {
        let mut dir = Some(start);
        while let Some(d) = dir {
            let candidate = d.join(LOCAL_OVERRIDE_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            dir = d.parent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_override_components() {
        let local = LocalOverride::from_contents(
            r#"
override-components:
  damlc:
    local-path: ./damlc
"#,
        )
        .unwrap();
        assert!(local.override_components.contains_key("damlc"));
    }

    #[test]
    fn finds_file_in_ancestor_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(tmp.path().join(LOCAL_OVERRIDE_FILENAME), "override-components: {}").unwrap();

        let found = LocalOverride::find_ancestor(&nested).unwrap();
        assert_eq!(found, tmp.path().join(LOCAL_OVERRIDE_FILENAME));
    }

    #[test]
    fn returns_none_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(LocalOverride::find_ancestor(tmp.path()).is_none());
    }
}
