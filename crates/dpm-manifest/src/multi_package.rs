//! The multi-package descriptor: lists the package directories that make
//! up a workspace and any components every package in it should override.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dpm_core::ComponentRef;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum MultiPackageError {
    #[error("failed to parse multi-package descriptor YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    InvalidComponentRef(#[from] dpm_core::component_ref::ComponentRefError),
    #[error("failed to read multi-package descriptor: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct MultiPackageDescriptor {
    pub packages: Vec<String>,
    #[serde(rename = "override-components")]
    pub override_components: BTreeMap<String, ComponentRef>,
    #[serde(skip)]
    pub absolute_path: Option<PathBuf>,
}

impl MultiPackageDescriptor {
    pub fn from_contents(contents: &str) -> Result<Self, MultiPackageError> {
        let descriptor: Self = serde_yaml::from_str(contents)?;
        for component in descriptor.override_components.values() {
            component.validate()?;
        }
        Ok(descriptor)
    }

    pub fn read_from_file(path: &Path) -> Result<Self, MultiPackageError> {
        let contents = std::fs::read_to_string(path)?;
        let mut descriptor = Self::from_contents(&contents)?;
        descriptor.absolute_path =
            Some(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
        Ok(descriptor)
    }

    /// Every package path resolved to an absolute path, relative to the
    /// directory the multi-package descriptor lives in.
    pub fn absolute_packages(&self) -> Vec<PathBuf> {
        let base = self
            .absolute_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.packages.iter().map(|p| base.join(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_package_list() {
        let descriptor = MultiPackageDescriptor::from_contents(
            r#"
packages:
  - ./a
  - ./b
"#,
        )
        .unwrap();
        assert_eq!(descriptor.packages, vec!["./a", "./b"]);
    }

    #[test]
    fn absolute_packages_resolves_relative_to_descriptor_dir() {
        let mut descriptor = MultiPackageDescriptor {
            packages: vec!["./a".to_string()],
            ..Default::default()
        };
        descriptor.absolute_path = Some(PathBuf::from("/workspace/multi-package.yaml"));
        assert_eq!(
            descriptor.absolute_packages(),
            vec![PathBuf::from("/workspace/./a")]
        );
    }
}
