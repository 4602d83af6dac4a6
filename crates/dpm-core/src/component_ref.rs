//! A reference to a component, as it appears under `spec.components` (or
//! `spec.assistant`) of an [`SdkManifest`](crate::manifest_meta), and again
//! under `override-components` of a multi-package descriptor or
//! `dpm.local.yaml`. Exactly one of a local path or a remote coordinate
//! (version and/or an explicit image tag) must be present.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::semver::SemVer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ComponentRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<SemVer>,
    #[serde(rename = "image-tag", skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(rename = "local-path", skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ComponentRefError {
    #[error("a component must include 'local-path', 'image-tag', or 'version'")]
    Empty,
    #[error("a component can't simultaneously be local ('local-path') and remote ('version'/'image-tag')")]
    MixedLocalAndRemote,
}

impl ComponentRef {
    pub fn validate(&self) -> Result<(), ComponentRefError> {
        if self.version.is_none() && self.image_tag.is_none() && self.local_path.is_none() {
            return Err(ComponentRefError::Empty);
        }
        if self.local_path.is_some() && (self.version.is_some() || self.image_tag.is_some()) {
            return Err(ComponentRefError::MixedLocalAndRemote);
        }
        Ok(())
    }

    pub fn is_local(&self) -> bool {
        self.local_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_component_ref() {
        let c = ComponentRef {
            version: None,
            image_tag: None,
            local_path: None,
        };
        assert_eq!(c.validate(), Err(ComponentRefError::Empty));
    }

    #[test]
    fn rejects_local_and_remote_together() {
        let c = ComponentRef {
            version: Some(SemVer::parse("1.0.0").unwrap()),
            image_tag: None,
            local_path: Some("./local".to_string()),
        };
        assert_eq!(c.validate(), Err(ComponentRefError::MixedLocalAndRemote));
    }

    #[test]
    fn accepts_local_only() {
        let c = ComponentRef {
            version: None,
            image_tag: None,
            local_path: Some("./local".to_string()),
        };
        assert!(c.validate().is_ok());
        assert!(c.is_local());
    }
}
