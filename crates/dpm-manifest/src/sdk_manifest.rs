//! The SDK manifest: the descriptor published to the registry for each SDK
//! version, naming every component (and the assistant binary itself) that
//! belongs to that version.

use std::collections::BTreeMap;
use std::path::PathBuf;

use dpm_core::{ComponentRef, Edition, ManifestMeta, SemVer, manifest_meta::API_GROUP};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const SDK_MANIFEST_KIND: &str = "SdkManifest";
pub const SDK_MANIFEST_SCHEMA_VERSION: &str = "v1";

pub fn sdk_manifest_api_version() -> String {
    format!("{API_GROUP}/{SDK_MANIFEST_SCHEMA_VERSION}")
}

#[derive(Debug, thiserror::Error)]
pub enum SdkManifestError {
    #[error("invalid SDK manifest: {0}")]
    Schema(#[from] dpm_core::SchemaError),
    #[error("invalid SDK manifest: spec 'components' must have at least one entry")]
    EmptyComponents,
    #[error(
        "invalid SDK manifest: the assistant can only be listed under 'spec.assistant', not under 'spec.components.{name}'",
        name = dpm_core::ASSISTANT_NAME,
    )]
    AssistantUnderComponents,
    #[error("invalid SDK manifest: assistant can only be an OCI reference, not a local path")]
    AssistantMustBeRemote,
    #[error(transparent)]
    InvalidComponentRef(#[from] dpm_core::component_ref::ComponentRefError),
    #[error("failed to parse SDK manifest YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to read SDK manifest: {0}")]
    Io(#[from] std::io::Error),
}

// `deny_unknown_fields` can't be combined with `#[serde(flatten)]`, so the
// `{apiVersion, kind}` preamble is spelled out here rather than flattened in
// from a shared `ManifestMeta`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SdkManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub spec: SdkManifestSpec,
    #[serde(skip)]
    pub absolute_path: Option<PathBuf>,
}

impl SdkManifest {
    fn meta(&self) -> ManifestMeta {
        ManifestMeta {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SdkManifestSpec {
    pub components: BTreeMap<String, ComponentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant: Option<ComponentRef>,
    pub version: SemVer,
    pub edition: Edition,
}

impl SdkManifest {
    pub fn from_contents(contents: &str) -> Result<Self, SdkManifestError> {
        let raw: Self = serde_yaml::from_str(contents)?;
        raw.meta()
            .validate_schema(&sdk_manifest_api_version(), SDK_MANIFEST_KIND)?;
        raw.validate()?;
        Ok(raw)
    }

    fn validate(&self) -> Result<(), SdkManifestError> {
        if self.spec.components.is_empty() {
            return Err(SdkManifestError::EmptyComponents);
        }
        if self.spec.components.contains_key(dpm_core::ASSISTANT_NAME) {
            return Err(SdkManifestError::AssistantUnderComponents);
        }
        for component in self.spec.components.values() {
            component.validate()?;
        }
        if let Some(assistant) = &self.spec.assistant {
            assistant.validate()?;
            if assistant.is_local() {
                return Err(SdkManifestError::AssistantMustBeRemote);
            }
        }
        Ok(())
    }

    pub fn read_from_file(path: &std::path::Path) -> Result<Self, SdkManifestError> {
        let contents = std::fs::read_to_string(path)?;
        let mut manifest = Self::from_contents(&contents)?;
        manifest.absolute_path = Some(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
        Ok(manifest)
    }
}
