//! The `{apiVersion, kind}` preamble every strict descriptor carries
//! inline, validated against the expected pair immediately after
//! deserialization.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const API_GROUP: &str = "digitalasset.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ManifestMeta {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("expected apiVersion {expected_api_version:?} and kind {expected_kind:?}, found apiVersion {found_api_version:?} and kind {found_kind:?}")]
pub struct SchemaError {
    pub expected_api_version: String,
    pub expected_kind: String,
    pub found_api_version: String,
    pub found_kind: String,
}

impl ManifestMeta {
    pub fn validate_schema(
        &self,
        expected_api_version: &str,
        expected_kind: &str,
    ) -> Result<(), SchemaError> {
        if self.api_version != expected_api_version || self.kind != expected_kind {
            return Err(SchemaError {
                expected_api_version: expected_api_version.to_string(),
                expected_kind: expected_kind.to_string(),
                found_api_version: self.api_version.clone(),
                found_kind: self.kind.clone(),
            });
        }
        Ok(())
    }
}
