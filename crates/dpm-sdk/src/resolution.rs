//! The Resolution document (spec 3, "Resolution document") and the
//! structured `ResolutionError` taxonomy the Deep Resolver attaches to a
//! package's entry instead of aborting its siblings (spec 4.F, 7;
//! grounded on `examples/original_source/pkg/resolution` and
//! `cmd/dpm/cmd/resolve/resolutionerrors`).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The `Resolution` document uses a bare `v1`/`Resolution` pair, unlike
/// every other descriptor's `digitalasset.com/v1`-prefixed `apiVersion`
/// (spec 3, EXPANDED).
pub const RESOLUTION_API_VERSION: &str = "v1";
pub const RESOLUTION_KIND: &str = "Resolution";

/// The `imports` key under which the Deep Resolver appends a package's
/// resolved dependency-artifact paths once lockfiles are in play.
pub const DAR_IMPORTS_FIELD: &str = "dar-imports";

/// Placeholder `default-sdk` key used when no SDK version can be
/// determined at all — nothing installed and no override set (grounded
/// on the original's `"unknown–sdk-version"` literal).
pub const UNKNOWN_SDK_VERSION: &str = "unknown-sdk-version";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub packages: BTreeMap<PathBuf, Package>,
    #[serde(rename = "default-sdk")]
    pub default_sdk: BTreeMap<String, Package>,
}

impl Resolution {
    pub fn new(packages: BTreeMap<PathBuf, Package>, default_sdk: BTreeMap<String, Package>) -> Self {
        Self {
            api_version: RESOLUTION_API_VERSION.to_string(),
            kind: RESOLUTION_KIND.to_string(),
            packages,
            default_sdk,
        }
    }
}

/// One package's (or the default SDK's) shallow resolution outcome:
/// either a component/import map, or the errors that prevented producing
/// one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<ResolutionError>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub components: Option<BTreeMap<String, PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub imports: Option<BTreeMap<String, Vec<PathBuf>>>,
}

impl Package {
    pub fn failed(error: ResolutionError) -> Self {
        Self {
            errors: vec![error],
            components: None,
            imports: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionErrorCode {
    SdkNotInstalled,
    MalformedDamlYaml,
    DamlYamlNotFound,
    UnknownError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionError {
    pub code: ResolutionErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{:?}: {cause}", self.code),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl std::error::Error for ResolutionError {}

impl ResolutionError {
    pub fn sdk_not_installed(cause: impl std::fmt::Display) -> Self {
        Self {
            code: ResolutionErrorCode::SdkNotInstalled,
            cause: Some(cause.to_string()),
        }
    }

    pub fn malformed_daml_yaml(cause: impl std::fmt::Display) -> Self {
        Self {
            code: ResolutionErrorCode::MalformedDamlYaml,
            cause: Some(cause.to_string()),
        }
    }

    pub fn daml_yaml_not_found(cause: impl std::fmt::Display) -> Self {
        Self {
            code: ResolutionErrorCode::DamlYamlNotFound,
            cause: Some(cause.to_string()),
        }
    }

    /// Wrap any error as `UNKNOWN_ERROR`, preserving its message — the
    /// catch-all `resolutionerrors.Standardize` falls back to.
    pub fn standardize(err: &(impl std::fmt::Display + ?Sized)) -> Self {
        Self {
            code: ResolutionErrorCode::UnknownError,
            cause: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_the_bare_v1_preamble() {
        let resolution = Resolution::new(BTreeMap::new(), BTreeMap::new());
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "Resolution");
    }

    #[test]
    fn standardize_preserves_the_message() {
        let err = ResolutionError::standardize("boom");
        assert_eq!(err.code, ResolutionErrorCode::UnknownError);
        assert_eq!(err.cause.as_deref(), Some("boom"));
    }

    #[test]
    fn package_omits_empty_fields_from_serialization() {
        let package = Package::failed(ResolutionError::sdk_not_installed("not installed"));
        let json = serde_json::to_value(&package).unwrap();
        assert!(json.get("components").is_none());
        assert!(json.get("imports").is_none());
        assert_eq!(json["errors"][0]["code"], "SDK_NOT_INSTALLED");
    }
}
