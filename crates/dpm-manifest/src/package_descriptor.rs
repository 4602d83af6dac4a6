//! The package descriptor (the generalized `daml.yaml`): the per-package
//! file naming the SDK version to assemble, local component overrides,
//! and remote dependencies.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use dpm_core::ComponentRef;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PackageDescriptorError {
    #[error(transparent)]
    EnvExpand(#[from] dpm_core::env_interp::UndefinedVars),
    #[error("failed to parse package descriptor YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid artifact locations: only one artifact location can be marked 'default'")]
    MultipleDefaultLocations,
    #[error(transparent)]
    InvalidComponentRef(#[from] dpm_core::component_ref::ComponentRefError),
    #[error(
        "dependencies beginning with '@' must be of the form '@<artifact-location>/<suffix>': {0:?}"
    )]
    MalformedLocationDependency(String),
    #[error("dependency {dep:?} has no corresponding artifact location {location:?}")]
    UnknownArtifactLocation { dep: String, location: String },
    #[error("artifact location {0:?} must have a non-empty url")]
    EmptyLocationUrl(String),
    #[error("failed to resolve dependency's artifact location for {0:?}: no default artifact location is configured")]
    NoDefaultLocation(String),
    #[error("couldn't parse resolved URL for dependency {dep:?}: {source}")]
    InvalidUrl {
        dep: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct PackageDescriptor {
    #[serde(rename = "sdk-version", skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,
    #[serde(rename = "override-components")]
    pub override_components: BTreeMap<String, ComponentRef>,
    pub dependencies: Vec<String>,
    #[serde(rename = "artifact-locations")]
    pub artifact_locations: BTreeMap<String, ArtifactLocation>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ArtifactLocation {
    pub url: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDependency {
    pub full_url: Url,
    pub location_name: Option<String>,
}

static LOCATION_DEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(@[a-zA-Z0-9_-]+)/[^/]+$").unwrap());

impl PackageDescriptor {
    pub fn from_contents(contents: &str) -> Result<Self, PackageDescriptorError> {
        let expanded = dpm_core::env_interp::expand_env(contents)?;
        let descriptor: Self = serde_yaml::from_str(&expanded)?;
        for component in descriptor.override_components.values() {
            component.validate()?;
        }
        descriptor.default_location()?;
        Ok(descriptor)
    }

    /// The sole artifact location marked `default: true`, if any.
    pub fn default_location(&self) -> Result<Option<(&str, &ArtifactLocation)>, PackageDescriptorError> {
        let mut found = None;
        for (name, location) in &self.artifact_locations {
            if location.default {
                if found.is_some() {
                    return Err(PackageDescriptorError::MultipleDefaultLocations);
                }
                found = Some((name.as_str(), location));
            }
        }
        Ok(found)
    }

    /// Resolve every entry in `dependencies` into a fully-qualified URL,
    /// per the three accepted dependency-string shapes: a bare `oci://`
    /// URL, an `@location/suffix` reference into `artifact-locations`, or
    /// a bare `name:tag` qualified against the default location. Anything
    /// else (no `:`) is treated as a non-remote, builtin dependency and
    /// resolves to `None`. Collects every error rather than failing fast
    /// on the first bad entry.
    pub fn resolve_dependencies(
        &self,
    ) -> Result<BTreeMap<String, Option<ResolvedDependency>>, Vec<PackageDescriptorError>> {
        let default_location = self.default_location().map_err(|e| vec![e])?;
        let mut resolved = BTreeMap::new();
        let mut errors = Vec::new();

        for dep in &self.dependencies {
            match self.resolve_one_dependency(dep, default_location) {
                Ok(value) => {
                    resolved.insert(dep.clone(), value);
                }
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(resolved)
    }

    fn resolve_one_dependency(
        &self,
        dep: &str,
        default_location: Option<(&str, &ArtifactLocation)>,
    ) -> Result<Option<ResolvedDependency>, PackageDescriptorError> {
        if dep.starts_with("oci://") {
            let url = Url::parse(dep).map_err(|source| PackageDescriptorError::InvalidUrl {
                dep: dep.to_string(),
                source,
            })?;
            return Ok(Some(ResolvedDependency {
                full_url: url,
                location_name: None,
            }));
        }

        if dep.starts_with('@') {
            let captures = LOCATION_DEP_RE
                .captures(dep)
                .ok_or_else(|| PackageDescriptorError::MalformedLocationDependency(dep.to_string()))?;
            let location_name = &captures[1];
            let location = self
                .artifact_locations
                .get(location_name)
                .ok_or_else(|| PackageDescriptorError::UnknownArtifactLocation {
                    dep: dep.to_string(),
                    location: location_name.to_string(),
                })?;
            if location.url.is_empty() {
                return Err(PackageDescriptorError::EmptyLocationUrl(
                    location_name.to_string(),
                ));
            }
            let raw = dep.replacen(location_name, &location.url, 1);
            let url = Url::parse(&raw).map_err(|source| PackageDescriptorError::InvalidUrl {
                dep: dep.to_string(),
                source,
            })?;
            return Ok(Some(ResolvedDependency {
                full_url: url,
                location_name: Some(location_name.to_string()),
            }));
        }

        if dep.contains(':') {
            let (name, location) = default_location.ok_or_else(|| {
                PackageDescriptorError::NoDefaultLocation(dep.to_string())
            })?;
            let raw = format!("{}/{}", location.url, dep);
            let url = Url::parse(&raw).map_err(|source| PackageDescriptorError::InvalidUrl {
                dep: dep.to_string(),
                source,
            })?;
            return Ok(Some(ResolvedDependency {
                full_url: url,
                location_name: Some(name.to_string()),
            }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_oci_url_directly() {
        let descriptor = PackageDescriptor {
            dependencies: vec!["oci://example.com/foo/bar:1.2.3".to_string()],
            ..Default::default()
        };
        let resolved = descriptor.resolve_dependencies().unwrap();
        assert!(resolved["oci://example.com/foo/bar:1.2.3"].is_some());
    }

    #[test]
    fn resolves_location_prefixed_dependency() {
        let mut descriptor = PackageDescriptor::default();
        descriptor.artifact_locations.insert(
            "@internal".to_string(),
            ArtifactLocation {
                url: "oci://internal.example.com/packages".to_string(),
                default: false,
                auth: None,
            },
        );
        descriptor.dependencies.push("@internal/foo:1.0.0".to_string());
        let resolved = descriptor.resolve_dependencies().unwrap();
        let r = resolved["@internal/foo:1.0.0"].as_ref().unwrap();
        assert_eq!(
            r.full_url.as_str(),
            "oci://internal.example.com/packages/foo:1.0.0"
        );
    }

    #[test]
    fn resolves_bare_tag_against_default_location() {
        let mut descriptor = PackageDescriptor::default();
        descriptor.artifact_locations.insert(
            "@default".to_string(),
            ArtifactLocation {
                url: "oci://registry.example.com/pkgs".to_string(),
                default: true,
                auth: None,
            },
        );
        descriptor.dependencies.push("foo:1.0.0".to_string());
        let resolved = descriptor.resolve_dependencies().unwrap();
        let r = resolved["foo:1.0.0"].as_ref().unwrap();
        assert_eq!(r.full_url.as_str(), "oci://registry.example.com/pkgs/foo:1.0.0");
    }

    #[test]
    fn bare_tag_with_no_default_location_is_an_error() {
        let mut descriptor = PackageDescriptor::default();
        descriptor.dependencies.push("foo:1.0.0".to_string());
        assert!(descriptor.resolve_dependencies().is_err());
    }

    #[test]
    fn non_remote_dependency_resolves_to_none() {
        let mut descriptor = PackageDescriptor::default();
        descriptor.dependencies.push("some-builtin-name".to_string());
        let resolved = descriptor.resolve_dependencies().unwrap();
        assert_eq!(resolved["some-builtin-name"], None);
    }

    #[test]
    fn rejects_multiple_default_locations() {
        let mut descriptor = PackageDescriptor::default();
        for name in ["@a", "@b"] {
            descriptor.artifact_locations.insert(
                name.to_string(),
                ArtifactLocation {
                    url: "oci://example.com".to_string(),
                    default: true,
                    auth: None,
                },
            );
        }
        assert!(matches!(
            descriptor.default_location(),
            Err(PackageDescriptorError::MultipleDefaultLocations)
        ));
    }
}
