//! The component manifest: describes the commands, dependency paths, and
//! exports a single component contributes to an assembled toolchain.

use std::collections::BTreeMap;

use dpm_core::ManifestMeta;
use dpm_core::manifest_meta::API_GROUP;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const COMPONENT_KIND: &str = "Component";
pub const COMPONENT_SCHEMA_VERSION: &str = "v1";

pub fn component_api_version() -> String {
    format!("{API_GROUP}/{COMPONENT_SCHEMA_VERSION}")
}

#[derive(Debug, thiserror::Error)]
pub enum ComponentManifestError {
    #[error(transparent)]
    Schema(#[from] dpm_core::SchemaError),
    #[error("failed to parse component manifest YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// `deny_unknown_fields` can't be combined with `#[serde(flatten)]`, so the
// `{apiVersion, kind}` preamble is spelled out here rather than flattened in
// from a shared `ManifestMeta`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ComponentManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub spec: ComponentSpec,
}

impl ComponentManifest {
    fn meta(&self) -> ManifestMeta {
        ManifestMeta {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ComponentSpec {
    #[serde(rename = "dependency-paths")]
    pub dependency_paths: BTreeMap<String, String>,
    pub commands: Vec<Command>,
    #[serde(rename = "jar-commands")]
    pub jar_commands: Vec<JarCommand>,
    pub exports: BTreeMap<String, Export>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Command {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(rename = "exec-args", default)]
    pub exec_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct JarCommand {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(rename = "jar-args", default)]
    pub jar_args: Vec<String>,
    #[serde(rename = "jvm-args", default)]
    pub jvm_args: Vec<String>,
}

/// Anything assembled into a single executable command, regardless of
/// whether it runs a native binary or a jar.
pub trait AnyCommand {
    fn name(&self) -> &str;
    fn path(&self) -> &str;
    fn aliases(&self) -> &[String];
    fn desc(&self) -> Option<&str>;
}

impl AnyCommand for Command {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }
}

impl AnyCommand for JarCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    Extend,
    Fail,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Export {
    pub paths: Vec<String>,
    #[serde(rename = "conflict-strategy")]
    pub conflict_strategy: ConflictStrategy,
}

impl ComponentManifest {
    pub fn from_contents(contents: &str) -> Result<Self, ComponentManifestError> {
        let manifest: Self = serde_yaml::from_str(contents)?;
        manifest
            .meta()
            .validate_schema(&component_api_version(), COMPONENT_KIND)?;
        Ok(manifest)
    }

    /// All native and jar commands in declaration order, jar commands
    /// first to match the order components are usually authored in.
    pub fn all_commands(&self) -> Vec<&dyn AnyCommand> {
        let mut all: Vec<&dyn AnyCommand> = self
            .spec
            .jar_commands
            .iter()
            .map(|c| c as &dyn AnyCommand)
            .collect();
        all.extend(self.spec.commands.iter().map(|c| c as &dyn AnyCommand));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(body: &str) -> String {
        format!(
            "apiVersion: {api}\nkind: {kind}\n{body}",
            api = component_api_version(),
            kind = COMPONENT_KIND
        )
    }

    #[test]
    fn parses_native_and_jar_commands() {
        let manifest = ComponentManifest::from_contents(&yaml(
            r#"
spec:
  commands:
    - name: damlc
      path: ./bin/damlc
      aliases: ["dc"]
  jar-commands:
    - name: sandbox
      path: ./bin/sandbox.jar
      jvm-args: ["-Xmx2g"]
"#,
        ))
        .unwrap();
        assert_eq!(manifest.all_commands().len(), 2);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = ComponentManifest::from_contents(&yaml(
            r#"
spec:
  commands: []
  bogus-field: true
"#,
        ));
        assert!(err.is_err());
    }

    #[test]
    fn command_requires_name_and_path() {
        let err = ComponentManifest::from_contents(&yaml(
            r#"
spec:
  commands:
    - path: ./bin/damlc
"#,
        ));
        assert!(err.is_err());
    }
}
