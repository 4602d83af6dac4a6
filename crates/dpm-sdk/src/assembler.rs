//! Component Assembly (spec 4.D): collects the components named by an
//! ordered stack of layers, validates them collectively, wires
//! dependency-path environment variables, and merges exports into
//! imports. Grounded on `examples/original_source/pkg/assembler` and the
//! teacher's environment-merging pass in
//! `flox-rust-sdk/src/models/environment/core_environment.rs` (the
//! closest the teacher comes to "collect several manifests, fold them
//! into one coherent command surface").

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use dpm_core::component_ref::ComponentRef;
use dpm_core::{ASSISTANT_NAME, BUILTIN_COMMANDS, Platform};
use dpm_manifest::component_manifest::{ComponentManifest, ComponentManifestError, ConflictStrategy};
use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use dpm_registry::RegistryTransport;

use crate::puller::{ComponentPuller, PullError};

/// The well-known relative path, inside every component's materialized
/// directory, of its own manifest.
pub const COMPONENT_MANIFEST_FILENAME: &str = "component.yaml";

/// The OCI repository a named component is published under.
pub fn component_repo(name: &str) -> String {
    format!("dpm/components/{name}")
}

/// The OCI repository the assistant binary itself is published under.
pub const ASSISTANT_REPO: &str = "dpm/assistant";

static ENV_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// One layer of `name -> ComponentRef` overrides, plus the directory
/// relative local-path references inside it resolve against (spec 4.E,
/// "Order of overlay application... base, multi-package?, package?").
#[derive(Debug, Clone)]
pub struct ComponentLayer {
    pub base_dir: PathBuf,
    pub components: BTreeMap<String, ComponentRef>,
}

impl ComponentLayer {
    pub fn new(base_dir: impl Into<PathBuf>, components: BTreeMap<String, ComponentRef>) -> Self {
        Self {
            base_dir: base_dir.into(),
            components,
        }
    }
}

/// What the Assembler does when a `dependency-paths` entry can't be wired
/// (unresolved dependency name, or a key that isn't a valid env-var
/// identifier): the spec makes this configurable, defaulting to a hard
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDependencyPathError {
    #[default]
    Error,
    WarnAndSkip,
}

/// What the Assembler does when an export's path doesn't exist on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMissingExportPath {
    #[default]
    Error,
    WarnOnly,
}

#[derive(Debug, Clone)]
pub enum CommandKind {
    Native { exec_args: Vec<String> },
    Jar { jvm_args: Vec<String>, jar_args: Vec<String> },
}

/// One command contributed by one component, with everything resolved to
/// absolute paths and every cross-component env-var wiring already
/// attached (spec 3, "Validated Command").
#[derive(Debug, Clone)]
pub struct ValidatedCommand {
    pub name: String,
    pub aliases: Vec<String>,
    pub desc: Option<String>,
    pub path: PathBuf,
    pub kind: CommandKind,
    pub component_name: String,
    pub resolved_deps: BTreeMap<String, PathBuf>,
    pub sdk_version: Option<String>,
}

/// The shallow resolution output of one assembly: a package's worth of
/// `components`/`imports` entries (spec 3, "Resolution document").
#[derive(Debug, Clone, Default)]
pub struct ShallowResolution {
    pub components: BTreeMap<String, PathBuf>,
    pub imports: BTreeMap<String, Vec<PathBuf>>,
}

#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub commands: Vec<ValidatedCommand>,
    pub shallow: ShallowResolution,
    pub assistant_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("command {name:?} is defined by more than one component: {components:?}")]
    DuplicateCommand { name: String, components: Vec<String> },
    #[error("alias {alias:?} is defined by more than one component: {components:?}")]
    DuplicateAlias { alias: String, components: Vec<String> },
    #[error("command {name:?} in component {component:?} shadows the builtin command of the same name")]
    BuiltinShadow { name: String, component: String },
    #[error("command {name:?} in component {component:?} has no file at {path}", path = path.display())]
    MissingBinary {
        name: String,
        component: String,
        path: PathBuf,
    },
    #[error("command {name:?} in component {component:?} points at a directory, not a file: {path}", path = path.display())]
    BinaryIsDirectory {
        name: String,
        component: String,
        path: PathBuf,
    },
    #[error("export {var:?} has conflicting contributors (at least one declared 'fail'): {components:?}")]
    ExportConflict { var: String, components: Vec<String> },
    #[error("component {component:?} exports {var:?} with a path that doesn't exist: {path}", path = path.display())]
    ExportMissingPath {
        var: String,
        component: String,
        path: PathBuf,
    },
    #[error("component {component:?} declares dependency-path {dep:?} but no component named {dep:?} is in this assembly")]
    UnresolvedDependencyPath { component: String, dep: String },
    #[error("component {component:?} declares an invalid environment-variable key {key:?} for dependency-path {dep:?}")]
    InvalidDependencyPathKey {
        component: String,
        dep: String,
        key: String,
    },
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("an assembly must have at least one component")]
    EmptyComponents,
    #[error("assembly validation failed:\n{}", .0.iter().map(|e| format!("- {e}")).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<ValidationError>),
    #[error("couldn't resolve local component {name:?} at {path}: {source}", path = path.display())]
    LocalComponentMissing {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Pull(#[from] PullError),
    #[error("couldn't read manifest file for component {name:?} at {path}: {source}", path = path.display())]
    ManifestIo {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't parse manifest for component {name:?}: {source}")]
    Manifest {
        name: String,
        #[source]
        source: ComponentManifestError,
    },
    #[error("assistant binary not found (or not unique) under {dir}", dir = dir.display())]
    AssistantBinaryMissing { dir: PathBuf },
}

pub struct Assembler<'a, T: RegistryTransport> {
    puller: &'a ComponentPuller<T>,
    platform: Platform,
    on_dependency_path_error: OnDependencyPathError,
    on_missing_export_path: OnMissingExportPath,
}

impl<'a, T: RegistryTransport> Assembler<'a, T> {
    pub fn new(puller: &'a ComponentPuller<T>, platform: Platform) -> Self {
        Self {
            puller,
            platform,
            on_dependency_path_error: OnDependencyPathError::default(),
            on_missing_export_path: OnMissingExportPath::default(),
        }
    }

    pub fn with_dependency_path_policy(mut self, policy: OnDependencyPathError) -> Self {
        self.on_dependency_path_error = policy;
        self
    }

    pub fn with_export_path_policy(mut self, policy: OnMissingExportPath) -> Self {
        self.on_missing_export_path = policy;
        self
    }

    /// Run the full assembly algorithm (spec 4.D, steps 1-7) over `layers`
    /// in the precedence order the Assembly Plan already chose.
    /// `sdk_version` is stamped onto every command if the base manifest
    /// carried one; `assistant` is only ever resolved from the base
    /// manifest.
    #[instrument(skip(self, layers, cancel))]
    pub async fn assemble(
        &self,
        layers: &[ComponentLayer],
        sdk_version: Option<String>,
        assistant: Option<ComponentRef>,
        cancel: &CancellationToken,
    ) -> Result<AssemblyOutput, AssembleError> {
        let order = ordered_component_names(layers);
        if order.is_empty() {
            return Err(AssembleError::EmptyComponents);
        }

        let mut resolved: Vec<(String, ComponentManifest, PathBuf)> = Vec::with_capacity(order.len());
        for name in &order {
            let (component_ref, base_dir) = final_component_ref(layers, name)
                .expect("name came from ordered_component_names, so it must resolve");
            let dir = self
                .resolve_component_dir(name, component_ref, base_dir, cancel)
                .await?;
            let manifest = read_component_manifest(name, &dir)?;
            resolved.push((name.clone(), manifest, dir));
        }

        let mut errors = Vec::new();
        let mut commands = build_commands(&resolved, &mut errors);
        validate_command_surface(&commands, &mut errors);
        wire_dependency_paths(&resolved, &mut commands, self.on_dependency_path_error, &mut errors);
        if let Some(version) = &sdk_version {
            for command in &mut commands {
                command.sdk_version = Some(version.clone());
            }
        }
        let imports = merge_exports(&resolved, self.on_missing_export_path, &mut errors);

        if !errors.is_empty() {
            return Err(AssembleError::Validation(errors));
        }

        let shallow = ShallowResolution {
            components: resolved.iter().map(|(n, _, d)| (n.clone(), d.clone())).collect(),
            imports,
        };

        let assistant_path = match assistant {
            Some(component_ref) => Some(self.resolve_assistant(&component_ref, cancel).await?),
            None => None,
        };

        Ok(AssemblyOutput {
            commands,
            shallow,
            assistant_path,
        })
    }

    async fn resolve_component_dir(
        &self,
        name: &str,
        component_ref: &ComponentRef,
        base_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AssembleError> {
        if let Some(local_path) = &component_ref.local_path {
            let candidate = base_dir.join(local_path);
            return candidate
                .canonicalize()
                .map_err(|source| AssembleError::LocalComponentMissing {
                    name: name.to_string(),
                    path: candidate,
                    source,
                });
        }

        let reference = component_ref
            .image_tag
            .clone()
            .or_else(|| component_ref.version.as_ref().map(|v| v.to_string()))
            .expect("ComponentRef::validate already rejected the all-None case");

        Ok(self
            .puller
            .pull(&component_repo(name), name, &reference, &self.platform, cancel)
            .await?)
    }

    async fn resolve_assistant(
        &self,
        component_ref: &ComponentRef,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AssembleError> {
        let reference = component_ref
            .image_tag
            .clone()
            .or_else(|| component_ref.version.as_ref().map(|v| v.to_string()))
            .expect("SdkManifest::validate already rejected a local-path assistant");
        let dir = self
            .puller
            .pull(ASSISTANT_REPO, ASSISTANT_NAME, &reference, &self.platform, cancel)
            .await?;
        find_assistant_binary(&dir).ok_or(AssembleError::AssistantBinaryMissing { dir })
    }
}

/// Component iteration order: base-first, then overlays in order, then
/// within a layer lexicographically by name (the layer maps are
/// `BTreeMap`s, so their key order already is lexicographic) — spec 5,
/// "Ordering guarantees". A name's *position* is fixed by the first layer
/// that mentions it; a later overlay redefining the same name doesn't
/// move it.
fn ordered_component_names(layers: &[ComponentLayer]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut order = Vec::new();
    for layer in layers {
        for name in layer.components.keys() {
            if seen.insert(name.clone()) {
                order.push(name.clone());
            }
        }
    }
    order
}

/// Last-wins resolution of one component's [`ComponentRef`] and the base
/// directory its local-path (if any) resolves against.
fn final_component_ref<'a>(
    layers: &'a [ComponentLayer],
    name: &str,
) -> Option<(&'a ComponentRef, &'a Path)> {
    let mut found = None;
    for layer in layers {
        if let Some(component_ref) = layer.components.get(name) {
            found = Some((component_ref, layer.base_dir.as_path()));
        }
    }
    found
}

fn read_component_manifest(name: &str, dir: &Path) -> Result<ComponentManifest, AssembleError> {
    let path = dir.join(COMPONENT_MANIFEST_FILENAME);
    let contents = std::fs::read_to_string(&path).map_err(|source| AssembleError::ManifestIo {
        name: name.to_string(),
        path,
        source,
    })?;
    ComponentManifest::from_contents(&contents).map_err(|source| AssembleError::Manifest {
        name: name.to_string(),
        source,
    })
}

fn build_commands(
    resolved: &[(String, ComponentManifest, PathBuf)],
    errors: &mut Vec<ValidationError>,
) -> Vec<ValidatedCommand> {
    let mut commands = Vec::new();
    for (name, manifest, dir) in resolved {
        for command in &manifest.spec.commands {
            let path = dir.join(&command.path);
            check_path(&path, &command.name, name, errors);
            commands.push(ValidatedCommand {
                name: command.name.clone(),
                aliases: command.aliases.clone(),
                desc: command.desc.clone(),
                path,
                kind: CommandKind::Native {
                    exec_args: command.exec_args.clone(),
                },
                component_name: name.clone(),
                resolved_deps: BTreeMap::new(),
                sdk_version: None,
            });
        }
        for command in &manifest.spec.jar_commands {
            let path = dir.join(&command.path);
            check_path(&path, &command.name, name, errors);
            commands.push(ValidatedCommand {
                name: command.name.clone(),
                aliases: command.aliases.clone(),
                desc: command.desc.clone(),
                path,
                kind: CommandKind::Jar {
                    jvm_args: command.jvm_args.clone(),
                    jar_args: command.jar_args.clone(),
                },
                component_name: name.clone(),
                resolved_deps: BTreeMap::new(),
                sdk_version: None,
            });
        }
    }
    commands
}

fn check_path(path: &Path, command_name: &str, component: &str, errors: &mut Vec<ValidationError>) {
    match path.metadata() {
        Ok(meta) if meta.is_dir() => errors.push(ValidationError::BinaryIsDirectory {
            name: command_name.to_string(),
            component: component.to_string(),
            path: path.to_path_buf(),
        }),
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::MissingBinary {
            name: command_name.to_string(),
            component: component.to_string(),
            path: path.to_path_buf(),
        }),
    }
}

fn validate_command_surface(commands: &[ValidatedCommand], errors: &mut Vec<ValidationError>) {
    let mut by_name: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut by_alias: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for command in commands {
        by_name
            .entry(&command.name)
            .or_default()
            .push(&command.component_name);
        for alias in &command.aliases {
            by_alias.entry(alias).or_default().push(&command.component_name);
        }

        if BUILTIN_COMMANDS.contains(&command.name.as_str()) {
            errors.push(ValidationError::BuiltinShadow {
                name: command.name.clone(),
                component: command.component_name.clone(),
            });
        }
        for alias in &command.aliases {
            if BUILTIN_COMMANDS.contains(&alias.as_str()) {
                errors.push(ValidationError::BuiltinShadow {
                    name: alias.clone(),
                    component: command.component_name.clone(),
                });
            }
        }
    }

    for (name, components) in by_name {
        let mut distinct: Vec<&str> = components.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() > 1 {
            errors.push(ValidationError::DuplicateCommand {
                name: name.to_string(),
                components: distinct.into_iter().map(String::from).collect(),
            });
        }
    }

    for (alias, components) in by_alias {
        let mut distinct: Vec<&str> = components.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() > 1 {
            errors.push(ValidationError::DuplicateAlias {
                alias: alias.to_string(),
                components: distinct.into_iter().map(String::from).collect(),
            });
        }
    }
}

fn wire_dependency_paths(
    resolved: &[(String, ComponentManifest, PathBuf)],
    commands: &mut [ValidatedCommand],
    policy: OnDependencyPathError,
    errors: &mut Vec<ValidationError>,
) {
    let dirs_by_name: BTreeMap<&str, &Path> =
        resolved.iter().map(|(n, _, d)| (n.as_str(), d.as_path())).collect();

    for (name, manifest, _dir) in resolved {
        for (dep, env_key) in &manifest.spec.dependency_paths {
            if !ENV_KEY_RE.is_match(env_key) {
                match policy {
                    OnDependencyPathError::Error => errors.push(ValidationError::InvalidDependencyPathKey {
                        component: name.clone(),
                        dep: dep.clone(),
                        key: env_key.clone(),
                    }),
                    OnDependencyPathError::WarnAndSkip => {
                        warn!(component = %name, dep, env_key, "skipping invalid dependency-path env key");
                    }
                }
                continue;
            }

            let Some(dep_dir) = dirs_by_name.get(dep.as_str()) else {
                match policy {
                    OnDependencyPathError::Error => errors.push(ValidationError::UnresolvedDependencyPath {
                        component: name.clone(),
                        dep: dep.clone(),
                    }),
                    OnDependencyPathError::WarnAndSkip => {
                        warn!(component = %name, dep, "skipping unresolved dependency-path");
                    }
                }
                continue;
            };

            for command in commands.iter_mut().filter(|c| &c.component_name == name) {
                command.resolved_deps.insert(env_key.clone(), dep_dir.to_path_buf());
            }
        }
    }
}

fn merge_exports(
    resolved: &[(String, ComponentManifest, PathBuf)],
    policy: OnMissingExportPath,
    errors: &mut Vec<ValidationError>,
) -> BTreeMap<String, Vec<PathBuf>> {
    struct Entry {
        strategy: ConflictStrategy,
        paths: Vec<PathBuf>,
        contributors: Vec<String>,
    }

    let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
    let mut conflicted: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    for (name, manifest, dir) in resolved {
        for (var, export) in &manifest.spec.exports {
            let mut paths = Vec::with_capacity(export.paths.len());
            for raw in &export.paths {
                let path = dir.join(raw);
                if !path.exists() {
                    match policy {
                        OnMissingExportPath::Error => errors.push(ValidationError::ExportMissingPath {
                            var: var.clone(),
                            component: name.clone(),
                            path: path.clone(),
                        }),
                        OnMissingExportPath::WarnOnly => {
                            warn!(component = %name, var, path = %path.display(), "export path doesn't exist");
                        }
                    }
                }
                paths.push(path);
            }

            match entries.get_mut(var) {
                None => {
                    entries.insert(
                        var.clone(),
                        Entry {
                            strategy: export.conflict_strategy,
                            paths,
                            contributors: vec![name.clone()],
                        },
                    );
                }
                Some(entry) => {
                    if entry.strategy == ConflictStrategy::Extend && export.conflict_strategy == ConflictStrategy::Extend {
                        entry.paths.extend(paths);
                        entry.contributors.push(name.clone());
                    } else {
                        entry.contributors.push(name.clone());
                        conflicted.insert(var.clone());
                    }
                }
            }
        }
    }

    for var in &conflicted {
        let entry = &entries[var];
        errors.push(ValidationError::ExportConflict {
            var: var.clone(),
            components: entry.contributors.clone(),
        });
    }

    entries
        .into_iter()
        .filter(|(var, _)| !conflicted.contains(var))
        .map(|(var, entry)| (var, entry.paths))
        .collect()
}

/// Find the assistant binary in a materialized component directory: a
/// single file anywhere under `dir` named exactly `dpm` or `dpm.exe`
/// (spec 4.D.7, "It must be a single file; pick by filename").
fn find_assistant_binary(dir: &Path) -> Option<PathBuf> {
    let wanted: &[&str] = if cfg!(windows) { &["dpm.exe"] } else { &["dpm"] };
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file()
            && wanted.contains(&entry.file_name().to_string_lossy().as_ref())
        {
            found.push(entry.path().to_path_buf());
        }
    }
    if found.len() == 1 { found.pop() } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpm_registry::mock::MockTransport;
    use dpm_registry::RegistryClient;

    fn write_component(dir: &Path, name: &str, yaml: &str) -> PathBuf {
        let component_dir = dir.join(name);
        std::fs::create_dir_all(&component_dir).unwrap();
        std::fs::write(component_dir.join(COMPONENT_MANIFEST_FILENAME), yaml).unwrap();
        component_dir
    }

    fn executable(dir: &Path, relative: &str) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        path
    }

    fn component_yaml(body: &str) -> String {
        format!(
            "apiVersion: {api}\nkind: {kind}\n{body}",
            api = dpm_manifest::component_manifest::component_api_version(),
            kind = dpm_manifest::component_manifest::COMPONENT_KIND,
        )
    }

    fn local_ref(local_path: &str) -> ComponentRef {
        ComponentRef {
            version: None,
            image_tag: None,
            local_path: Some(local_path.to_string()),
        }
    }

    fn puller() -> ComponentPuller<MockTransport> {
        let dir = tempfile::tempdir().unwrap();
        let client = RegistryClient::new(MockTransport::new(), dir.path().join("oci-layout"));
        ComponentPuller::new(client, dir.path().join("components"), false)
    }

    #[tokio::test]
    async fn single_component_assembles_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let meep_dir = write_component(
            tmp.path(),
            "meep",
            &component_yaml(
                r#"
spec:
  commands:
    - name: meep
      path: ./bin/meep
"#,
            ),
        );
        executable(&meep_dir, "bin/meep");

        let mut components = BTreeMap::new();
        components.insert("meep".to_string(), local_ref("meep"));
        let layers = vec![ComponentLayer::new(tmp.path(), components)];

        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let output = assembler
            .assemble(&layers, None, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.commands.len(), 1);
        assert_eq!(output.shallow.components.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_command_name_across_components_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let a_dir = write_component(
            tmp.path(),
            "a",
            &component_yaml("spec:\n  commands:\n    - name: foo\n      path: ./bin/foo\n"),
        );
        executable(&a_dir, "bin/foo");
        let b_dir = write_component(
            tmp.path(),
            "b",
            &component_yaml("spec:\n  commands:\n    - name: foo\n      path: ./bin/foo\n"),
        );
        executable(&b_dir, "bin/foo");

        let mut components = BTreeMap::new();
        components.insert("a".to_string(), local_ref("a"));
        components.insert("b".to_string(), local_ref("b"));
        let layers = vec![ComponentLayer::new(tmp.path(), components)];

        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let err = assembler
            .assemble(&layers, None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            AssembleError::Validation(errors) => {
                assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateCommand { name, .. } if name == "foo")));
            }
            other => panic!("expected Validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn builtin_shadow_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_component(
            tmp.path(),
            "a",
            &component_yaml("spec:\n  commands:\n    - name: install\n      path: ./bin/install\n"),
        );
        executable(&dir, "bin/install");

        let mut components = BTreeMap::new();
        components.insert("a".to_string(), local_ref("a"));
        let layers = vec![ComponentLayer::new(tmp.path(), components)];

        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let err = assembler
            .assemble(&layers, None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssembleError::Validation(errors) if errors.iter().any(|e| matches!(e, ValidationError::BuiltinShadow { .. }))));
    }

    #[tokio::test]
    async fn command_path_pointing_at_a_directory_fails_assembly() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_component(
            tmp.path(),
            "a",
            &component_yaml("spec:\n  commands:\n    - name: foo\n      path: ./bin\n"),
        );
        std::fs::create_dir_all(dir.join("bin")).unwrap();

        let mut components = BTreeMap::new();
        components.insert("a".to_string(), local_ref("a"));
        let layers = vec![ComponentLayer::new(tmp.path(), components)];

        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let err = assembler
            .assemble(&layers, None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssembleError::Validation(errors) if errors.iter().any(|e| matches!(e, ValidationError::BinaryIsDirectory { name, .. } if name == "foo"))));
    }

    #[tokio::test]
    async fn extend_exports_merge_in_layering_order() {
        let tmp = tempfile::tempdir().unwrap();
        let a_dir = write_component(
            tmp.path(),
            "a",
            &component_yaml(
                "spec:\n  commands: []\n  exports:\n    SHARED_PATHS:\n      paths: [x]\n      conflict-strategy: extend\n",
            ),
        );
        std::fs::write(a_dir.join("x"), "a").unwrap();
        let b_dir = write_component(
            tmp.path(),
            "b",
            &component_yaml(
                "spec:\n  commands: []\n  exports:\n    SHARED_PATHS:\n      paths: [x]\n      conflict-strategy: extend\n",
            ),
        );
        std::fs::write(b_dir.join("x"), "b").unwrap();

        let mut components = BTreeMap::new();
        components.insert("a".to_string(), local_ref("a"));
        components.insert("b".to_string(), local_ref("b"));
        let layers = vec![ComponentLayer::new(tmp.path(), components)];

        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let output = assembler
            .assemble(&layers, None, None, &CancellationToken::new())
            .await
            .unwrap();

        let shared = &output.shallow.imports["SHARED_PATHS"];
        assert_eq!(shared, &vec![a_dir.join("x"), b_dir.join("x")]);
    }

    #[tokio::test]
    async fn fail_strategy_export_conflict_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let a_dir = write_component(
            tmp.path(),
            "a",
            &component_yaml(
                "spec:\n  commands: []\n  exports:\n    SHARED_PATHS:\n      paths: [x]\n      conflict-strategy: fail\n",
            ),
        );
        std::fs::write(a_dir.join("x"), "a").unwrap();
        let b_dir = write_component(
            tmp.path(),
            "b",
            &component_yaml(
                "spec:\n  commands: []\n  exports:\n    SHARED_PATHS:\n      paths: [x]\n      conflict-strategy: extend\n",
            ),
        );
        std::fs::write(b_dir.join("x"), "b").unwrap();

        let mut components = BTreeMap::new();
        components.insert("a".to_string(), local_ref("a"));
        components.insert("b".to_string(), local_ref("b"));
        let layers = vec![ComponentLayer::new(tmp.path(), components)];

        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let err = assembler
            .assemble(&layers, None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssembleError::Validation(errors) if errors.iter().any(|e| matches!(e, ValidationError::ExportConflict { var, .. } if var == "SHARED_PATHS"))));
    }

    #[tokio::test]
    async fn dependency_path_wires_env_var_onto_declaring_components_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let dep_dir = write_component(tmp.path(), "dep", &component_yaml("spec:\n  commands: []\n"));
        let main_dir = write_component(
            tmp.path(),
            "main",
            &component_yaml(
                "spec:\n  dependency-paths:\n    dep: DEP_PATH\n  commands:\n    - name: run\n      path: ./bin/run\n",
            ),
        );
        executable(&main_dir, "bin/run");

        let mut components = BTreeMap::new();
        components.insert("dep".to_string(), local_ref("dep"));
        components.insert("main".to_string(), local_ref("main"));
        let layers = vec![ComponentLayer::new(tmp.path(), components)];

        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let output = assembler
            .assemble(&layers, None, None, &CancellationToken::new())
            .await
            .unwrap();

        let run = output.commands.iter().find(|c| c.name == "run").unwrap();
        assert_eq!(run.resolved_deps.get("DEP_PATH"), Some(&dep_dir));
    }

    #[tokio::test]
    async fn empty_assembly_is_rejected() {
        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let err = assembler
            .assemble(&[], None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssembleError::EmptyComponents));
    }

    #[tokio::test]
    async fn later_layer_overrides_earlier_component_definition() {
        let tmp = tempfile::tempdir().unwrap();
        let base_dir = write_component(
            tmp.path(),
            "meep",
            &component_yaml("spec:\n  commands:\n    - name: meep\n      path: ./bin/old\n"),
        );
        executable(&base_dir, "bin/old");
        let override_dir = write_component(
            tmp.path(),
            "meep-override",
            &component_yaml("spec:\n  commands:\n    - name: meep\n      path: ./bin/new\n"),
        );
        executable(&override_dir, "bin/new");

        let mut base_components = BTreeMap::new();
        base_components.insert("meep".to_string(), local_ref("meep"));
        let mut overlay_components = BTreeMap::new();
        overlay_components.insert("meep".to_string(), local_ref("meep-override"));

        let layers = vec![
            ComponentLayer::new(tmp.path(), base_components),
            ComponentLayer::new(tmp.path(), overlay_components),
        ];

        let puller = puller();
        let assembler = Assembler::new(&puller, Platform::host());
        let output = assembler
            .assemble(&layers, None, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.shallow.components["meep"], override_dir);
    }
}
