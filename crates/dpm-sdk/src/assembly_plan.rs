//! Assembly Plan construction (spec 4.E): chooses the base manifest and
//! the stack of overlays an [`Assembler`] run should fold together, per
//! the precedence chain environment variables, workspace-local
//! overrides, package descriptors, and installed SDKs compete under.
//! Grounded on `examples/original_source/pkg/assembler/assemblyplan/assemblyplan.go`
//! and the teacher's layered-selection style in
//! `flox-rust-sdk/src/models/environment/core_environment.rs`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dpm_core::ComponentRef;
use dpm_manifest::local_override::{LOCAL_OVERRIDE_FILENAME, LocalOverride, LocalOverrideError};
use dpm_manifest::multi_package::{MultiPackageDescriptor, MultiPackageError};
use dpm_manifest::package_descriptor::{PackageDescriptor, PackageDescriptorError};
use dpm_manifest::sdk_manifest::{SdkManifest, SdkManifestError};
use dpm_registry::transport::{HttpTransport, RegistryTransport};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::assembler::ComponentLayer;
use crate::config::DpmConfig;
use crate::install_driver::{InstallDriver, InstallError};

/// The well-known file name of a package descriptor in a package
/// directory (the generalized `daml.yaml`).
pub const PACKAGE_DESCRIPTOR_FILENAME: &str = "daml.yaml";

/// The well-known file name of a multi-package descriptor in a
/// workspace root directory.
pub const MULTI_PACKAGE_DESCRIPTOR_FILENAME: &str = "multi-package.yaml";

#[derive(Debug, Error)]
pub enum AssemblyPlanError {
    #[error("couldn't read assembly manifest at {path}: {source}", path = path.display())]
    ReadAssembly {
        path: PathBuf,
        #[source]
        source: SdkManifestError,
    },
    #[error(transparent)]
    LocalOverride(#[from] LocalOverrideError),
    #[error("couldn't read {PACKAGE_DESCRIPTOR_FILENAME} at {path}: {source}", path = path.display())]
    ReadPackageDescriptor {
        path: PathBuf,
        #[source]
        source: PackageDescriptorError,
    },
    #[error(transparent)]
    MultiPackage(#[from] MultiPackageError),
    #[error("SDK version {version:?} is not installed and auto-install is disabled")]
    SdkNotInstalled { version: String },
    #[error("no SDK is installed for edition {edition}")]
    NoInstalledSdk { edition: dpm_core::Edition },
    #[error(transparent)]
    ReadInstalledSdk {
        #[from]
        source: SdkManifestError,
    },
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Assemble(#[from] crate::assembler::AssembleError),
}

/// The resolved base manifest plus overlay layers the Assembler should
/// fold, in application order (spec 4.E: "base, multi-package?,
/// package?").
#[derive(Debug, Clone)]
pub struct AssemblyPlan {
    pub layers: Vec<ComponentLayer>,
    pub sdk_version: Option<String>,
    pub assistant: Option<ComponentRef>,
}

/// Build the Assembly Plan that applies when operating on `package_dir`
/// (a package's own directory, or the current directory when resolving
/// outside of any particular package). `env` abstracts the recognized
/// environment variables (spec 6) so callers — notably the Deep
/// Resolver, which evaluates a plan per package without actually
/// `cd`-ing the process — can override what "current scope" means
/// without touching global process state.
#[derive(Debug, Clone, Default)]
pub struct AssemblyPlanEnv {
    pub dpm_assembly: Option<PathBuf>,
    pub daml_package: Option<PathBuf>,
    pub daml_project: Option<PathBuf>,
    pub dpm_sdk_version: Option<String>,
    pub dpm_multi_package: Option<PathBuf>,
}

impl AssemblyPlanEnv {
    /// Read the recognized variables from the actual process
    /// environment (spec 6).
    pub fn from_process() -> Self {
        Self {
            dpm_assembly: std::env::var_os("DPM_ASSEMBLY").map(PathBuf::from),
            daml_package: std::env::var_os("DAML_PACKAGE").map(PathBuf::from),
            daml_project: std::env::var_os("DAML_PROJECT").map(PathBuf::from),
            dpm_sdk_version: std::env::var("DPM_SDK_VERSION").ok(),
            dpm_multi_package: std::env::var_os("DPM_MULTI_PACKAGE").map(PathBuf::from),
        }
    }

    fn in_scope_package_dir(&self) -> Option<&Path> {
        self.daml_package
            .as_deref()
            .or(self.daml_project.as_deref())
    }

    /// Every package the Deep Resolver and Locker should iterate: every
    /// entry of an in-scope multi-package descriptor, or the sole
    /// in-scope package, or none at all. Grounded on
    /// `examples/original_source/pkg/resolver/deepresolver.go`'s
    /// `resolvePackages`.
    pub fn in_scope_packages(&self, cwd: &Path) -> Result<Vec<PathBuf>, AssemblyPlanError> {
        if let Some(path) = self
            .dpm_multi_package
            .as_deref()
            .map(|dir| dir.join(MULTI_PACKAGE_DESCRIPTOR_FILENAME))
            .or_else(|| find_ancestor_file(cwd, MULTI_PACKAGE_DESCRIPTOR_FILENAME))
        {
            let multi = MultiPackageDescriptor::read_from_file(&path)?;
            return Ok(multi.absolute_packages());
        }

        if let Some(dir) = self.in_scope_package_dir() {
            return Ok(vec![dir.to_path_buf()]);
        }
        if let Some(path) = find_ancestor_file(cwd, PACKAGE_DESCRIPTOR_FILENAME) {
            return Ok(vec![path.parent().unwrap_or(cwd).to_path_buf()]);
        }

        Ok(Vec::new())
    }
}

pub struct AssemblyPlanBuilder<'a, T: RegistryTransport = HttpTransport> {
    config: &'a DpmConfig,
    installer: Option<&'a InstallDriver<'a, T>>,
}

impl<'a, T: RegistryTransport> AssemblyPlanBuilder<'a, T> {
    /// An installer is only required when auto-install is both
    /// configured and actually reached (a missing SDK version); plans
    /// that never need to install one can pass `None`.
    pub fn new(config: &'a DpmConfig, installer: Option<&'a InstallDriver<'a, T>>) -> Self {
        Self { config, installer }
    }

    #[instrument(skip(self, env, cwd, cancel))]
    pub async fn construct(
        &self,
        env: &AssemblyPlanEnv,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<AssemblyPlan, AssemblyPlanError> {
        // Step 1: DPM_ASSEMBLY wins outright; no overlays.
        if let Some(path) = &env.dpm_assembly {
            let manifest = SdkManifest::read_from_file(path).map_err(|source| AssemblyPlanError::ReadAssembly {
                path: path.clone(),
                source,
            })?;
            let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            return Ok(AssemblyPlan {
                layers: vec![ComponentLayer::new(base_dir, manifest.spec.components.clone())],
                sdk_version: Some(manifest.spec.version.to_string()),
                assistant: manifest.spec.assistant.clone(),
            });
        }

        // Step 2: a workspace-local dpm.local.yaml overrides everything
        // below it, with no package overlay applied on top.
        if let Some(path) = LocalOverride::find_ancestor(cwd) {
            let contents = std::fs::read_to_string(&path)?;
            let local = LocalOverride::from_contents(&contents)?;
            let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            return Ok(AssemblyPlan {
                layers: vec![ComponentLayer::new(base_dir, local.override_components)],
                sdk_version: None,
                assistant: None,
            });
        }

        let mut layers = Vec::new();
        let mut sdk_version = None;
        let mut assistant = None;

        // Step 3/4: a package descriptor in scope picks the sdk-version
        // (and contributes its own overlay); otherwise fall back to the
        // installed default for the active edition.
        let package_descriptor_path = env
            .in_scope_package_dir()
            .map(|dir| dir.join(PACKAGE_DESCRIPTOR_FILENAME))
            .or_else(|| find_ancestor_file(cwd, PACKAGE_DESCRIPTOR_FILENAME));

        if let Some(path) = package_descriptor_path {
            let contents = std::fs::read_to_string(&path)?;
            let descriptor =
                PackageDescriptor::from_contents(&contents).map_err(|source| AssemblyPlanError::ReadPackageDescriptor {
                    path: path.clone(),
                    source,
                })?;

            let effective_version = env.dpm_sdk_version.clone().or_else(|| descriptor.sdk_version.clone());

            if let Some(version) = effective_version {
                let installed = self.installed_sdk(&version, cancel).await?;
                sdk_version = Some(version);
                layers.push(ComponentLayer::new(
                    installed.absolute_path.as_deref().unwrap_or(Path::new(".")).parent().unwrap_or(Path::new(".")),
                    installed.spec.components.clone(),
                ));
                assistant = installed.spec.assistant.clone();
            }

            let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            layers.push(ComponentLayer::new(base_dir, descriptor.override_components.clone()));
        } else {
            let installed = self.highest_installed_sdk(cancel).await?;
            sdk_version = Some(installed.spec.version.to_string());
            layers.push(ComponentLayer::new(
                installed.absolute_path.as_deref().unwrap_or(Path::new(".")).parent().unwrap_or(Path::new(".")),
                installed.spec.components.clone(),
            ));
            assistant = installed.spec.assistant.clone();
        }

        // Step 5: a multi-package descriptor in scope that references
        // this package layers its overrides above the package overlay.
        if let Some(path) = env
            .dpm_multi_package
            .as_deref()
            .map(|dir| dir.join(MULTI_PACKAGE_DESCRIPTOR_FILENAME))
            .or_else(|| find_ancestor_file(cwd, MULTI_PACKAGE_DESCRIPTOR_FILENAME))
        {
            let multi = MultiPackageDescriptor::read_from_file(&path).map_err(AssemblyPlanError::MultiPackage)?;
            let canonical_cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
            let references_cwd = multi
                .absolute_packages()
                .into_iter()
                .any(|p| p.canonicalize().unwrap_or(p) == canonical_cwd);
            if references_cwd {
                let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
                layers.push(ComponentLayer::new(base_dir, multi.override_components.clone()));
            }
        }

        Ok(AssemblyPlan { layers, sdk_version, assistant })
    }

    /// The bare installed SDK manifest, with no package overlay applied:
    /// `env.dpm_sdk_version` if set, else the highest installed version
    /// for the active edition. Used by the Deep Resolver's synthetic
    /// `default-sdk` entry, which never applies a package overlay
    /// (grounded on `resolveDefaultSdk` in
    /// `examples/original_source/pkg/resolver/deepresolver.go`, which
    /// calls `GetInstalledSdkFromEnvOrDefault` directly rather than
    /// running the full assembly plan).
    pub async fn bare_installed_sdk(
        &self,
        env: &AssemblyPlanEnv,
        cancel: &CancellationToken,
    ) -> Result<SdkManifest, AssemblyPlanError> {
        match &env.dpm_sdk_version {
            Some(version) => self.installed_sdk(version, cancel).await,
            None => self.highest_installed_sdk(cancel).await,
        }
    }

    async fn installed_sdk(&self, version: &str, cancel: &CancellationToken) -> Result<SdkManifest, AssemblyPlanError> {
        let path = self.config.home.sdk_manifest_path(self.config.edition, version);
        if path.is_file() {
            return Ok(SdkManifest::read_from_file(&path)?);
        }

        if !self.config.auto_install {
            return Err(AssemblyPlanError::SdkNotInstalled {
                version: version.to_string(),
            });
        }

        let installer = self.installer.ok_or_else(|| AssemblyPlanError::SdkNotInstalled {
            version: version.to_string(),
        })?;
        let result = installer
            .install(version, &dpm_core::Platform::host(), cancel)
            .await?;
        Ok(result.manifest)
    }

    async fn highest_installed_sdk(&self, cancel: &CancellationToken) -> Result<SdkManifest, AssemblyPlanError> {
        let dir = self.config.home.sdk_manifests_dir_for(self.config.edition);
        let mut best: Option<SdkManifest> = None;
        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                let manifest = SdkManifest::read_from_file(&path)?;
                let better = match &best {
                    None => true,
                    Some(current) => manifest.spec.version > current.spec.version,
                };
                if better {
                    best = Some(manifest);
                }
            }
        }
        best.ok_or(AssemblyPlanError::NoInstalledSdk { edition: self.config.edition })
    }
}

/// Search `start` and every ancestor directory for `filename`, returning
/// the first match.
fn find_ancestor_file(start: &Path, filename: &str) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::home::Home;
    use dpm_core::Edition;

    fn write_sdk_manifest(home: &Home, edition: Edition, version: &str, components_yaml: &str) {
        let path = home.sdk_manifest_path(edition, version);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            format!(
                "apiVersion: {api}\nkind: {kind}\nspec:\n  version: \"{version}\"\n  edition: {edition}\n  components:\n{components_yaml}",
                api = dpm_manifest::sdk_manifest::sdk_manifest_api_version(),
                kind = dpm_manifest::sdk_manifest::SDK_MANIFEST_KIND,
            ),
        )
        .unwrap();
    }

    fn config(home: Home) -> DpmConfig {
        DpmConfig {
            home,
            auto_install: false,
            lockfiles_enabled: true,
            edition: Edition::OpenSource,
            registry: dpm_registry::RegistryConfig::default(),
        }
    }

    #[tokio::test]
    async fn falls_back_to_highest_installed_sdk_with_no_package_in_scope() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path().join("home"));
        write_sdk_manifest(&home, Edition::OpenSource, "1.0.0", "    meep:\n      version: \"1.0.0\"\n");
        write_sdk_manifest(&home, Edition::OpenSource, "2.0.0", "    meep:\n      version: \"2.0.0\"\n");
        let config = config(home);

        let builder: AssemblyPlanBuilder<'_, dpm_registry::mock::MockTransport> = AssemblyPlanBuilder::new(&config, None);
        let plan = builder
            .construct(&AssemblyPlanEnv::default(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(plan.sdk_version.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn local_override_short_circuits_package_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path().join("home"));
        let config = config(home);

        let workspace = dir.path().join("workspace");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(
            workspace.join(LOCAL_OVERRIDE_FILENAME),
            "override-components:\n  meep:\n    local-path: ./meep\n",
        )
        .unwrap();

        let builder: AssemblyPlanBuilder<'_, dpm_registry::mock::MockTransport> = AssemblyPlanBuilder::new(&config, None);
        let plan = builder
            .construct(&AssemblyPlanEnv::default(), &workspace, &CancellationToken::new())
            .await
            .unwrap();

        assert!(plan.sdk_version.is_none());
        assert_eq!(plan.layers.len(), 1);
        assert!(plan.layers[0].components.contains_key("meep"));
    }

    #[tokio::test]
    async fn missing_sdk_without_auto_install_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path().join("home"));
        let config = config(home);

        let package_dir = dir.path().join("pkg");
        std::fs::create_dir_all(&package_dir).unwrap();
        std::fs::write(
            package_dir.join(PACKAGE_DESCRIPTOR_FILENAME),
            "sdk-version: 9.9.9\n",
        )
        .unwrap();

        let env = AssemblyPlanEnv {
            daml_package: Some(package_dir.clone()),
            ..Default::default()
        };

        let builder: AssemblyPlanBuilder<'_, dpm_registry::mock::MockTransport> = AssemblyPlanBuilder::new(&config, None);
        let err = builder
            .construct(&env, &package_dir, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyPlanError::SdkNotInstalled { version } if version == "9.9.9"));
    }

    #[tokio::test]
    async fn null_sdk_version_yields_an_empty_base_with_package_overlay_only() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::at(dir.path().join("home"));
        let config = config(home);

        let package_dir = dir.path().join("pkg");
        std::fs::create_dir_all(&package_dir).unwrap();
        std::fs::write(
            package_dir.join(PACKAGE_DESCRIPTOR_FILENAME),
            "override-components:\n  meep:\n    local-path: ./meep\n",
        )
        .unwrap();

        let env = AssemblyPlanEnv {
            daml_package: Some(package_dir.clone()),
            ..Default::default()
        };

        let builder: AssemblyPlanBuilder<'_, dpm_registry::mock::MockTransport> = AssemblyPlanBuilder::new(&config, None);
        let plan = builder
            .construct(&env, &package_dir, &CancellationToken::new())
            .await
            .unwrap();

        assert!(plan.sdk_version.is_none());
        assert_eq!(plan.layers.len(), 1);
        assert!(plan.layers[0].components.contains_key("meep"));
    }
}
