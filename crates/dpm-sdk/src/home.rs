//! Resolves `<home>`, the root directory every other operation reads and
//! writes state under (spec section 6, "On-disk layout"). Grounded on
//! `examples/original_source/pkg/assistantconfig/config.go`'s
//! `getDamlHomePath`/`getAppUserDataDirectory`.

use std::env;
use std::path::PathBuf;

use dpm_core::Edition;

#[derive(Debug, thiserror::Error)]
pub enum HomeError {
    #[error("{0} environment variable is not set")]
    MissingEnvVar(&'static str),
}

/// The resolved `<home>` directory, plus every subpath the on-disk layout
/// table names.
#[derive(Debug, Clone)]
pub struct Home {
    pub root: PathBuf,
}

impl Home {
    /// `DPM_HOME` if set, else `$APPDATA/dpm` on Windows or `$HOME/.dpm`
    /// everywhere else.
    pub fn resolve() -> Result<Self, HomeError> {
        if let Ok(root) = env::var("DPM_HOME") {
            return Ok(Self::at(root));
        }
        Ok(Self { root: default_user_data_dir()? })
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn components_dir(&self) -> PathBuf {
        self.cache_dir().join("components")
    }

    pub fn dars_dir(&self) -> PathBuf {
        self.cache_dir().join("dars")
    }

    pub fn oci_layout_dir(&self) -> PathBuf {
        dpm_registry::default_blob_cache_dir(&self.root)
    }

    pub fn sdk_manifests_dir(&self) -> PathBuf {
        self.cache_dir().join("sdk")
    }

    pub fn sdk_manifests_dir_for(&self, edition: Edition) -> PathBuf {
        self.sdk_manifests_dir().join(edition.to_string())
    }

    pub fn sdk_manifest_path(&self, edition: Edition, version: &str) -> PathBuf {
        self.sdk_manifests_dir_for(edition).join(format!("{version}.yaml"))
    }

    pub fn install_lock_path(&self) -> PathBuf {
        self.sdk_manifests_dir().join(".lock")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("dpm-config.yaml")
    }

    pub fn component_path(&self, name: &str, version: &str) -> PathBuf {
        self.components_dir().join(name).join(version)
    }

    /// `<home>/bin/dpm` on POSIX, `<home>/bin/dpm.cmd` on Windows (spec
    /// 4.I).
    pub fn assistant_link_path(&self) -> PathBuf {
        let name = if cfg!(windows) { "dpm.cmd" } else { "dpm" };
        self.bin_dir().join(name)
    }

    /// Create every directory the on-disk layout table names, including
    /// the per-edition SDK-manifest subdirectories (grounded on
    /// `assistantconfig.Config.EnsureDirs`).
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.bin_dir(), self.oci_layout_dir(), self.dars_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        for edition in [Edition::OpenSource, Edition::Enterprise, Edition::Private] {
            std::fs::create_dir_all(self.sdk_manifests_dir_for(edition))?;
        }
        Ok(())
    }
}

fn default_user_data_dir() -> Result<PathBuf, HomeError> {
    if cfg!(windows) {
        let appdata = env::var("APPDATA").map_err(|_| HomeError::MissingEnvVar("APPDATA"))?;
        Ok(PathBuf::from(appdata).join("dpm"))
    } else {
        let home = env::var("HOME").map_err(|_| HomeError::MissingEnvVar("HOME"))?;
        Ok(PathBuf::from(home).join(".dpm"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_the_on_disk_table() {
        let home = Home::at("/home/user/.dpm");
        assert_eq!(home.bin_dir(), PathBuf::from("/home/user/.dpm/bin"));
        assert_eq!(
            home.components_dir(),
            PathBuf::from("/home/user/.dpm/cache/components")
        );
        assert_eq!(home.dars_dir(), PathBuf::from("/home/user/.dpm/cache/dars"));
        assert_eq!(
            home.oci_layout_dir(),
            PathBuf::from("/home/user/.dpm/cache/oci-layout")
        );
        assert_eq!(
            home.sdk_manifests_dir_for(Edition::OpenSource),
            PathBuf::from("/home/user/.dpm/cache/sdk/open-source")
        );
        assert_eq!(
            home.install_lock_path(),
            PathBuf::from("/home/user/.dpm/cache/sdk/.lock")
        );
        assert_eq!(
            home.config_path(),
            PathBuf::from("/home/user/.dpm/dpm-config.yaml")
        );
    }
}
