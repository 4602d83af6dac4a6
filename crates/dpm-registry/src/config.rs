//! Configuration for registry client construction: the registry endpoint,
//! plaintext-transport toggle, and credentials file, each overridable by
//! the environment variables named in spec section 6.

use std::path::PathBuf;

pub const DEFAULT_REGISTRY_ENDPOINT: &str = "https://registry.digitalasset.com";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL for the registry's distribution API. Overridden by
    /// `DPM_REGISTRY`.
    pub endpoint: String,
    /// Allow plaintext (http://) transport. Set via `DPM_INSECURE_REGISTRY`.
    pub insecure: bool,
    /// Path to a credentials file. Falls back to the host container
    /// tooling's own credential store when unset.
    pub auth_file: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REGISTRY_ENDPOINT.to_string(),
            insecure: false,
            auth_file: None,
        }
    }
}

impl RegistryConfig {
    /// Build a config from the recognized environment variables, falling
    /// back to defaults for anything unset. `dpm-sdk::DpmConfig` builds its
    /// own `RegistryConfig` by layering these same variables over a config
    /// file via the `config` crate rather than calling this directly; this
    /// stays as the plain env-only constructor for embedders that want the
    /// registry client without the rest of `DpmConfig`'s layering.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("DPM_REGISTRY") {
            config.endpoint = endpoint;
        }
        if std::env::var("DPM_INSECURE_REGISTRY").is_ok_and(|v| is_truthy(&v)) {
            config.insecure = true;
        }
        if let Ok(path) = std::env::var("DPM_REGISTRY_AUTH") {
            config.auth_file = Some(PathBuf::from(path));
        }
        config
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_is_https() {
        assert!(RegistryConfig::default().endpoint.starts_with("https://"));
    }

    #[test]
    fn is_truthy_accepts_common_spellings() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            assert!(is_truthy(v), "{v} should be truthy");
        }
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
