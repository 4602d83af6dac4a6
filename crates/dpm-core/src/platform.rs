//! The `(os, architecture)` pair a registry descriptor is built for, and
//! the selection policy used to pick a descriptor for the running host.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
}

impl Platform {
    /// The platform of the host this process is currently running on,
    /// expressed with Go-style `GOOS`/`GOARCH` names since that's the
    /// vocabulary every published index annotates its descriptors with.
    pub fn host() -> Self {
        Self {
            os: go_os().to_string(),
            architecture: go_arch().to_string(),
        }
    }
}

fn go_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn go_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// The outcome of selecting among a set of per-platform descriptors.
#[derive(Debug, thiserror::Error)]
pub enum PlatformSelectionError {
    #[error(
        "no descriptor matches platform {wanted:?}; available platforms: {}",
        available.iter().map(|p| format!("{}/{}", p.os, p.architecture)).collect::<Vec<_>>().join(", ")
    )]
    NoMatch {
        wanted: Platform,
        available: Vec<Platform>,
    },
}

/// Select the descriptor matching `wanted` exactly; failing that, the sole
/// platform-less ("generic") descriptor if there is exactly one; failing
/// that, an error listing every platform that *was* on offer.
pub fn select_platform<'a, T>(
    wanted: &Platform,
    candidates: &'a [(Option<Platform>, T)],
) -> Result<&'a T, PlatformSelectionError> {
    if let Some((_, value)) = candidates
        .iter()
        .find(|(p, _)| p.as_ref() == Some(wanted))
    {
        return Ok(value);
    }

    let generic: Vec<_> = candidates.iter().filter(|(p, _)| p.is_none()).collect();
    if generic.len() == 1 {
        return Ok(&generic[0].1);
    }

    Err(PlatformSelectionError::NoMatch {
        wanted: wanted.clone(),
        available: candidates.iter().filter_map(|(p, _)| p.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(os: &str, arch: &str) -> Platform {
        Platform {
            os: os.to_string(),
            architecture: arch.to_string(),
        }
    }

    #[test]
    fn exact_match_wins_over_generic() {
        let candidates = vec![
            (Some(p("linux", "amd64")), "linux-build"),
            (None, "generic-build"),
        ];
        let chosen = select_platform(&p("linux", "amd64"), &candidates).unwrap();
        assert_eq!(*chosen, "linux-build");
    }

    #[test]
    fn falls_back_to_sole_generic_descriptor() {
        let candidates = vec![(None, "generic-build")];
        let chosen = select_platform(&p("linux", "arm64"), &candidates).unwrap();
        assert_eq!(*chosen, "generic-build");
    }

    #[test]
    fn errors_listing_available_platforms_when_nothing_matches() {
        let candidates = vec![
            (Some(p("linux", "amd64")), "a"),
            (Some(p("darwin", "arm64")), "b"),
        ];
        let err = select_platform(&p("windows", "amd64"), &candidates).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("linux/amd64"));
        assert!(msg.contains("darwin/arm64"));
    }
}
