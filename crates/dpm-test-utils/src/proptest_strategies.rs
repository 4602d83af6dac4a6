//! `proptest` strategies for `dpm-core`'s domain types, backing the
//! round-trip and idempotence properties named in spec section 8. Grounded
//! on the teacher's `flox-test-utils::proptest` module, narrowed from
//! generic TOML-key generators to the specific types this crate needs
//! round-trip coverage for.

use dpm_core::edition::Edition;
use dpm_core::platform::Platform;
use dpm_core::semver::SemVer;
use proptest::prelude::*;

/// Strings containing only alphanumeric characters and `-`/`_`, long
/// enough to stand in for component names, tags, and path segments without
/// needing YAML-escaping.
pub fn alphanum_string(max_size: usize) -> impl Strategy<Value = String> {
    let ranges = vec!['a'..='z', 'A'..='Z', '0'..='9'];
    prop::collection::vec(
        proptest::char::ranges(std::borrow::Cow::Owned(ranges)),
        1..max_size.max(2),
    )
    .prop_map(|v| v.into_iter().collect())
}

/// Arbitrary (not necessarily host-valid) semantic versions: `prerelease`
/// and `build` metadata are exercised since both affect [`SemVer`]'s
/// ordering and serialization.
pub fn semver() -> impl Strategy<Value = SemVer> {
    (0u64..100, 0u64..100, 0u64..100, proptest::option::of(alphanum_string(8))).prop_map(
        |(major, minor, patch, prerelease)| {
            let raw = match prerelease {
                Some(pre) => format!("{major}.{minor}.{patch}-{pre}"),
                None => format!("{major}.{minor}.{patch}"),
            };
            SemVer::parse(&raw).expect("generated version string is valid semver")
        },
    )
}

/// One of the three editions, uniformly.
pub fn edition() -> impl Strategy<Value = Edition> {
    prop_oneof![
        Just(Edition::OpenSource),
        Just(Edition::Enterprise),
        Just(Edition::Private),
    ]
}

/// Platforms drawn from the Go-style `os`/`architecture` vocabulary the
/// registry actually publishes, rather than fully arbitrary strings — a
/// descriptor's `select_platform` behavior only needs to be tested against
/// the pairs that occur in practice.
pub fn platform() -> impl Strategy<Value = Platform> {
    let os = prop_oneof![Just("linux"), Just("darwin"), Just("windows")];
    let architecture = prop_oneof![Just("amd64"), Just("arm64")];
    (os, architecture).prop_map(|(os, architecture)| Platform {
        os: os.to_string(),
        architecture: architecture.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn semver_round_trips_through_its_display_and_parse(v in semver()) {
            let back = SemVer::parse(&v.to_string()).unwrap();
            prop_assert_eq!(v, back);
        }

        #[test]
        fn edition_round_trips_through_its_display_and_from_str(e in edition()) {
            use std::str::FromStr;
            let back = Edition::from_str(&e.to_string()).unwrap();
            prop_assert_eq!(e, back);
        }
    }
}
