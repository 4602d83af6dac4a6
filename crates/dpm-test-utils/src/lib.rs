//! Shared test scaffolding for the `dpm` workspace: fixture manifests
//! (spec 3), a seeded in-memory registry builder over
//! [`dpm_registry::mock::MockTransport`], and `proptest` strategies for
//! the domain types in `dpm-core`. Grounded on the teacher's
//! `flox-test-utils` crate, reduced to what a content-addressed
//! component registry needs rather than a Nix-shelling-out test harness.

pub mod fixtures;
pub mod manifests;
pub mod proptest_strategies;

use std::path::Path;

use tempfile::TempDir;

/// A scratch `<home>` directory that cleans itself up on drop, for tests
/// that need a real filesystem (cache layout, lockfile round-trips,
/// install-lock contention) rather than an in-memory double. Callers
/// build their own `dpm_sdk::home::Home::at(test_home.path())` from it —
/// this crate can't depend on `dpm-sdk` without a cycle, since
/// `dpm-sdk`'s own tests depend on this crate.
pub struct TestHome {
    dir: TempDir,
}

impl TestHome {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create a temp dir for a test home"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TestHome {
    fn default() -> Self {
        Self::new()
    }
}
