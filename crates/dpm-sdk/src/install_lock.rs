//! Install Lock (spec 4.H): a single advisory file lock guarding every
//! cache-mutating operation (SDK install, component pull, lockfile
//! write). Grounded on the file-lock pattern in
//! `examples/flox-flox/crates/flox-rust-sdk/src/models/user_state.rs` and
//! spec 5's cancellation-over-long-I/O policy.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use fslock::LockFile;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum InstallLockError {
    #[error("failed to open lock file at {path}: {source}", path = path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to acquire lock at {path}: {source}", path = path.display())]
    Acquire {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cancelled while waiting for the install lock at {path}", path = path.display())]
    Cancelled { path: PathBuf },
}

/// The single global mutex for cache mutation (spec 5, "Shared
/// resources"). One `InstallLock` wraps one well-known path, typically
/// `<home>/cache/sdk/.lock`.
pub struct InstallLock {
    path: PathBuf,
}

impl InstallLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Try to acquire immediately; if contended, log once and poll every
    /// 100ms until acquired or `cancel` fires. Runs `action` with the
    /// held lock once acquired, and releases on every exit path (the
    /// `LockFile` is dropped at the end of `action`, regardless of
    /// whether it returned normally).
    ///
    /// Cancellation during the wait surfaces as
    /// [`InstallLockError::Cancelled`]; cancellation during `action`
    /// itself is `action`'s own responsibility to honor, since the
    /// critical section is already entered.
    #[instrument(skip(self, cancel, action))]
    pub async fn with_lock<F, Fut, T>(&self, cancel: &CancellationToken, action: F) -> Result<T, InstallLockError>
    where
        F: FnOnce(LockFile) -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| InstallLockError::Open {
                path: self.path.clone(),
                source,
            })?;
        }

        let mut lock_file = LockFile::open(&self.path).map_err(|source| InstallLockError::Open {
            path: self.path.clone(),
            source,
        })?;

        let acquired = lock_file.try_lock().map_err(|source| InstallLockError::Acquire {
            path: self.path.clone(),
            source,
        })?;

        if !acquired {
            info!(path = %self.path.display(), "waiting for install lock");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(InstallLockError::Cancelled { path: self.path.clone() });
                    }
                    _ = tokio::time::sleep(POLL_INTERVAL) => {
                        let acquired = lock_file.try_lock().map_err(|source| InstallLockError::Acquire {
                            path: self.path.clone(),
                            source,
                        })?;
                        if acquired {
                            break;
                        }
                    }
                }
            }
        }

        Ok(action(lock_file).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_action_while_holding_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = InstallLock::new(dir.path().join("sdk/.lock"));
        let cancel = CancellationToken::new();

        let result = lock.with_lock(&cancel, |_guard| async { 42 }).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn a_second_acquisition_after_release_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let lock = InstallLock::new(dir.path().join("sdk/.lock"));
        let cancel = CancellationToken::new();

        lock.with_lock(&cancel, |_guard| async {}).await.unwrap();
        lock.with_lock(&cancel, |_guard| async {}).await.unwrap();
    }

    #[tokio::test]
    async fn cancelling_before_acquisition_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdk/.lock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut holder = LockFile::open(&path).unwrap();
        assert!(holder.try_lock().unwrap());

        let lock = InstallLock::new(&path);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = lock.with_lock(&cancel, |_guard| async {}).await.unwrap_err();
        assert!(matches!(err, InstallLockError::Cancelled { .. }));

        holder.unlock().unwrap();
    }
}
