//! Cross-process coordination between the daily and monthly update jobs.
//!
//! Both jobs rewrite the same index files, so only one may run its write
//! phase at a time. Coordination is by advisory marker files: presence of a
//! role's lock file means that role is running. There is no TTL or
//! staleness detection; a crashed process leaves its lock behind and the
//! file has to be removed by hand before the role can run again. The file's
//! timestamp content is purely diagnostic.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Daily,
    Monthly,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }

    #[must_use]
    pub const fn peer(self) -> Self {
        match self {
            Self::Daily => Self::Monthly,
            Self::Monthly => Self::Daily,
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquireError {
    /// Our own lock file already exists: another instance of this role is
    /// running. A normal skip, not a failure.
    #[error("another {role} updater instance is already running")]
    AlreadyRunning { role: &'static str },

    /// The peer's lock never cleared within the wait budget.
    #[error("{peer} updater still running after {attempts} waits plus extended backoff")]
    PeerBusy { peer: &'static str, attempts: u32 },

    /// Could not create our own lock file; nothing may run without it.
    #[error("failed to create lock file: {0}")]
    Lock(#[from] std::io::Error),
}

pub struct Coordinator {
    role: Role,
    own_lock: PathBuf,
    peer_lock: PathBuf,
    wait: Duration,
    max_wait_attempts: u32,
    extended_wait: Duration,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        role: Role,
        own_lock: &Path,
        peer_lock: &Path,
        wait: Duration,
        max_wait_attempts: u32,
        extended_wait: Duration,
    ) -> Self {
        Self {
            role,
            own_lock: own_lock.to_path_buf(),
            peer_lock: peer_lock.to_path_buf(),
            wait,
            max_wait_attempts,
            extended_wait,
        }
    }

    /// Waits out the peer role, then takes this role's lock.
    ///
    /// The peer is polled up to `max_wait_attempts` times at `wait`
    /// intervals, followed by a single extended backoff and one final
    /// check. Our own lock file is only ever written after the peer is
    /// clear, so giving up leaves no trace.
    pub async fn acquire(&self) -> Result<RunLock, AcquireError> {
        if self.own_lock.exists() {
            warn!(role = self.role.as_str(), "Lock file already present, skipping run");
            return Err(AcquireError::AlreadyRunning {
                role: self.role.as_str(),
            });
        }

        let peer = self.role.peer().as_str();
        let mut attempts = 0;
        while self.peer_lock.exists() {
            if attempts == self.max_wait_attempts {
                warn!(
                    peer,
                    "Maximum wait attempts reached, delaying for {}s",
                    self.extended_wait.as_secs()
                );
                tokio::time::sleep(self.extended_wait).await;

                if self.peer_lock.exists() {
                    error!(peer, "Peer updater still running after extended wait, giving up");
                    return Err(AcquireError::PeerBusy {
                        peer,
                        attempts: self.max_wait_attempts,
                    });
                }
                break;
            }

            attempts += 1;
            warn!(
                peer,
                attempt = attempts,
                max = self.max_wait_attempts,
                "Peer updater is running, waiting {}s",
                self.wait.as_secs()
            );
            tokio::time::sleep(self.wait).await;
        }

        fs::write(&self.own_lock, chrono::Local::now().to_rfc3339())?;
        info!(role = self.role.as_str(), path = %self.own_lock.display(), "Lock acquired");

        Ok(RunLock {
            path: self.own_lock.clone(),
            released: false,
        })
    }
}

/// Held for the duration of a run; removing the lock file on drop
/// guarantees release on every exit path, including panics.
pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Lock released"),
            Err(e) => error!(path = %self.path.display(), error = %e, "Failed to remove lock file"),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(dir: &Path, wait_ms: u64, attempts: u32) -> Coordinator {
        Coordinator::new(
            Role::Daily,
            &dir.join("daily.lock"),
            &dir.join("monthly.lock"),
            Duration::from_millis(wait_ms),
            attempts,
            Duration::from_millis(wait_ms * 4),
        )
    }

    #[tokio::test]
    async fn acquire_writes_and_release_removes_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), 10, 1);

        let lock = coordinator.acquire().await.unwrap();
        assert!(dir.path().join("daily.lock").exists());

        lock.release();
        assert!(!dir.path().join("daily.lock").exists());
    }

    #[tokio::test]
    async fn own_lock_present_means_already_running() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("daily.lock"), "x").unwrap();

        let coordinator = coordinator(dir.path(), 10, 1);
        assert!(matches!(
            coordinator.acquire().await,
            Err(AcquireError::AlreadyRunning { .. })
        ));
        // The pre-existing file is not ours to clean up.
        assert!(dir.path().join("daily.lock").exists());
    }

    #[tokio::test]
    async fn gives_up_after_budget_without_creating_own_lock() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("monthly.lock"), "x").unwrap();

        let coordinator = coordinator(dir.path(), 5, 3);
        let start = std::time::Instant::now();
        let result = coordinator.acquire().await;

        assert!(matches!(
            result,
            Err(AcquireError::PeerBusy { attempts: 3, .. })
        ));
        // Three regular waits (5ms) plus one extended wait (20ms).
        assert!(start.elapsed() >= Duration::from_millis(35));
        assert!(!dir.path().join("daily.lock").exists());
    }

    #[tokio::test]
    async fn proceeds_once_peer_clears_during_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let peer_lock = dir.path().join("monthly.lock");
        fs::write(&peer_lock, "x").unwrap();

        let coordinator = coordinator(dir.path(), 50, 5);
        let remover = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            fs::remove_file(&peer_lock).unwrap();
        });

        let lock = coordinator.acquire().await.unwrap();
        remover.await.unwrap();
        lock.release();
    }

    #[tokio::test]
    async fn dropping_the_lock_releases_it() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), 10, 1);

        {
            let _lock = coordinator.acquire().await.unwrap();
            assert!(dir.path().join("daily.lock").exists());
        }
        assert!(!dir.path().join("daily.lock").exists());
    }
}
