//! Run locks
//!
//! At most one live collection run per `(identity, region)`. The lock is a
//! status file under `<state_dir>/status/` that names the holding process.
//! A lock whose holder is no longer alive is stale and may be reclaimed.
//!
//! Lock storage problems never block a run: unreadable lock files and failed
//! writes are logged and the run proceeds.

use crate::error::{CloudError, Result};
use crate::fsutil::{self, path_component};
use crate::model::ResourceKind;
use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

const STATUS_DIR: &str = "status";
const STATUS_PREFIX: &str = "status_";
/// Create attempts before giving up on a contended lock
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// Lifecycle state recorded in a status file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Contents of a status file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLockRecord {
    pub status: RunStatus,
    pub identity: String,
    pub region: String,
    pub kinds: Vec<ResourceKind>,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
}

impl RunLockRecord {
    fn is_for(&self, identity: &str, region: &str) -> bool {
        self.identity == identity && self.region == region
    }
}

/// Answers whether a process id belongs to a live process
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by `kill(pid, 0)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        // EPERM still means the process exists
        match signal::kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

/// Outcome of [`RunLockRegistry::try_acquire`]
#[derive(Debug)]
pub enum Acquisition {
    Acquired(RunLock),
    /// Another live run holds the lock
    Rejected { holder: RunLockRecord },
}

/// Registry of run locks rooted at a state directory
#[derive(Clone)]
pub struct RunLockRegistry {
    state_dir: PathBuf,
    probe: Arc<dyn ProcessProbe>,
    pid: u32,
}

impl fmt::Debug for RunLockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLockRegistry")
            .field("state_dir", &self.state_dir)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl RunLockRegistry {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            probe: Arc::new(SystemProcessProbe),
            pid: std::process::id(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Record locks under a different process id
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn status_dir(&self) -> PathBuf {
        self.state_dir.join(STATUS_DIR)
    }

    fn lock_path(&self, identity: &str, region: &str) -> PathBuf {
        self.status_dir().join(format!(
            "{}{}@{}.json",
            STATUS_PREFIX,
            path_component(identity),
            path_component(region)
        ))
    }

    /// Read the current lock record, if any
    pub async fn read(&self, identity: &str, region: &str) -> Result<Option<RunLockRecord>> {
        read_record(&self.lock_path(identity, region)).await
    }

    /// Whether a live run currently holds the lock
    pub async fn is_held(&self, identity: &str, region: &str) -> bool {
        match self.read(identity, region).await {
            Ok(Some(record)) => self.is_live(&record, identity, region),
            _ => false,
        }
    }

    fn is_live(&self, record: &RunLockRecord, identity: &str, region: &str) -> bool {
        record.status == RunStatus::Running
            && record.is_for(identity, region)
            && self.probe.is_alive(record.pid)
    }

    /// Try to take the lock for `(identity, region)`
    ///
    /// The status file is created exclusively, so of several runs starting
    /// together exactly one wins. A live holder causes a rejection unless
    /// `force` is set. Stale, corrupt and foreign lock files are reclaimed.
    /// Storage errors fail open.
    pub async fn try_acquire(
        &self,
        identity: &str,
        region: &str,
        kinds: &[ResourceKind],
        force: bool,
    ) -> Acquisition {
        let path = self.lock_path(identity, region);
        let record = RunLockRecord {
            status: RunStatus::Running,
            identity: identity.to_string(),
            region: region.to_string(),
            kinds: kinds.to_vec(),
            started_at: Utc::now(),
            pid: self.pid,
        };

        let content = match serde_json::to_vec_pretty(&record) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to encode run lock: {}", e);
                return Acquisition::Acquired(RunLock::unpersisted(path, record));
            }
        };

        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            match fsutil::write_exclusive(&path, &content).await {
                Ok(()) => {
                    tracing::debug!("Acquired run lock for {}/{}", identity, region);
                    return Acquisition::Acquired(RunLock::persisted(path, record));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to write run lock {}, continuing without it: {}",
                        path.display(),
                        e
                    );
                    return Acquisition::Acquired(RunLock::unpersisted(path, record));
                }
            }

            let current = match fs::read(&path).await {
                Ok(current) => current,
                // Released between our create and read
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable run lock {}: {}", path.display(), e);
                    return Acquisition::Acquired(RunLock::unpersisted(path, record));
                }
            };

            match serde_json::from_slice::<RunLockRecord>(&current) {
                Ok(existing) if self.is_live(&existing, identity, region) => {
                    if !force {
                        tracing::info!(
                            "Run for {}/{} already held by pid {} since {}",
                            identity,
                            region,
                            existing.pid,
                            existing.started_at
                        );
                        return Acquisition::Rejected { holder: existing };
                    }
                    tracing::warn!(
                        "Forcing run lock for {}/{} away from live pid {}",
                        identity,
                        region,
                        existing.pid
                    );
                }
                Ok(existing) => {
                    tracing::warn!(
                        "Reclaiming stale run lock for {}/{} from pid {}",
                        identity,
                        region,
                        existing.pid
                    );
                }
                Err(e) => {
                    tracing::warn!("Replacing corrupt run lock {}: {}", path.display(), e);
                }
            }

            if let Err(e) = fsutil::remove_if_unchanged(&path, &current).await {
                tracing::warn!(
                    "Failed to reclaim run lock {}, continuing without it: {}",
                    path.display(),
                    e
                );
                return Acquisition::Acquired(RunLock::unpersisted(path, record));
            }
        }

        // Another run kept winning the create
        match read_record(&path).await {
            Ok(Some(holder)) if self.is_live(&holder, identity, region) => {
                tracing::info!(
                    "Run lock for {}/{} contended, pid {} holds it",
                    identity,
                    region,
                    holder.pid
                );
                Acquisition::Rejected { holder }
            }
            _ => {
                tracing::warn!(
                    "Run lock {} kept changing, continuing without it",
                    path.display()
                );
                Acquisition::Acquired(RunLock::unpersisted(path, record))
            }
        }
    }

    /// Remove the lock for `(identity, region)` whoever holds it
    ///
    /// Releasing an absent lock is a no-op.
    pub async fn release(&self, identity: &str, region: &str) -> Result<()> {
        let path = self.lock_path(identity, region);
        fsutil::remove_if_exists(&path)
            .await
            .map_err(|e| CloudError::LockIo(format!("failed to remove {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// All status files currently present
    pub async fn list(&self) -> Result<Vec<RunLockRecord>> {
        let files = fsutil::list_json_files(&self.status_dir())
            .await
            .map_err(|e| CloudError::LockIo(e.to_string()))?;

        let mut records = Vec::new();
        for file in files {
            match read_record(&file).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable run lock: {}", e),
            }
        }
        Ok(records)
    }

    /// Remove every status file, returning how many were removed
    pub async fn clear_all(&self) -> Result<usize> {
        let files = fsutil::list_json_files(&self.status_dir())
            .await
            .map_err(|e| CloudError::LockIo(e.to_string()))?;

        let mut removed = 0;
        for file in files {
            let is_status = file
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(STATUS_PREFIX));
            if is_status
                && fsutil::remove_if_exists(&file)
                    .await
                    .map_err(|e| CloudError::LockIo(e.to_string()))?
            {
                removed += 1;
            }
        }

        tracing::debug!("Removed {} status files", removed);
        Ok(removed)
    }
}

async fn read_record(path: &Path) -> Result<Option<RunLockRecord>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CloudError::LockIo(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| CloudError::LockIo(format!("corrupt lock {}: {}", path.display(), e)))
}

/// RAII guard for a run lock
///
/// The lock file is only removed while it still names this guard's run, so a
/// run whose lock was forced away never deletes its successor's lock.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    record: RunLockRecord,
    persisted: bool,
    released: bool,
}

impl RunLock {
    fn persisted(path: PathBuf, record: RunLockRecord) -> Self {
        Self {
            path,
            record,
            persisted: true,
            released: false,
        }
    }

    fn unpersisted(path: PathBuf, record: RunLockRecord) -> Self {
        Self {
            path,
            record,
            persisted: false,
            released: false,
        }
    }

    pub fn record(&self) -> &RunLockRecord {
        &self.record
    }

    /// Whether the lock file was actually written
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    fn owns(&self, current: &RunLockRecord) -> bool {
        current.pid == self.record.pid && current.started_at == self.record.started_at
    }

    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if !self.persisted {
            return Ok(());
        }

        match read_record(&self.path).await? {
            Some(current) if self.owns(&current) => {
                fsutil::remove_if_exists(&self.path).await.map_err(|e| {
                    CloudError::LockIo(format!("failed to remove {}: {}", self.path.display(), e))
                })?;
                tracing::debug!(
                    "Released run lock for {}/{}",
                    self.record.identity,
                    self.record.region
                );
            }
            Some(current) => {
                tracing::warn!(
                    "Run lock for {}/{} now belongs to pid {}, leaving it",
                    self.record.identity,
                    self.record.region,
                    current.pid
                );
            }
            None => {}
        }
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.released || !self.persisted {
            return;
        }
        // Synchronous cleanup for paths that never reached release()
        let owned = std::fs::read(&self.path)
            .ok()
            .and_then(|content| serde_json::from_slice::<RunLockRecord>(&content).ok())
            .is_some_and(|current| self.owns(&current));
        if owned {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeProbe {
        alive: Mutex<HashSet<u32>>,
    }

    impl FakeProbe {
        fn with_alive(pids: &[u32]) -> Arc<Self> {
            Arc::new(Self {
                alive: Mutex::new(pids.iter().copied().collect()),
            })
        }
    }

    impl ProcessProbe for FakeProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }
    }

    const KINDS: &[ResourceKind] = &[ResourceKind::Ec2];

    fn registry(dir: &Path, pid: u32, probe: Arc<FakeProbe>) -> RunLockRegistry {
        RunLockRegistry::new(dir).with_pid(pid).with_probe(probe)
    }

    #[tokio::test]
    async fn test_second_acquire_rejected_while_live() {
        let temp_dir = tempdir().unwrap();
        let probe = FakeProbe::with_alive(&[100, 200]);
        let first = registry(temp_dir.path(), 100, probe.clone());
        let second = registry(temp_dir.path(), 200, probe);

        let Acquisition::Acquired(lock) = first.try_acquire("sandbox", "us-east-1", KINDS, false).await
        else {
            panic!("first acquire should succeed");
        };
        assert!(lock.is_persisted());

        match second.try_acquire("sandbox", "us-east-1", KINDS, false).await {
            Acquisition::Rejected { holder } => assert_eq!(holder.pid, 100),
            Acquisition::Acquired(_) => panic!("second acquire should be rejected"),
        }

        // Other regions are independent
        assert!(matches!(
            second.try_acquire("sandbox", "eu-west-1", KINDS, false).await,
            Acquisition::Acquired(_)
        ));

        lock.release().await.unwrap();
        assert!(matches!(
            second.try_acquire("sandbox", "us-east-1", KINDS, false).await,
            Acquisition::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_stale_lock_reclaimed() {
        let temp_dir = tempdir().unwrap();
        let probe = FakeProbe::with_alive(&[200]);
        let dead = registry(temp_dir.path(), 100, probe.clone());
        let live = registry(temp_dir.path(), 200, probe);

        let Acquisition::Acquired(stale) = dead.try_acquire("sandbox", "us-east-1", KINDS, false).await
        else {
            panic!("acquire should succeed");
        };
        // Simulate a crashed holder: the file stays behind
        std::mem::forget(stale);

        let Acquisition::Acquired(lock) = live.try_acquire("sandbox", "us-east-1", KINDS, false).await
        else {
            panic!("stale lock should be reclaimed");
        };
        assert_eq!(lock.record().pid, 200);
        assert_eq!(
            live.read("sandbox", "us-east-1").await.unwrap().unwrap().pid,
            200
        );
    }

    #[tokio::test]
    async fn test_force_overrides_live_lock() {
        let temp_dir = tempdir().unwrap();
        let probe = FakeProbe::with_alive(&[100, 200]);
        let first = registry(temp_dir.path(), 100, probe.clone());
        let second = registry(temp_dir.path(), 200, probe);

        let Acquisition::Acquired(old) = first.try_acquire("sandbox", "us-east-1", KINDS, false).await
        else {
            panic!("acquire should succeed");
        };
        let Acquisition::Acquired(new) = second.try_acquire("sandbox", "us-east-1", KINDS, true).await
        else {
            panic!("forced acquire should succeed");
        };

        // The displaced holder must not delete its successor's lock
        old.release().await.unwrap();
        assert_eq!(
            second.read("sandbox", "us-east-1").await.unwrap().unwrap().pid,
            200
        );
        new.release().await.unwrap();
        assert!(second.read("sandbox", "us-east-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_lock_fails_open() {
        let temp_dir = tempdir().unwrap();
        let locks = registry(temp_dir.path(), 100, FakeProbe::with_alive(&[100]));
        let path = locks.lock_path("sandbox", "us-east-1");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, "garbage").await.unwrap();

        assert!(matches!(
            locks.try_acquire("sandbox", "us-east-1", KINDS, false).await,
            Acquisition::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_unwritable_state_dir_fails_open() {
        let temp_dir = tempdir().unwrap();
        // A regular file where the state directory should be
        let blocker = temp_dir.path().join("state");
        fs::write(&blocker, "").await.unwrap();
        let locks = registry(&blocker, 100, FakeProbe::with_alive(&[100]));

        let Acquisition::Acquired(lock) = locks.try_acquire("sandbox", "us-east-1", KINDS, false).await
        else {
            panic!("lock failures must not block a run");
        };
        assert!(!lock.is_persisted());
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let locks = registry(temp_dir.path(), 100, FakeProbe::with_alive(&[100]));

        locks.release("sandbox", "us-east-1").await.unwrap();
        let Acquisition::Acquired(_lock) = locks.try_acquire("sandbox", "us-east-1", KINDS, false).await
        else {
            panic!("acquire should succeed");
        };
        locks.release("sandbox", "us-east-1").await.unwrap();
        locks.release("sandbox", "us-east-1").await.unwrap();
        assert!(!locks.is_held("sandbox", "us-east-1").await);
    }

    #[test]
    fn test_drop_removes_owned_lock() {
        let temp_dir = tempdir().unwrap();
        let locks = registry(temp_dir.path(), 100, FakeProbe::with_alive(&[100]));

        let acquisition =
            tokio_test::block_on(locks.try_acquire("sandbox", "us-east-1", KINDS, false));
        let path = locks.lock_path("sandbox", "us-east-1");
        assert!(path.exists());

        drop(acquisition);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let temp_dir = tempdir().unwrap();
        let probe = FakeProbe::with_alive(&[100]);
        let locks = registry(temp_dir.path(), 100, probe);

        for region in ["us-east-1", "eu-west-1"] {
            std::mem::forget(locks.try_acquire("sandbox", region, KINDS, false).await);
        }
        assert_eq!(locks.list().await.unwrap().len(), 2);
        assert_eq!(locks.clear_all().await.unwrap(), 2);
        assert!(locks.list().await.unwrap().is_empty());
    }

    async fn race(dir: &Path, probe: Arc<FakeProbe>) -> usize {
        let first = registry(dir, 1, probe.clone());
        let second = registry(dir, 2, probe);
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.try_acquire("sandbox", "us-east-1", KINDS, false).await }),
            tokio::spawn(async move { second.try_acquire("sandbox", "us-east-1", KINDS, false).await }),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        outcomes
            .iter()
            .filter(|o| matches!(o, Acquisition::Acquired(lock) if lock.is_persisted()))
            .count()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_acquire_has_one_winner() {
        for _ in 0..25 {
            let temp_dir = tempdir().unwrap();
            let winners = race(temp_dir.path(), FakeProbe::with_alive(&[1, 2])).await;
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_reclaim_has_one_winner() {
        for _ in 0..25 {
            let temp_dir = tempdir().unwrap();
            let probe = FakeProbe::with_alive(&[1, 2]);
            let crashed = registry(temp_dir.path(), 9, probe.clone());
            std::mem::forget(crashed.try_acquire("sandbox", "us-east-1", KINDS, false).await);

            let winners = race(temp_dir.path(), probe).await;
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test]
    async fn test_keys_with_separators_do_not_collide() {
        let temp_dir = tempdir().unwrap();
        let probe = FakeProbe::with_alive(&[100, 200]);
        let first = registry(temp_dir.path(), 100, probe.clone());
        let second = registry(temp_dir.path(), 200, probe);

        let Acquisition::Acquired(_held) = first.try_acquire("a_b", "c", KINDS, false).await else {
            panic!("acquire should succeed");
        };
        assert!(matches!(
            second.try_acquire("a", "b_c", KINDS, false).await,
            Acquisition::Acquired(_)
        ));
        assert!(matches!(
            second.try_acquire("a b", "c", KINDS, false).await,
            Acquisition::Acquired(_)
        ));
        assert_ne!(first.lock_path("a_b", "c"), first.lock_path("a", "b_c"));
    }

    #[tokio::test]
    async fn test_record_for_other_key_is_not_held() {
        let temp_dir = tempdir().unwrap();
        let locks = registry(temp_dir.path(), 100, FakeProbe::with_alive(&[100, 200]));
        let foreign = RunLockRecord {
            status: RunStatus::Running,
            identity: "demo".to_string(),
            region: "us-east-1".to_string(),
            kinds: KINDS.to_vec(),
            started_at: Utc::now(),
            pid: 200,
        };
        let path = locks.lock_path("sandbox", "us-east-1");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, serde_json::to_vec(&foreign).unwrap()).await.unwrap();

        assert!(!locks.is_held("sandbox", "us-east-1").await);
        let Acquisition::Acquired(lock) = locks.try_acquire("sandbox", "us-east-1", KINDS, false).await
        else {
            panic!("a lock naming another key should be reclaimed");
        };
        assert!(lock.is_persisted());
        assert_eq!(locks.read("sandbox", "us-east-1").await.unwrap().unwrap().identity, "sandbox");
    }

    #[test]
    fn test_system_probe_sees_self() {
        assert!(SystemProcessProbe.is_alive(std::process::id()));
        assert!(!SystemProcessProbe.is_alive(0));
    }
}
