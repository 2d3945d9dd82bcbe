//! On-disk cache of fetched records
//!
//! One JSON file per `(identity, region, kind)` under
//! `<cache_dir>/<identity>/<region>/<kind>.json`, with identity and region
//! percent-encoded. Entries are replaced atomically and are only ever read
//! back while younger than their TTL and stored under the requested key.
//! Expired or unreadable entries are treated as absent and left in place
//! until the next write or clear.

use crate::config::DEFAULT_CACHE_TTL;
use crate::error::{CloudError, Result};
use crate::fsutil::{self, path_component};
use crate::model::{ResourceKind, ResourceRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const CACHE_VERSION: u32 = 1;

/// A cached listing for one kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub identity: String,
    pub region: String,
    pub kind: ResourceKind,
    pub written_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub records: Vec<ResourceRecord>,
}

impl CacheEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| self.written_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    fn is_for(&self, identity: &str, region: &str, kind: ResourceKind) -> bool {
        self.identity == identity && self.region == region && self.kind == kind
    }
}

/// Freshness of a single cache slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Valid,
    Absent,
}

/// Metadata for one cache slot, without the records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub kind: ResourceKind,
    pub status: CacheStatus,
    pub written_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub record_count: usize,
}

impl CacheInfo {
    fn absent(kind: ResourceKind) -> Self {
        Self {
            kind,
            status: CacheStatus::Absent,
            written_at: None,
            expires_at: None,
            record_count: 0,
        }
    }
}

/// Aggregate freshness over several kinds for one identity/region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub total_kinds: usize,
    pub valid_entries: usize,
    pub latest_write: Option<DateTime<Utc>>,
    pub earliest_expiry: Option<DateTime<Utc>>,
    pub entries: Vec<CacheInfo>,
}

impl CacheSummary {
    pub fn has_any(&self) -> bool {
        self.valid_entries > 0
    }
}

/// Disk usage of the whole cache directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSize {
    pub entries: usize,
    pub bytes: u64,
}

/// Cache store rooted at a directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn scope_dir(&self, identity: &str, region: &str) -> PathBuf {
        self.root
            .join(path_component(identity))
            .join(path_component(region))
    }

    fn entry_path(&self, identity: &str, region: &str, kind: ResourceKind) -> PathBuf {
        self.scope_dir(identity, region)
            .join(format!("{}.json", kind.slug()))
    }

    /// Read an entry, `None` when missing or unparseable
    async fn read_entry(&self, path: &Path) -> Option<CacheEntry> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read cache entry {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&content) {
            Ok(entry) if entry.version <= CACHE_VERSION => Some(entry),
            Ok(entry) => {
                tracing::warn!(
                    "Ignoring cache entry {} with newer version {}",
                    path.display(),
                    entry.version
                );
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Valid records for a slot, if any
    pub async fn get(
        &self,
        identity: &str,
        region: &str,
        kind: ResourceKind,
    ) -> Option<Vec<ResourceRecord>> {
        self.get_at(identity, region, kind, Utc::now()).await
    }

    pub(crate) async fn get_at(
        &self,
        identity: &str,
        region: &str,
        kind: ResourceKind,
        now: DateTime<Utc>,
    ) -> Option<Vec<ResourceRecord>> {
        let path = self.entry_path(identity, region, kind);
        let entry = self.read_entry(&path).await?;

        if !entry.is_for(identity, region, kind) {
            tracing::warn!(
                "Cache entry {} belongs to {}/{}/{}",
                path.display(),
                entry.identity,
                entry.region,
                entry.kind
            );
            return None;
        }
        if !entry.is_valid_at(now) {
            tracing::debug!("Cache entry for {}/{}/{} expired", identity, region, kind);
            return None;
        }

        tracing::debug!(
            "Cache hit for {}/{}/{} ({} records)",
            identity,
            region,
            kind,
            entry.records.len()
        );
        Some(entry.records)
    }

    /// Replace a slot with fresh records
    pub async fn put(
        &self,
        identity: &str,
        region: &str,
        kind: ResourceKind,
        records: &[ResourceRecord],
    ) -> Result<()> {
        self.put_at(identity, region, kind, records, Utc::now()).await
    }

    pub(crate) async fn put_at(
        &self,
        identity: &str,
        region: &str,
        kind: ResourceKind,
        records: &[ResourceRecord],
        written_at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = CacheEntry {
            version: CACHE_VERSION,
            identity: identity.to_string(),
            region: region.to_string(),
            kind,
            written_at,
            ttl_seconds: self.ttl.as_secs(),
            records: records.to_vec(),
        };
        let content = serde_json::to_vec_pretty(&entry)?;
        let path = self.entry_path(identity, region, kind);

        fsutil::write_atomic(&path, &content).await.map_err(|e| {
            CloudError::CacheIo(format!("failed to write {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            "Cached {} {} records for {}/{}",
            records.len(),
            kind,
            identity,
            region
        );
        Ok(())
    }

    /// Remove entries. `None` matches every identity or region.
    ///
    /// Temp files left by interrupted writes are swept too but not counted.
    /// Returns the number of entries removed.
    pub async fn clear(&self, identity: Option<&str>, region: Option<&str>) -> Result<usize> {
        let identity_dirs = match identity {
            Some(identity) => vec![self.root.join(path_component(identity))],
            None => fsutil::list_dirs(&self.root).await.map_err(clear_error)?,
        };

        let mut removed = 0;
        for identity_dir in identity_dirs {
            let region_dirs = match region {
                Some(region) => vec![identity_dir.join(path_component(region))],
                None => fsutil::list_dirs(&identity_dir).await.map_err(clear_error)?,
            };

            for region_dir in region_dirs {
                for file in fsutil::list_json_files(&region_dir)
                    .await
                    .map_err(clear_error)?
                {
                    if fsutil::remove_if_exists(&file).await.map_err(clear_error)? {
                        removed += 1;
                    }
                }
                fsutil::sweep_temp_files(&region_dir)
                    .await
                    .map_err(clear_error)?;
            }
        }

        tracing::debug!(
            "Cleared {} cache entries (identity: {}, region: {})",
            removed,
            identity.unwrap_or("*"),
            region.unwrap_or("*")
        );
        Ok(removed)
    }

    /// Freshness metadata for one slot
    pub async fn info(&self, identity: &str, region: &str, kind: ResourceKind) -> CacheInfo {
        self.info_at(identity, region, kind, Utc::now()).await
    }

    async fn info_at(
        &self,
        identity: &str,
        region: &str,
        kind: ResourceKind,
        now: DateTime<Utc>,
    ) -> CacheInfo {
        let path = self.entry_path(identity, region, kind);
        match self.read_entry(&path).await {
            Some(entry) if entry.is_for(identity, region, kind) && entry.is_valid_at(now) => {
                CacheInfo {
                    kind,
                    status: CacheStatus::Valid,
                    written_at: Some(entry.written_at),
                    expires_at: Some(entry.expires_at()),
                    record_count: entry.records.len(),
                }
            }
            _ => CacheInfo::absent(kind),
        }
    }

    /// Freshness across several kinds
    pub async fn summary(
        &self,
        identity: &str,
        region: &str,
        kinds: &[ResourceKind],
    ) -> CacheSummary {
        let now = Utc::now();
        let mut entries = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            entries.push(self.info_at(identity, region, kind, now).await);
        }

        CacheSummary {
            total_kinds: kinds.len(),
            valid_entries: entries
                .iter()
                .filter(|e| e.status == CacheStatus::Valid)
                .count(),
            latest_write: entries.iter().filter_map(|e| e.written_at).max(),
            earliest_expiry: entries.iter().filter_map(|e| e.expires_at).min(),
            entries,
        }
    }

    /// Entry count and bytes on disk, valid or not
    pub async fn size(&self) -> Result<CacheSize> {
        let mut size = CacheSize::default();
        for identity_dir in fsutil::list_dirs(&self.root).await.map_err(size_error)? {
            for region_dir in fsutil::list_dirs(&identity_dir).await.map_err(size_error)? {
                for file in fsutil::list_json_files(&region_dir)
                    .await
                    .map_err(size_error)?
                {
                    let metadata = match fs::metadata(&file).await {
                        Ok(metadata) => metadata,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                        Err(e) => return Err(size_error(e)),
                    };
                    size.entries += 1;
                    size.bytes += metadata.len();
                }
            }
        }
        Ok(size)
    }
}

fn clear_error(e: io::Error) -> CloudError {
    CloudError::CacheIo(format!("failed to clear cache: {}", e))
}

fn size_error(e: io::Error) -> CloudError {
    CloudError::CacheIo(format!("failed to measure cache: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn records(kind: ResourceKind, n: usize) -> Vec<ResourceRecord> {
        (0..n)
            .map(|i| ResourceRecord::new(kind, format!("{}-{}", kind.slug(), i)))
            .collect()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());

        cache
            .put("sandbox", "us-east-1", ResourceKind::Ec2, &records(ResourceKind::Ec2, 3))
            .await
            .unwrap();

        let hit = cache.get("sandbox", "us-east-1", ResourceKind::Ec2).await.unwrap();
        assert_eq!(hit.len(), 3);
        assert!(cache.get("sandbox", "us-east-1", ResourceKind::Rds).await.is_none());
        assert!(cache.get("demo", "us-east-1", ResourceKind::Ec2).await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());
        let written_at = Utc::now() - chrono::Duration::hours(48);

        cache
            .put_at("sandbox", "us-east-1", ResourceKind::S3, &records(ResourceKind::S3, 1), written_at)
            .await
            .unwrap();

        let just_before = written_at + chrono::Duration::seconds(86_399);
        let at_ttl = written_at + chrono::Duration::seconds(86_400);

        assert!(
            cache
                .get_at("sandbox", "us-east-1", ResourceKind::S3, just_before)
                .await
                .is_some()
        );
        assert!(
            cache
                .get_at("sandbox", "us-east-1", ResourceKind::S3, at_ttl)
                .await
                .is_none()
        );
        // Written 48h ago, so a plain get is a miss
        assert!(cache.get("sandbox", "us-east-1", ResourceKind::S3).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());
        let path = cache.entry_path("sandbox", "us-east-1", ResourceKind::Lambda);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, "{ not json").await.unwrap();

        assert!(cache.get("sandbox", "us-east-1", ResourceKind::Lambda).await.is_none());

        // A later put repairs the slot
        cache
            .put("sandbox", "us-east-1", ResourceKind::Lambda, &[])
            .await
            .unwrap();
        assert_eq!(
            cache.get("sandbox", "us-east-1", ResourceKind::Lambda).await,
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_clear_with_wildcards() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());
        for (identity, region) in [
            ("sandbox", "us-east-1"),
            ("sandbox", "eu-west-1"),
            ("demo", "us-east-1"),
        ] {
            for kind in [ResourceKind::Ec2, ResourceKind::Rds] {
                cache.put(identity, region, kind, &records(kind, 1)).await.unwrap();
            }
        }

        assert_eq!(cache.clear(Some("sandbox"), Some("eu-west-1")).await.unwrap(), 2);
        assert_eq!(cache.clear(None, Some("us-east-1")).await.unwrap(), 4);
        assert_eq!(cache.clear(None, None).await.unwrap(), 0);
        assert_eq!(cache.size().await.unwrap(), CacheSize::default());
    }

    #[tokio::test]
    async fn test_similar_identities_do_not_share_entries() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());
        cache
            .put("team a", "us-east-1", ResourceKind::Ec2, &records(ResourceKind::Ec2, 3))
            .await
            .unwrap();

        for other in ["team_a", "team/a", "team%20a"] {
            assert!(cache.get(other, "us-east-1", ResourceKind::Ec2).await.is_none());
        }
        assert_eq!(
            cache.get("team a", "us-east-1", ResourceKind::Ec2).await.map(|r| r.len()),
            Some(3)
        );
        assert_eq!(cache.clear(Some("team_a"), None).await.unwrap(), 0);
        assert_eq!(cache.clear(Some("team a"), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entry_under_wrong_key_is_miss() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());
        cache
            .put("demo", "us-east-1", ResourceKind::Rds, &records(ResourceKind::Rds, 2))
            .await
            .unwrap();

        // Copy demo's entry into sandbox's slot
        let from = cache.entry_path("demo", "us-east-1", ResourceKind::Rds);
        let to = cache.entry_path("sandbox", "us-east-1", ResourceKind::Rds);
        fs::create_dir_all(to.parent().unwrap()).await.unwrap();
        fs::copy(&from, &to).await.unwrap();

        assert!(cache.get("sandbox", "us-east-1", ResourceKind::Rds).await.is_none());
        assert_eq!(
            cache.info("sandbox", "us-east-1", ResourceKind::Rds).await.status,
            CacheStatus::Absent
        );
    }

    #[tokio::test]
    async fn test_clear_sweeps_interrupted_writes() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());
        cache
            .put("sandbox", "us-east-1", ResourceKind::S3, &records(ResourceKind::S3, 1))
            .await
            .unwrap();
        let leftover = cache
            .scope_dir("sandbox", "us-east-1")
            .join(".s3.json.4242.7.tmp");
        fs::write(&leftover, "{ half").await.unwrap();

        assert_eq!(cache.clear(None, None).await.unwrap(), 1);
        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn test_clear_missing_root() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path().join("never-created"));
        assert_eq!(cache.clear(None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_summary_and_info() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());
        cache
            .put("sandbox", "us-east-1", ResourceKind::Ec2, &records(ResourceKind::Ec2, 2))
            .await
            .unwrap();

        let info = cache.info("sandbox", "us-east-1", ResourceKind::Ec2).await;
        assert_eq!(info.status, CacheStatus::Valid);
        assert_eq!(info.record_count, 2);

        let summary = cache
            .summary("sandbox", "us-east-1", &ResourceKind::ALL)
            .await;
        assert_eq!(summary.total_kinds, 4);
        assert_eq!(summary.valid_entries, 1);
        assert!(summary.has_any());
        assert_eq!(summary.latest_write, info.written_at);
    }

    #[tokio::test]
    async fn test_size_counts_entries() {
        let temp_dir = tempdir().unwrap();
        let cache = CacheStore::new(temp_dir.path());
        cache
            .put("sandbox", "us-east-1", ResourceKind::Ec2, &records(ResourceKind::Ec2, 2))
            .await
            .unwrap();
        cache
            .put("demo", "ap-northeast-1", ResourceKind::S3, &records(ResourceKind::S3, 1))
            .await
            .unwrap();

        let size = cache.size().await.unwrap();
        assert_eq!(size.entries, 2);
        assert!(size.bytes > 0);
    }
}
