//! File-backed snapshot cache for raw source rows.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use baugesuche_core::RawRow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::StoreError;

const VISITS_FILE: &str = "visits.json";
const SNAPSHOT_EXT: &str = "json";

/// What a snapshot is cached under: the data source and the date-from bound
/// that was pushed down to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub source_url: String,
    pub date_from: Option<NaiveDate>,
}

impl CacheKey {
    pub fn new(source_url: impl Into<String>, date_from: Option<NaiveDate>) -> Self {
        Self {
            source_url: source_url.into(),
            date_from,
        }
    }

    /// Stable file stem: hex SHA-256 of the URL and date.
    pub fn digest(&self) -> String {
        let date = self.date_from.map(|d| d.to_string()).unwrap_or_default();
        let material = format!("{}\n{}", self.source_url, date);
        let digest = ring::digest::digest(&ring::digest::SHA256, material.as_bytes());
        digest.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Raw rows of one fetch, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: CacheKey,
    pub fetched_at: DateTime<Utc>,
    pub rows: Vec<RawRow>,
}

impl Snapshot {
    /// Whether the snapshot is younger than `max_age` at `now`. No limit means fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
        let Some(max_age) = max_age else {
            return true;
        };
        match (now - self.fetched_at).to_std() {
            Ok(age) => age <= max_age,
            // Fetched "in the future": clock skew, treat as fresh.
            Err(_) => true,
        }
    }
}

/// Snapshot directory. Invalidation is always explicit; nothing is evicted
/// behind the caller's back.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (and create if needed) a snapshot directory.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{SNAPSHOT_EXT}", key.digest()))
    }

    /// Whether a snapshot exists for `key`, fresh or not.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.snapshot_path(key).is_file()
    }

    /// Read the snapshot for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Result<Option<Snapshot>, StoreError> {
        let path = self.snapshot_path(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(snapshot))
    }

    /// Read the snapshot for `key` only if it is fresh at `now`.
    pub fn get_fresh(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
        max_age: Option<Duration>,
    ) -> Result<Option<Snapshot>, StoreError> {
        let snapshot = self.get(key)?;
        match snapshot {
            Some(s) if s.is_fresh(now, max_age) => {
                info!(url = %key.source_url, rows = s.rows.len(), "cache hit");
                Ok(Some(s))
            }
            Some(_) => {
                info!(url = %key.source_url, "cache entry stale");
                Ok(None)
            }
            None => {
                debug!(url = %key.source_url, "cache miss");
                Ok(None)
            }
        }
    }

    /// Store `rows` for `key`, replacing any previous snapshot atomically.
    pub fn put(
        &self,
        key: &CacheKey,
        rows: Vec<RawRow>,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, StoreError> {
        let snapshot = Snapshot {
            key: key.clone(),
            fetched_at: now,
            rows,
        };
        let path = self.snapshot_path(key);
        self.write_atomic(&path, &serde_json::to_vec(&snapshot)?)?;
        info!(url = %key.source_url, rows = snapshot.rows.len(), "cached snapshot");
        Ok(snapshot)
    }

    /// Drop the snapshot for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let path = self.snapshot_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(url = %key.source_url, "invalidated snapshot");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Drop every snapshot. Visit counts are kept. Returns the number removed.
    pub fn invalidate_all(&self) -> Result<usize, StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut removed = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            let is_snapshot = path.extension().is_some_and(|e| e == SNAPSHOT_EXT)
                && path.file_name().is_some_and(|n| n != VISITS_FILE);
            if is_snapshot {
                std::fs::remove_file(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                removed += 1;
            }
        }
        info!(removed, "invalidated all snapshots");
        Ok(removed)
    }

    /// Record that a visit saw `count` permits for `key` and return how many
    /// are new since the previous visit (0 when the count did not grow).
    ///
    /// The first visit counts against zero, so every permit is new.
    pub fn record_visit(&self, key: &CacheKey, count: usize) -> Result<usize, StoreError> {
        let path = self.dir.join(VISITS_FILE);
        let mut visits: BTreeMap<String, usize> = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let previous = visits.insert(key.digest(), count).unwrap_or(0);
        self.write_atomic(&path, &serde_json::to_vec(&visits)?)?;
        Ok(count.saturating_sub(previous))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn rows() -> Vec<RawRow> {
        vec![
            RawRow::new().with("Projektname", "Garage").with("Ort", "Bern"),
            RawRow::new().with("Projektname", "Anbau").with("Eingangsdatum", 1_748_736_000_000i64),
        ]
    }

    fn key() -> CacheKey {
        CacheKey::new("https://example.org/query", NaiveDate::from_ymd_opt(2025, 5, 1))
    }

    #[test]
    fn digest_depends_on_url_and_date() {
        let a = key();
        let b = CacheKey::new("https://example.org/query", NaiveDate::from_ymd_opt(2025, 5, 2));
        let c = CacheKey::new("https://example.org/other", a.date_from);
        assert_eq!(a.digest(), key().digest());
        assert_eq!(a.digest().len(), 64);
        assert_ne!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn open_creates_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("cache");
        let store = SnapshotStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
        assert!(!store.contains(&key()));
    }

    #[test]
    fn put_then_get() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        assert!(store.get(&key()).unwrap().is_none());

        store.put(&key(), rows(), now()).unwrap();
        let snapshot = store.get(&key()).unwrap().unwrap();
        assert_eq!(snapshot.rows, rows());
        assert_eq!(snapshot.fetched_at, now());
        assert_eq!(snapshot.key, key());
    }

    #[test]
    fn stale_snapshot_is_a_miss() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        store.put(&key(), rows(), now()).unwrap();

        let later = now() + chrono::Duration::minutes(30);
        let hour = Some(Duration::from_secs(3600));
        let ten_min = Some(Duration::from_secs(600));
        assert!(store.get_fresh(&key(), later, hour).unwrap().is_some());
        assert!(store.get_fresh(&key(), later, ten_min).unwrap().is_none());
        assert!(store.get_fresh(&key(), later, None).unwrap().is_some());
        // Stale entries are not deleted.
        assert!(store.contains(&key()));
    }

    #[test]
    fn invalidate_single_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        let other = CacheKey::new("https://example.org/other", None);
        store.put(&key(), rows(), now()).unwrap();
        store.put(&other, rows(), now()).unwrap();

        assert!(store.invalidate(&key()).unwrap());
        assert!(!store.invalidate(&key()).unwrap());
        assert!(!store.contains(&key()));
        assert!(store.contains(&other));
    }

    #[test]
    fn invalidate_all_keeps_visit_counts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        store.put(&key(), rows(), now()).unwrap();
        store.put(&CacheKey::new("u", None), rows(), now()).unwrap();
        store.record_visit(&key(), 2).unwrap();

        assert_eq!(store.invalidate_all().unwrap(), 2);
        assert!(!store.contains(&key()));
        assert_eq!(store.record_visit(&key(), 5).unwrap(), 3);
    }

    #[test]
    fn visits_report_growth_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        assert_eq!(store.record_visit(&key(), 10).unwrap(), 10);
        assert_eq!(store.record_visit(&key(), 10).unwrap(), 0);
        assert_eq!(store.record_visit(&key(), 13).unwrap(), 3);
        assert_eq!(store.record_visit(&key(), 7).unwrap(), 0);
        assert_eq!(store.record_visit(&key(), 8).unwrap(), 1);
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        std::fs::write(tmp.path().join(format!("{}.json", key().digest())), b"{not json").unwrap();
        assert!(matches!(store.get(&key()), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn reopen_sees_previous_snapshots() {
        let tmp = tempfile::TempDir::new().unwrap();
        {
            let store = SnapshotStore::open(tmp.path()).unwrap();
            store.put(&key(), rows(), now()).unwrap();
        }
        let store = SnapshotStore::open(tmp.path()).unwrap();
        assert_eq!(store.get(&key()).unwrap().unwrap().rows.len(), 2);
    }
}
