use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::volume::{INDEX_FILE, Volume};

/// Format of partition keys and partition directory names.
pub const PARTITION_KEY_FORMAT: &str = "%Y-%m-%d";

/// Partition key for the calendar day (UTC) containing `now`.
pub fn partition_key(now: DateTime<Utc>) -> String {
    now.format(PARTITION_KEY_FORMAT).to_string()
}

/// Summary of one partition, for listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub articles: usize,
}

/// Table of partitions under a data root, keyed by date.
///
/// The registry is the only place partitions are created. Lookups copy the
/// volume handles out and release the table lock before touching any volume.
/// A partition being created is guarded by its own slot in `creating`; the
/// table lock is only taken to insert the finished volume.
#[derive(Debug)]
pub struct Registry {
    root: PathBuf,
    volumes: RwLock<BTreeMap<String, Arc<Volume>>>,
    creating: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl Registry {
    /// Create an empty registry rooted at `root`, creating the directory.
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            volumes: RwLock::new(BTreeMap::new()),
            creating: Mutex::new(BTreeMap::new()),
        })
    }

    /// Open `root` and load every partition found in it.
    ///
    /// Directories that are not named like a date, or have no index, are
    /// ignored. Partitions whose index cannot be read are skipped with a
    /// warning rather than failing startup.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let registry = Self::new(root)?;
        let mut volumes = BTreeMap::new();

        for entry in fs::read_dir(&registry.root)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if NaiveDate::parse_from_str(name, PARTITION_KEY_FORMAT).is_err()
                || !path.join(INDEX_FILE).exists()
            {
                continue;
            }
            match Volume::open(&path) {
                Ok(vol) => {
                    tracing::debug!(partition = name, articles = vol.len(), "loaded partition");
                    volumes.insert(vol.key().to_string(), Arc::new(vol));
                }
                Err(e) => tracing::warn!(dir = ?path, error = %e, "skipping unreadable partition"),
            }
        }

        tracing::info!(root = ?registry.root, partitions = volumes.len(), "opened article store");
        *registry.write_volumes()? = volumes;
        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of known partitions.
    pub fn len(&self) -> usize {
        self.read_volumes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The partition with key `key`, if it exists.
    pub fn get(&self, key: &str) -> Option<Arc<Volume>> {
        self.read_volumes().get(key).cloned()
    }

    /// The partition for the day containing `now`, created if absent.
    ///
    /// Check-then-create runs under the per-key creation slot, so two callers
    /// racing on the first article of a day get the same volume while lookups
    /// in other partitions carry on.
    pub fn current_partition(&self, now: DateTime<Utc>) -> StoreResult<Arc<Volume>> {
        let key = partition_key(now);
        if let Some(vol) = self.get(&key) {
            return Ok(vol);
        }

        let slot = self.creation_slot(&key);
        let _creating = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(vol) = self.get(&key) {
            return Ok(vol);
        }
        let vol = Arc::new(Volume::create(&self.root, &key, now)?);
        self.write_volumes()?.insert(key.clone(), Arc::clone(&vol));
        self.creating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(vol)
    }

    fn creation_slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(creating.entry(key.to_string()).or_default())
    }

    /// Find the partition holding `id`. Newer partitions are searched first.
    pub fn resolve(&self, id: &str) -> Option<Arc<Volume>> {
        let volumes: Vec<Arc<Volume>> = self.read_volumes().values().rev().cloned().collect();
        volumes.into_iter().find(|vol| vol.contains(id))
    }

    /// Summaries of all partitions, newest first.
    pub fn partitions(&self) -> Vec<PartitionSummary> {
        let volumes: Vec<Arc<Volume>> = self.read_volumes().values().rev().cloned().collect();
        volumes
            .iter()
            .map(|vol| PartitionSummary {
                key: vol.key().to_string(),
                created_at: vol.created_at(),
                articles: vol.len(),
            })
            .collect()
    }

    fn read_volumes(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<Volume>>> {
        self.volumes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_volumes(
        &self,
    ) -> StoreResult<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Arc<Volume>>>> {
        self.volumes
            .write()
            .map_err(|_| StoreError::LockPoisoned("partition table"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::ArticleMeta;
    use chrono::{Duration, TimeZone};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn key_is_utc_date() {
        assert_eq!(partition_key(day(7)), "2024-05-07");
        let late = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(partition_key(late), "2024-12-31");
    }

    #[test]
    fn current_partition_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let reg = Registry::new(root.path()).unwrap();

        let a = reg.current_partition(day(1)).unwrap();
        let b = reg.current_partition(day(1) + Duration::hours(5)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn rollover_creates_new_partition() {
        let root = tempfile::tempdir().unwrap();
        let reg = Registry::new(root.path()).unwrap();

        reg.current_partition(day(1)).unwrap();
        let next = reg.current_partition(day(2)).unwrap();
        assert_eq!(next.key(), "2024-05-02");
        assert_eq!(reg.len(), 2);
        assert!(root.path().join("2024-05-02").is_dir());
    }

    #[test]
    fn resolve_finds_owning_partition() {
        let root = tempfile::tempdir().unwrap();
        let reg = Registry::new(root.path()).unwrap();

        reg.current_partition(day(1))
            .unwrap()
            .store_article("old", b"x", ArticleMeta::default())
            .unwrap();
        reg.current_partition(day(2))
            .unwrap()
            .store_article("new", b"y", ArticleMeta::default())
            .unwrap();

        assert_eq!(reg.resolve("old").unwrap().key(), "2024-05-01");
        assert_eq!(reg.resolve("new").unwrap().key(), "2024-05-02");
        assert!(reg.resolve("missing").is_none());
    }

    #[test]
    fn resolve_prefers_newest_partition() {
        let root = tempfile::tempdir().unwrap();
        let reg = Registry::new(root.path()).unwrap();

        for d in [1, 3, 2] {
            reg.current_partition(day(d))
                .unwrap()
                .store_article("dup", format!("{d}").as_bytes(), ArticleMeta::default())
                .unwrap();
        }
        assert_eq!(reg.resolve("dup").unwrap().key(), "2024-05-03");
    }

    #[test]
    fn open_loads_persisted_partitions() {
        let root = tempfile::tempdir().unwrap();
        {
            let reg = Registry::new(root.path()).unwrap();
            reg.current_partition(day(4))
                .unwrap()
                .store_article("a", b"x", ArticleMeta::default())
                .unwrap();
            reg.current_partition(day(5)).unwrap();
        }
        // Noise that must be ignored.
        fs::create_dir(root.path().join("not-a-date")).unwrap();
        fs::create_dir(root.path().join("2024-05-09")).unwrap();
        fs::write(root.path().join("2024-05-10"), b"a file").unwrap();

        let reg = Registry::open(root.path()).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.resolve("a").unwrap().key(), "2024-05-04");

        let keys: Vec<String> = reg.partitions().into_iter().map(|p| p.key).collect();
        assert_eq!(keys, ["2024-05-05", "2024-05-04"]);
    }

    #[test]
    fn open_skips_corrupt_partition() {
        let root = tempfile::tempdir().unwrap();
        let bad = root.path().join("2024-05-06");
        fs::create_dir(&bad).unwrap();
        fs::write(bad.join(INDEX_FILE), b"not json").unwrap();

        let reg = Registry::open(root.path()).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn partition_creation_does_not_block_lookups() {
        let root = tempfile::tempdir().unwrap();
        let reg = Arc::new(Registry::new(root.path()).unwrap());
        reg.current_partition(day(1))
            .unwrap()
            .store_article("old", b"x", ArticleMeta::default())
            .unwrap();

        // Hold the slot for day 2 as a slow creation would.
        let slot = reg.creation_slot("2024-05-02");
        let held = slot.lock().unwrap();
        let creator = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || reg.current_partition(day(2)).unwrap())
        };

        assert_eq!(reg.resolve("old").unwrap().key(), "2024-05-01");
        assert!(reg.get("2024-05-01").is_some());
        assert_eq!(reg.partitions().len(), 1);
        assert!(reg.current_partition(day(1)).is_ok());

        drop(held);
        assert_eq!(creator.join().unwrap().key(), "2024-05-02");
        assert_eq!(reg.len(), 2);
        assert!(reg.creating.lock().unwrap().is_empty());
    }

    #[test]
    fn concurrent_first_ingest_creates_one_partition() {
        let root = tempfile::tempdir().unwrap();
        let reg = Arc::new(Registry::new(root.path()).unwrap());

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let vol = reg.current_partition(day(8)).unwrap();
                    vol.store_article(&format!("id-{i}"), b"body", ArticleMeta::default())
                        .unwrap();
                    vol
                })
            })
            .collect();
        let vols: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(Arc::ptr_eq(&vols[0], &vols[1]));
        assert_eq!(reg.len(), 1);
        let vol = reg.get("2024-05-08").unwrap();
        assert!(vol.contains("id-0") && vol.contains("id-1"));
    }
}
