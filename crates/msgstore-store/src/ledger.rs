//! Per-partition usage statistics.
//!
//! Every partition keeps a `stats.json` sidecar mapping identifier to a
//! [`FileStat`]. The whole file is rewritten on each update, under the
//! partition's ledger lock, so concurrent reads of the same article never lose
//! an increment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::persist::{read_json, write_json_atomic};

/// File name of the ledger inside a partition directory.
pub const STATS_FILE: &str = "stats.json";

/// Usage counters for one article in one partition.
///
/// Ages are milliseconds since the partition was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub read_count: u64,
    pub last_read_ms: u64,
    pub store_age_ms: u64,
}

/// What happened to an article.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageKind {
    Ingested,
    Read,
}

/// Ledger of [`FileStat`] entries for one partition.
#[derive(Debug)]
pub struct StatLedger {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, FileStat>>,
}

impl StatLedger {
    /// Load the ledger stored in `dir`, or start an empty one.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(STATS_FILE);
        let entries = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Apply one usage event to `id` and persist the whole ledger.
    ///
    /// The in-memory entry is updated even if persisting fails; the next
    /// successful persist carries it to disk.
    pub fn record(&self, id: &str, kind: UsageKind, age: Duration) -> StoreResult<FileStat> {
        let age_ms = age.num_milliseconds().max(0) as u64;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned("stat ledger"))?;

        let stat = entries.entry(id.to_string()).or_default();
        match kind {
            UsageKind::Ingested => stat.store_age_ms = age_ms,
            UsageKind::Read => {
                stat.read_count += 1;
                stat.last_read_ms = stat.last_read_ms.max(age_ms);
            }
        }
        let updated = *stat;

        write_json_atomic(&self.path, &*entries)?;
        Ok(updated)
    }

    /// Snapshot of the entry for `id`, if any event was ever recorded.
    pub fn entry(&self, id: &str) -> Option<FileStat> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }

    /// Number of articles with an entry.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
