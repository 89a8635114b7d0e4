//! One date partition on disk.
//!
//! A volume is a directory named after its partition key holding one
//! `<identifier>.txt` file per article, an `index.json` listing the
//! identifiers it owns with their attributes, and the `stats.json` ledger.
//!
//! Write order for a new article is file, then index. An identifier only
//! becomes visible through [`Volume::contains`] once the index holding it has
//! been persisted, so a reader never opens a file that is still being written.
//! A crash between the two steps leaves an orphan file that the index does not
//! mention, which is harmless.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};
use crate::ledger::StatLedger;
use crate::persist::{read_json, write_json_atomic};

/// File name of the index inside a partition directory.
pub const INDEX_FILE: &str = "index.json";

/// Extension of stored article files.
pub const ARTICLE_EXTENSION: &str = "txt";

/// Caller-supplied attributes attached to an article at ingest time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMeta {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ArticleMeta {
    pub fn new(attributes: BTreeMap<String, String>) -> Self {
        Self { attributes }
    }
}

/// On-disk shape of `index.json`.
#[derive(Deserialize)]
struct IndexFile {
    partition: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    articles: BTreeMap<String, ArticleMeta>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    partition: &'a str,
    created_at: &'a DateTime<Utc>,
    articles: &'a BTreeMap<String, ArticleMeta>,
}

#[derive(Default)]
struct IndexState {
    /// Articles whose file and index entry are both durable.
    articles: BTreeMap<String, ArticleMeta>,
    /// Identifiers claimed by an ingest that has not committed yet.
    pending: HashSet<String>,
}

/// Result of [`Volume::store_article`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insert {
    Stored,
    Duplicate,
}

/// Returns `true` if `id` can name a file directly inside a partition
/// directory.
pub fn is_storable_identifier(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

/// A date partition: its directory, index and usage ledger.
pub struct Volume {
    key: String,
    base_dir: PathBuf,
    created_at: DateTime<Utc>,
    index: RwLock<IndexState>,
    ledger: StatLedger,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("key", &self.key)
            .field("base_dir", &self.base_dir)
            .field("created_at", &self.created_at)
            .field("articles", &self.len())
            .finish()
    }
}

impl Volume {
    /// Create the partition `key` under `root`.
    ///
    /// If the directory already holds an index for `key` (a previous process
    /// created it), that index is loaded instead of being replaced.
    pub fn create(root: &Path, key: &str, now: DateTime<Utc>) -> StoreResult<Self> {
        let base_dir = root.join(key);
        fs::create_dir_all(&base_dir)?;
        if base_dir.join(INDEX_FILE).exists() {
            return Self::open(&base_dir);
        }

        let volume = Self {
            key: key.to_string(),
            ledger: StatLedger::open(&base_dir)?,
            base_dir,
            created_at: now,
            index: RwLock::new(IndexState::default()),
        };
        volume.persist_index(&BTreeMap::new())?;
        tracing::info!(partition = key, dir = ?volume.base_dir, "created partition");
        Ok(volume)
    }

    /// Load an existing partition directory.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        let index_path = dir.join(INDEX_FILE);
        let file: IndexFile = read_json(&index_path)?.ok_or_else(|| StoreError::CorruptIndex {
            path: index_path.clone(),
            reason: "index file missing".into(),
        })?;

        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if file.partition != dir_name {
            return Err(StoreError::CorruptIndex {
                path: index_path,
                reason: format!(
                    "index names partition {:?} but lives in {:?}",
                    file.partition, dir_name
                ),
            });
        }

        Ok(Self {
            key: file.partition,
            base_dir: dir.to_path_buf(),
            created_at: file.created_at,
            ledger: StatLedger::open(dir)?,
            index: RwLock::new(IndexState {
                articles: file.articles,
                pending: HashSet::new(),
            }),
        })
    }

    /// The partition key (`YYYY-MM-DD`).
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time elapsed since the partition was created.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// The usage ledger of this partition.
    pub fn ledger(&self) -> &StatLedger {
        &self.ledger
    }

    /// Path of the file holding `id`.
    pub fn article_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}.{ARTICLE_EXTENSION}"))
    }

    /// Returns `true` if `id` is committed to this partition.
    pub fn contains(&self, id: &str) -> bool {
        self.read_index().articles.contains_key(id)
    }

    /// Attributes stored with `id`.
    pub fn meta(&self, id: &str) -> Option<ArticleMeta> {
        self.read_index().articles.get(id).cloned()
    }

    /// Number of committed articles.
    pub fn len(&self) -> usize {
        self.read_index().articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a new article.
    ///
    /// The identifier is claimed under the index lock, so of two concurrent
    /// calls with the same `id` exactly one gets [`Insert::Stored`]. The body
    /// is then written without holding the lock. Finally the entry is
    /// committed and the index persisted; if any step fails the claim is
    /// released and nothing of the article remains visible.
    pub fn store_article(&self, id: &str, body: &[u8], meta: ArticleMeta) -> StoreResult<Insert> {
        {
            let mut index = self.write_index()?;
            if index.articles.contains_key(id) || index.pending.contains(id) {
                return Ok(Insert::Duplicate);
            }
            index.pending.insert(id.to_string());
        }

        let path = self.article_path(id);
        if let Err(e) = self.write_body(&path, body) {
            self.release(id);
            return Err(e);
        }

        self.commit(id, &path, meta)?;
        Ok(Insert::Stored)
    }

    /// Move a claimed `id` into the index and persist it. On failure the
    /// claim is dropped and the article file at `path` removed.
    fn commit(&self, id: &str, path: &Path, meta: ArticleMeta) -> StoreResult<()> {
        let mut index = match self.write_index() {
            Ok(index) => index,
            Err(e) => {
                self.release(id);
                discard(id, path);
                return Err(e);
            }
        };
        index.pending.remove(id);
        index.articles.insert(id.to_string(), meta);
        if let Err(e) = self.persist_index(&index.articles) {
            index.articles.remove(id);
            drop(index);
            discard(id, path);
            return Err(e);
        }
        Ok(())
    }

    fn write_body(&self, path: &Path, body: &[u8]) -> StoreResult<()> {
        let mut tmp = NamedTempFile::new_in(&self.base_dir)?;
        tmp.write_all(body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn release(&self, id: &str) {
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .remove(id);
    }

    fn persist_index(&self, articles: &BTreeMap<String, ArticleMeta>) -> StoreResult<()> {
        write_json_atomic(
            &self.base_dir.join(INDEX_FILE),
            &IndexFileRef {
                partition: &self.key,
                created_at: &self.created_at,
                articles,
            },
        )
    }

    fn read_index(&self) -> std::sync::RwLockReadGuard<'_, IndexState> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, IndexState>> {
        self.index
            .write()
            .map_err(|_| StoreError::LockPoisoned("partition index"))
    }
}

fn discard(id: &str, path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(msgid = id, error = %e, "failed removing uncommitted article");
    }
}
