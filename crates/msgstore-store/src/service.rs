//! Ingest and retrieval paths over a [`Registry`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::ledger::{FileStat, UsageKind};
use crate::registry::Registry;
use crate::view::{View, ViewKind};
use crate::volume::{ArticleMeta, Insert, Volume, is_storable_identifier};

/// Why a request was turned away. These are answers, not failures: nothing
/// was changed on disk.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Missing msgid or body")]
    MissingField,

    #[error("Invalid msgid")]
    InvalidIdentifier,

    #[error("Already have article {0}")]
    AlreadyExists(String),

    #[error("msgid not given")]
    MissingIdentifier,

    #[error("type not given")]
    MissingView,

    #[error("Type invalid value, valid=[HEAD, ARTICLE, BODY]")]
    InvalidView,

    #[error("Article not found msgid={0}")]
    NotFound(String),
}

/// Outcome of the best-effort ledger update that follows a store or a read.
#[derive(Debug)]
pub enum LedgerWrite {
    Persisted(FileStat),
    /// The primary operation did not happen, so nothing was recorded.
    Skipped,
    Failed(StoreError),
}

impl LedgerWrite {
    fn from_result(result: StoreResult<FileStat>) -> Self {
        match result {
            Ok(stat) => Self::Persisted(stat),
            Err(e) => Self::Failed(e),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A primary outcome together with its ledger side write. Only `outcome`
/// is meant for the caller; `ledger` is for logging and tests.
#[derive(Debug)]
pub struct Completed<T> {
    pub outcome: T,
    pub ledger: LedgerWrite,
}

/// Result of an ingest that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { partition: String },
    Rejected(Rejection),
}

/// Result of looking an article up for reading.
pub enum RetrieveOutcome {
    Found(ArticleReader),
    Rejected(Rejection),
}

impl std::fmt::Debug for RetrieveOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Found(r) => f.debug_tuple("Found").field(&r.msgid).finish(),
            Self::Rejected(r) => f.debug_tuple("Rejected").field(r).finish(),
        }
    }
}

/// Ledger entry of an article together with its partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArticleStats {
    pub partition: String,
    pub stat: FileStat,
    pub meta: ArticleMeta,
}

/// The article store: date-partitioned ingest and view-based retrieval.
pub struct ArticleStore {
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
}

impl ArticleStore {
    /// Store over `registry` using the system clock.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock))
    }

    pub fn with_clock(registry: Arc<Registry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Store `body` under `msgid` in today's partition.
    ///
    /// Returns `Err` only for durability failures (article file or index);
    /// in that case nothing of the article is visible. Ledger failures are
    /// reported in [`Completed::ledger`] and logged.
    pub fn ingest(
        &self,
        msgid: &str,
        body: &[u8],
        attributes: BTreeMap<String, String>,
    ) -> StoreResult<Completed<IngestOutcome>> {
        if msgid.is_empty() || body.is_empty() {
            return Ok(rejected(Rejection::MissingField));
        }
        if !is_storable_identifier(msgid) {
            return Ok(rejected(Rejection::InvalidIdentifier));
        }

        let now = self.clock.now();
        let volume = self.registry.current_partition(now)?;
        match volume.store_article(msgid, body, ArticleMeta::new(attributes))? {
            Insert::Duplicate => {
                return Ok(rejected(Rejection::AlreadyExists(msgid.to_string())));
            }
            Insert::Stored => {}
        }
        tracing::debug!(msgid, partition = volume.key(), bytes = body.len(), "saved article");

        let ledger = LedgerWrite::from_result(volume.ledger().record(
            msgid,
            UsageKind::Ingested,
            volume.age(now),
        ));
        if let LedgerWrite::Failed(e) = &ledger {
            tracing::warn!(msgid, error = %e, "failed saving stats");
        }

        Ok(Completed {
            outcome: IngestOutcome::Stored {
                partition: volume.key().to_string(),
            },
            ledger,
        })
    }

    /// Open the `kind` view of `msgid` for reading.
    ///
    /// Nothing is recorded until [`ArticleReader::finish`] is called after the
    /// view has been delivered.
    pub fn open_view(&self, msgid: &str, kind: ViewKind) -> StoreResult<RetrieveOutcome> {
        if msgid.is_empty() {
            return Ok(RetrieveOutcome::Rejected(Rejection::MissingIdentifier));
        }
        let Some(volume) = self.registry.resolve(msgid) else {
            tracing::warn!(msgid, "article not found");
            return Ok(RetrieveOutcome::Rejected(Rejection::NotFound(msgid.to_string())));
        };

        let path = volume.article_path(msgid);
        tracing::debug!(msgid, path = ?path, view = %kind, "read article");
        let file = File::open(&path)?;

        Ok(RetrieveOutcome::Found(ArticleReader {
            view: kind.apply(BufReader::new(file)),
            kind,
            msgid: msgid.to_string(),
            volume,
            clock: Arc::clone(&self.clock),
        }))
    }

    /// Usage statistics and attributes of `msgid`.
    pub fn stats(&self, msgid: &str) -> Option<ArticleStats> {
        let volume = self.registry.resolve(msgid)?;
        Some(ArticleStats {
            partition: volume.key().to_string(),
            stat: volume.ledger().entry(msgid).unwrap_or_default(),
            meta: volume.meta(msgid).unwrap_or_default(),
        })
    }
}

fn rejected(rejection: Rejection) -> Completed<IngestOutcome> {
    Completed {
        outcome: IngestOutcome::Rejected(rejection),
        ledger: LedgerWrite::Skipped,
    }
}

/// A stored article being read through one of its views.
///
/// Reads are lazy and single-pass. Call [`finish`](Self::finish) once the
/// whole view has been delivered to count the read; dropping the reader
/// without finishing records nothing.
pub struct ArticleReader {
    view: View<BufReader<File>>,
    kind: ViewKind,
    msgid: String,
    volume: Arc<Volume>,
    clock: Arc<dyn Clock>,
}

impl ArticleReader {
    pub fn msgid(&self) -> &str {
        &self.msgid
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    /// Key of the partition the article lives in.
    pub fn partition(&self) -> &str {
        self.volume.key()
    }

    /// Record a successful read in the partition ledger. Failure to persist
    /// is logged and returned but does not undo the read.
    pub fn finish(self) -> LedgerWrite {
        let age = self.volume.age(self.clock.now());
        let ledger = LedgerWrite::from_result(self.volume.ledger().record(
            &self.msgid,
            UsageKind::Read,
            age,
        ));
        if let LedgerWrite::Failed(e) = &ledger {
            tracing::warn!(msgid = %self.msgid, error = %e, "failed saving stats");
        }
        ledger
    }
}

impl Read for ArticleReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.view.read(buf)
    }
}
