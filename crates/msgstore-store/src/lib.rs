//! Message-identifier addressable article store.
//!
//! Articles (network-news style documents keyed by their message id) are
//! written once, verbatim, into the partition for the day they arrive and can
//! be read back whole or as a header-only / body-only view.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   2024-06-01/
//!     index.json          partition key, creation time, id -> attributes
//!     stats.json          id -> read count, last read age, store age
//!     <msgid>.txt         article body, verbatim
//!   2024-06-02/
//!     ...
//! ```
//!
//! # Components
//!
//! - [`Volume`] -- one partition directory and its index
//! - [`StatLedger`] -- per-partition usage counters
//! - [`ViewKind`] / [`View`] -- lazy header/body projections
//! - [`Registry`] -- the table of partitions, creates one per day
//! - [`ArticleStore`] -- the ingest and retrieval paths
//!
//! # Rules
//!
//! 1. Articles are never overwritten: the first ingest of an identifier wins.
//! 2. File before index: an identifier is visible only once both are durable.
//! 3. Ledger writes are best effort and never fail the store or the read.
//! 4. Locks are per partition; the partition table is only write-locked to
//!    create a new day.

pub mod clock;
pub mod error;
pub mod ledger;
mod persist;
pub mod registry;
pub mod service;
pub mod view;
pub mod volume;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use ledger::{FileStat, StatLedger, UsageKind};
pub use registry::{PartitionSummary, Registry, partition_key};
pub use service::{
    ArticleReader, ArticleStats, ArticleStore, Completed, IngestOutcome, LedgerWrite, Rejection,
    RetrieveOutcome,
};
pub use view::{BodyReader, HeadReader, ParseViewKindError, View, ViewKind};
pub use volume::{ArticleMeta, Insert, Volume};
