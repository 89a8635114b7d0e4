//! Request and response types for the msgstore HTTP interface.
//!
//! Every structured answer is a [`Reply`]: `{ "accepted": bool, "message": str }`.
//! Successful reads are not structured; they stream the article view as
//! `text/plain`.

pub mod endpoint;
pub mod message;

pub use endpoint::{endpoints, HealthResponse};
pub use message::{
    IngestRequest, PartitionEntry, PartitionsReply, Reply, RetrieveQuery, StatsQuery, StatsReply,
    PROCESSING_ERROR,
};
