//! HTTP server for msgstore.
//!
//! Serves one article store over HTTP: `POST /msgid` stores an article,
//! `GET /msgid?msgid=..&type=HEAD|ARTICLE|BODY` streams a view of it, and
//! `GET /stats` exposes the per-article usage ledger.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::MsgStoreServer;
