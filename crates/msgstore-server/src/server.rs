use std::sync::Arc;

use msgstore_store::{ArticleStore, Registry};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// The msgstore HTTP server.
pub struct MsgStoreServer {
    config: ServerConfig,
    store: Arc<ArticleStore>,
}

impl MsgStoreServer {
    /// Open the data root named in `config` and load its partitions.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let registry = Registry::open(&config.data_root)?;
        Ok(Self {
            store: Arc::new(ArticleStore::new(Arc::new(registry))),
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArticleStore> {
        &self.store
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.store), self.config.max_body_size)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            "msgstore listening on {} (root: {})",
            self.config.bind_addr,
            self.config.data_root.display()
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
