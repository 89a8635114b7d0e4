use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use msgstore_protocol::endpoints;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all msgstore endpoints.
pub fn build_router(store: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route(
            endpoints::MSGID,
            get(handler::get_article)
                .post(handler::post_article)
                .fallback(handler::unsupported_method),
        )
        .route(endpoints::STATS, get(handler::get_stats))
        .route(endpoints::PARTITIONS, get(handler::list_partitions))
        .route(endpoints::HEALTH, get(handler::health_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}
