use std::io::Read;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use tokio::sync::mpsc;

use msgstore_protocol::{
    HealthResponse, IngestRequest, PartitionsReply, Reply, RetrieveQuery, StatsQuery, StatsReply,
};
use msgstore_store::{ArticleReader, ArticleStore, IngestOutcome, Rejection, RetrieveOutcome};

use crate::error::ServerResult;

/// Size of the chunks an article view is streamed in.
const CHUNK_SIZE: usize = 8 * 1024;

/// Chunks buffered between the file reader and the connection.
const CHUNK_QUEUE: usize = 4;

pub type AppState = Arc<ArticleStore>;

fn status_for(rejection: &Rejection) -> StatusCode {
    match rejection {
        Rejection::MissingField
        | Rejection::InvalidIdentifier
        | Rejection::MissingIdentifier
        | Rejection::MissingView
        | Rejection::InvalidView => StatusCode::BAD_REQUEST,
        Rejection::AlreadyExists(_) => StatusCode::CONFLICT,
        Rejection::NotFound(_) => StatusCode::NOT_FOUND,
    }
}

fn reject(rejection: &Rejection) -> Response {
    (status_for(rejection), Json(Reply::from(rejection))).into_response()
}

/// `POST /msgid`: store an article.
pub async fn post_article(
    State(store): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ServerResult<Response> {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable ingest request");
            return Ok((e.status(), Json(Reply::processing_error())).into_response());
        }
    };

    let done = tokio::task::spawn_blocking(move || {
        store.ingest(&req.msgid, req.body.as_bytes(), req.meta.unwrap_or_default())
    })
    .await??;

    Ok(match done.outcome {
        IngestOutcome::Stored { .. } => (StatusCode::OK, Json(Reply::accepted("Saved"))).into_response(),
        IngestOutcome::Rejected(r) => reject(&r),
    })
}

/// `GET /msgid?msgid=..&type=..`: stream one view of an article.
pub async fn get_article(
    State(store): State<AppState>,
    query: Result<Query<RetrieveQuery>, QueryRejection>,
) -> ServerResult<Response> {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable retrieve query");
            return Ok((e.status(), Json(Reply::processing_error())).into_response());
        }
    };
    let (msgid, kind) = match query.validate() {
        Ok((msgid, kind)) => (msgid.to_string(), kind),
        Err(r) => return Ok(reject(&r)),
    };

    let outcome = tokio::task::spawn_blocking(move || store.open_view(&msgid, kind)).await??;
    let reader = match outcome {
        RetrieveOutcome::Found(reader) => reader,
        RetrieveOutcome::Rejected(r) => return Ok(reject(&r)),
    };

    let (tx, rx) = mpsc::channel(CHUNK_QUEUE);
    tokio::task::spawn_blocking(move || pump(reader, tx));

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Ok((
        [(header::CONTENT_TYPE, "text/plain")],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Feed `reader` into the response channel. The read is counted only once
/// every chunk has been handed over, and before the channel closes, so the
/// response does not end until the ledger has been updated.
fn pump(mut reader: ArticleReader, tx: mpsc::Sender<std::io::Result<Bytes>>) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    tracing::debug!(msgid = reader.msgid(), "client went away mid-article");
                    return;
                }
            }
            Err(e) => {
                tracing::error!(msgid = reader.msgid(), error = %e, "failed reading article");
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }
    }
    reader.finish();
    drop(tx);
}

/// `GET /stats?msgid=..`: usage counters of an article.
pub async fn get_stats(
    State(store): State<AppState>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable stats query");
            return (e.status(), Json(Reply::processing_error())).into_response();
        }
    };
    let msgid = match query.msgid.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return reject(&Rejection::MissingIdentifier),
    };
    match store.stats(msgid) {
        Some(stats) => Json(StatsReply::new(msgid, stats)).into_response(),
        None => reject(&Rejection::NotFound(msgid.to_string())),
    }
}

/// `GET /partitions`: known partitions, newest first.
pub async fn list_partitions(State(store): State<AppState>) -> Json<PartitionsReply> {
    Json(PartitionsReply::from(store.registry().partitions()))
}

/// Any other method on `/msgid`.
pub async fn unsupported_method(method: Method) -> (StatusCode, Json<Reply>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(Reply::unsupported_method(method.as_str())),
    )
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}
