//! HTTP transport over the engine.
//!
//! `/` serves a small JavaScript client. Every other path is a key (or a
//! subscription path for event streams):
//! - `GET` reads a value, `X-Revision` carries its revision
//! - `GET` with `Accept: text/event-stream` streams updates as SSE
//! - `POST` writes unconditionally
//! - `PUT` writes only if `X-Revision` is the next revision, 409 otherwise
//!
//! Request bodies must be JSON; they are canonicalized before storage.

mod handlers;

use crate::error::KvError;
use crate::store::Engine;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Header carrying a key's revision on reads and the expected revision on CAS writes.
pub const X_REVISION: HeaderName = HeaderName::from_static("x-revision");

/// Shared handler state.
#[derive(Clone)]
pub(crate) struct AppState {
    pub engine: Engine,
}

/// Build the router for an engine.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/", any(handlers::client_script))
        .fallback(handlers::dispatch)
        .layer(cors())
        .with_state(AppState { engine })
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([X_REVISION])
}

impl IntoResponse for KvError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            KvError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "invalid key"),
            KvError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "invalid path/key"),
            KvError::NotFound(_) => (StatusCode::NOT_FOUND, "no such key"),
            KvError::RevisionConflict { .. } => (StatusCode::CONFLICT, "revision conflict"),
            KvError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalid JSON"),
            KvError::MissingRevision => (StatusCode::BAD_REQUEST, "missing revision"),
            KvError::InvalidRevision(_) => (StatusCode::BAD_REQUEST, "invalid revision"),
            KvError::Closed => (StatusCode::SERVICE_UNAVAILABLE, "engine closed"),
            KvError::Internal(_) | KvError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, format!("{message}\n")).into_response()
    }
}
