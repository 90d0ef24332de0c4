//! Request handlers.

use std::convert::Infallible;
use std::thread;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use crossbeam_channel::RecvTimeoutError;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{AppState, X_REVISION};
use crate::error::{KvError, Result};
use crate::keys::{Key, SubscriptionPath};
use crate::payload::{canonicalize, parse_revision_hint};
use crate::store::Engine;
use crate::subscriptions::SubscriberHandle;
use crate::types::{Revision, UpdateEvent};

const CLIENT_SCRIPT: &str = include_str!("client.js");

/// How often an idle stream forwarder checks whether its client went away.
const FORWARD_POLL: Duration = Duration::from_secs(1);

/// GET / (any method) - The JavaScript client.
pub(crate) async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        CLIENT_SCRIPT,
    )
}

/// Every path other than `/`, routed by method.
pub(crate) async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    info!(method = %method, path, "Request");

    let result = match method {
        Method::GET if wants_event_stream(&headers) => events(&state, path).await,
        Method::GET => get_key(&state, path).await,
        Method::POST => set_key(&state, path, &body).await,
        Method::PUT => update_key(&state, path, &headers, &body).await,
        Method::OPTIONS => Ok(StatusCode::OK.into_response()),
        _ => Ok(StatusCode::METHOD_NOT_ALLOWED.into_response()),
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// Run an engine round trip on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KvError::Internal(e.to_string()))?
}

/// GET /{key} - Read a value and its revision.
async fn get_key(state: &AppState, path: &str) -> Result<Response> {
    let key = Key::parse(path)?;
    let engine = state.engine.clone();
    let lookup = key.clone();
    let entry = run_blocking(move || engine.get(&lookup))
        .await?
        .ok_or_else(|| KvError::NotFound(key.to_string()))?;

    Ok((
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (X_REVISION, HeaderValue::from(entry.revision.0)),
        ],
        entry.value,
    )
        .into_response())
}

/// POST /{key} - Unconditional write.
async fn set_key(state: &AppState, path: &str, body: &[u8]) -> Result<Response> {
    let key = Key::parse(path)?;
    let value = canonicalize(body)?;
    let engine = state.engine.clone();
    run_blocking(move || engine.set(&key, value)).await?;
    Ok(StatusCode::OK.into_response())
}

/// PUT /{key} - Conditional write against `X-Revision`.
async fn update_key(
    state: &AppState,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response> {
    let key = Key::parse(path)?;
    let hint = match headers.get(&X_REVISION) {
        Some(raw) => Some(raw.to_str().map_err(|_| {
            KvError::InvalidRevision(String::from_utf8_lossy(raw.as_bytes()).into_owned())
        })?),
        None => None,
    };
    let expected = parse_revision_hint(hint)?;
    let value = canonicalize(body)?;

    if expected < 0 {
        return Err(KvError::RevisionConflict {
            key: key.to_string(),
            expected,
        });
    }
    let expected = Revision(expected as u64);

    let engine = state.engine.clone();
    let target = key.clone();
    let updated = run_blocking(move || engine.update(&target, value, expected)).await?;
    if !updated {
        return Err(KvError::conflict(key.as_str(), expected));
    }
    Ok(StatusCode::OK.into_response())
}

/// GET /{path} with `Accept: text/event-stream` - Stream updates.
///
/// Each event's `data` is the value and its `id` is `key:revision`. The
/// subscription is dropped once the client goes away.
async fn events(state: &AppState, path: &str) -> Result<Response> {
    let path = SubscriptionPath::parse(path)?;
    let engine = state.engine.clone();
    let handle = {
        let engine = engine.clone();
        let path = path.clone();
        run_blocking(move || engine.subscribe(&path)).await?
    };
    debug!(subscriber = %handle.id(), path = %path, "Event stream opened");

    // Streams live as long as their clients, so they get their own threads
    // instead of pinning the blocking pool that short round trips share.
    let (tx, rx) = mpsc::channel(engine.config().subscriber_buffer);
    let id = handle.id();
    let unsubscriber = engine.clone();
    if let Err(e) = thread::Builder::new()
        .name(format!("atomkv-sse-{id}"))
        .spawn(move || forward(engine, handle, tx))
    {
        let _ = unsubscriber.unsubscribe(id);
        return Err(e.into());
    }

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, Infallible>(sse_event(&event)), rx))
    });

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn sse_event(event: &UpdateEvent) -> Event {
    Event::default()
        .data(&event.value)
        .id(format!("{}:{}", event.key, event.revision))
}

/// Move events from a subscriber queue into an async stream until either end closes.
fn forward(engine: Engine, handle: SubscriberHandle, tx: mpsc::Sender<UpdateEvent>) {
    loop {
        match handle.recv_timeout(FORWARD_POLL) {
            Ok(event) => {
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if tx.is_closed() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(subscriber = %handle.id(), "Event stream closed");
    let _ = engine.unsubscribe(handle.id());
}
