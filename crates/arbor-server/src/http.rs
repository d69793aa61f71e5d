//! axum handlers binding the dispatcher and channel registry to HTTP.
//!
//! - `PUT`/`POST <base>` and `<base>/{signature}`: RPC calls
//! - `GET` on either route with `Accept: text/event-stream`: push channel
//! - `GET /health`

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbor_core::codec::{decode_request_for_signature, encode_event};
use arbor_core::{CONNECTION_ID_HEADER, ConnectionId, ResponseContract, RpcError};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel;
use crate::dispatch::Dispatcher;
use crate::health::{HealthResponse, health_check};
use crate::registry::{ConnectionEntry, ConnectionRegistry};

/// Shared state accessible from axum handlers.
pub struct AppState<C> {
    /// Routes calls through the controller tree.
    pub dispatcher: Dispatcher<C>,
    /// Open push channels.
    pub registry: ConnectionRegistry,
    /// Cancelled on server shutdown; ends all channel streams.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// SSE keep-alive interval.
    pub keep_alive: Duration,
}

/// `PUT|POST <base>`
pub async fn rpc_call<C: Send + Sync + 'static>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_call(&state, &headers, &body, None).await
}

/// `PUT|POST <base>/{signature}`
pub async fn rpc_call_signature<C: Send + Sync + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(signature): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_call(&state, &headers, &body, Some(&signature)).await
}

/// `GET <base>`
pub async fn channel_open<C: Send + Sync + 'static>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
) -> Response {
    start_channel(&state, &headers)
}

/// `GET <base>/{signature}`; clients use the reserved `__SSE__` signature.
pub async fn channel_open_signature<C: Send + Sync + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(_signature): Path<String>,
    headers: HeaderMap,
) -> Response {
    start_channel(&state, &headers)
}

/// `GET /health`
pub async fn health<C: Send + Sync + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<HealthResponse> {
    Json(health_check(state.start_time, state.registry.len()))
}

async fn handle_call<C: Send + Sync + 'static>(
    state: &AppState<C>,
    headers: &HeaderMap,
    body: &[u8],
    signature: Option<&str>,
) -> Response {
    let request = match decode_request_for_signature(body, signature) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "rejecting malformed request");
            return error_response(StatusCode::BAD_REQUEST, &err);
        }
    };

    let connection = bound_connection(&state.registry, headers);
    let response = state.dispatcher.dispatch(request, connection.as_ref()).await;
    (StatusCode::OK, Json(response)).into_response()
}

/// Resolve the `x-rpc-connection-id` header to a live channel.
fn bound_connection(
    registry: &ConnectionRegistry,
    headers: &HeaderMap,
) -> Option<Arc<ConnectionEntry>> {
    let raw = headers.get(CONNECTION_ID_HEADER)?.to_str().ok()?;
    let id = ConnectionId::from(raw);
    let entry = registry.lookup(&id);
    if entry.is_none() {
        warn!(connection_id = %id, "call references unknown realtime connection");
    }
    entry
}

fn start_channel<C>(state: &AppState<C>, headers: &HeaderMap) -> Response {
    if !accepts_event_stream(headers) {
        let err = RpcError::broken_contract("Channel requests must accept text/event-stream");
        return error_response(StatusCode::BAD_REQUEST, &err);
    }

    let channel = channel::open(&state.registry, state.shutdown.clone());
    debug!(connection_id = %channel.connection_id, "opening SSE channel");

    let frames = channel.frames.map(|frame| {
        let event = match encode_event(&frame) {
            Ok(line) => Event::default().data(line),
            Err(err) => {
                warn!(error = %err, "failed to encode channel frame");
                Event::default().comment("encode error")
            }
        };
        Ok::<_, Infallible>(event)
    });

    Sse::new(frames)
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response()
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/event-stream"))
}

fn error_response(status: StatusCode, err: &RpcError) -> Response {
    (status, Json(ResponseContract::failure(err.to_error_body()))).into_response()
}
