// Request Tracking Middleware
// Opens a tracker entry for every inbound request and closes it for routes
// that do not record their own answer.

use super::state::AppState;
use crate::passthrough::config::mask_key;
use crate::tracker::{EntryState, RequestId, RequestTracker, ResponseRecord};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Largest request body buffered for the history
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Marks the entry aborted if the handler future is dropped before it returns
struct AbortGuard {
    tracker: Arc<RequestTracker>,
    id: RequestId,
    armed: bool,
}

impl AbortGuard {
    fn new(tracker: Arc<RequestTracker>, id: RequestId) -> Self {
        Self {
            tracker,
            id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if self.armed && self.tracker.mark_aborted(self.id) {
            tracing::info!(request_id = %self.id, "client went away before the response");
        }
    }
}

pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let endpoint = parts.uri.path().to_string();
    let method = parts.method.to_string();
    let headers = header_map(&parts.headers);

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let id = state.tracker.begin(endpoint, method, Value::Null, headers);
            state.stats.record_error();
            let message = format!("failed to read request body: {}", err);
            state.tracker.record_response(
                id,
                ResponseRecord::completed(message.clone()).status(StatusCode::BAD_REQUEST.as_u16()),
            );
            return super::handlers::AppError::InvalidRequest(message).into_response();
        }
    };

    let id = state
        .tracker
        .begin(endpoint.clone(), method, body_value(&bytes), headers);
    tracing::debug!(request_id = %id, %endpoint, "request received");
    parts.extensions.insert(id);

    let mut guard = AbortGuard::new(state.tracker.clone(), id);
    let response = next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await;
    guard.disarm();

    // handlers for generation routes record their own answer
    if state.tracker.state(id) == Some(EntryState::Pending) {
        state.tracker.record_response(
            id,
            ResponseRecord::completed("").status(response.status().as_u16()),
        );
    }
    response
}

/// The body as JSON, as a string when it is not JSON, or null when empty
fn body_value(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            let value = if *name == header::AUTHORIZATION {
                mask_key(value)
            } else {
                value.to_string()
            };
            Some((name.as_str().to_string(), value))
        })
        .collect()
}
