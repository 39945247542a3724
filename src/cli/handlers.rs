// HTTP Handlers Module
// Implements the OpenAI-compatible endpoints plus the /doctor control surface.

use super::state::AppState;
use crate::{
    dispatch::StreamCallbacks,
    errors::{ErrorKind, SimulatedError},
    openai::{
        models::get_model_profile, ChatCompletionRequest, CompletionRequest, EmbeddingRequest,
        ErrorResponse, Model, ParameterOutOfRange, ResponseSummary, Summarize,
    },
    stats::StatCategory,
    stream::BodyStream,
    tracker::{RequestId, RequestTracker, ResponseRecord},
};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "uptime": state.stats.uptime().as_secs_f64(),
    }))
}

/// POST /v1/completions
pub async fn completions(
    State(state): State<Arc<AppState>>,
    Extension(id): Extension<RequestId>,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = parse_body(&state, id, payload)?;
    state.stats.increment(StatCategory::Completions);
    check_limits(&state, id, request.validate())?;
    tracing::info!(
        request_id = %id,
        model = request.model.as_deref().unwrap_or("default"),
        stream = request.stream,
        "Completion request"
    );

    if request.stream {
        state.tracker.record_response(id, ResponseRecord::streaming());
        let body = state
            .dispatcher
            .stream_completion(request, tracking_callbacks(state.tracker.clone(), id))
            .map_err(|e| fail(&state, id, e.into()))?;
        return Ok(sse_response(body));
    }

    let reply = state
        .dispatcher
        .completion(&request)
        .await
        .map_err(|e| fail(&state, id, e.into()))?;

    state.tracker.record_response(id, unary_record(reply.summary()));
    Ok(Json(reply).into_response())
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Extension(id): Extension<RequestId>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = parse_body(&state, id, payload)?;
    state.stats.increment(StatCategory::ChatCompletions);
    check_limits(&state, id, request.validate())?;
    tracing::info!(
        request_id = %id,
        model = request.model.as_deref().unwrap_or("default"),
        stream = request.stream,
        messages = request.messages.len(),
        "Chat completion request"
    );

    if request.stream {
        state.tracker.record_response(id, ResponseRecord::streaming());
        let body = state
            .dispatcher
            .stream_chat(request, tracking_callbacks(state.tracker.clone(), id))
            .map_err(|e| fail(&state, id, e.into()))?;
        return Ok(sse_response(body));
    }

    let reply = state
        .dispatcher
        .chat(&request)
        .await
        .map_err(|e| fail(&state, id, e.into()))?;

    state.tracker.record_response(id, unary_record(reply.summary()));
    Ok(Json(reply).into_response())
}

/// POST /v1/embeddings
pub async fn embeddings(
    State(state): State<Arc<AppState>>,
    Extension(id): Extension<RequestId>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = parse_body(&state, id, payload)?;
    state.stats.increment(StatCategory::Embeddings);
    check_limits(&state, id, request.validate())?;
    tracing::info!(
        request_id = %id,
        model = request.model.as_deref().unwrap_or("default"),
        "Embeddings request"
    );

    let reply = state
        .dispatcher
        .embeddings(&request)
        .await
        .map_err(|e| fail(&state, id, e.into()))?;

    state.tracker.record_response(id, unary_record(reply.summary()));
    Ok(Json(reply).into_response())
}

/// GET /v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.stats.increment(StatCategory::Models);
    Json(state.dispatcher.models())
}

/// GET /v1/models/{model_id}
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<Model>, AppError> {
    state.stats.increment(StatCategory::Models);
    match get_model_profile(&model_id) {
        Some(profile) => Ok(Json(profile.to_model(chrono::Utc::now().timestamp()))),
        None => Err(AppError::NotFound(format!("Model '{}' not found", model_id))),
    }
}

/// GET /doctor/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

/// GET /doctor/history
pub async fn get_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.tracker.history())
}

/// DELETE /doctor/history
pub async fn clear_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.tracker.clear();
    StatusCode::NO_CONTENT
}

/// GET /doctor/errors
pub async fn get_errors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    errors_body(&state)
}

#[derive(Debug, Deserialize)]
pub struct EnableErrorRequest {
    pub kind: String,
}

/// POST /doctor/errors
pub async fn enable_error(
    State(state): State<Arc<AppState>>,
    Extension(id): Extension<RequestId>,
    payload: Result<Json<EnableErrorRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = parse_body(&state, id, payload)?;
    let kind: ErrorKind = request
        .kind
        .parse()
        .map_err(|e: crate::errors::UnknownErrorKind| {
            fail(&state, id, AppError::InvalidRequest(e.to_string()))
        })?;
    state.errors.enable(kind);
    tracing::info!(%kind, "error simulation enabled");
    Ok(errors_body(&state))
}

/// DELETE /doctor/errors
pub async fn disable_errors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.errors.disable();
    tracing::info!("error simulation disabled");
    errors_body(&state)
}

/// POST /doctor/errors/toggle
pub async fn toggle_errors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let enabled = state.errors.toggle();
    tracing::info!(enabled, "error simulation toggled");
    errors_body(&state)
}

/// POST /doctor/passthrough/toggle
pub async fn toggle_passthrough(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let enabled = state.passthrough.toggle();
    tracing::info!(enabled, "passthrough toggled");
    Json(state.passthrough.status())
}

fn errors_body(state: &AppState) -> Json<serde_json::Value> {
    let available: Vec<&str> = ErrorKind::ALL.iter().map(|k| k.as_str()).collect();
    Json(json!({
        "status": state.errors.status(),
        "available": available,
    }))
}

/// Unwrap a JSON body, recording a rejection as a failed request
fn parse_body<T>(
    state: &AppState,
    id: RequestId,
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| fail(state, id, AppError::InvalidRequest(rejection.body_text())))
}

fn check_limits(
    state: &AppState,
    id: RequestId,
    result: Result<(), ParameterOutOfRange>,
) -> Result<(), AppError> {
    result.map_err(|e| fail(state, id, AppError::InvalidRequest(e.to_string())))
}

/// History record of a unary answer
fn unary_record(summary: ResponseSummary) -> ResponseRecord {
    let mut record = ResponseRecord::completed(summary.text)
        .model(summary.model)
        .usage(summary.usage)
        .tool_calls(summary.tool_calls);
    if let Some(reason) = summary.finish_reason {
        record = record.finish_reason(reason);
    }
    record
}

/// Count the error and close the tracker entry with it
fn fail(state: &AppState, id: RequestId, error: AppError) -> AppError {
    state.stats.record_error();
    state.tracker.record_response(
        id,
        ResponseRecord::completed(error.message()).status(error.status().as_u16()),
    );
    error
}

/// Route streamed text and the final outcome into the tracker
fn tracking_callbacks(tracker: Arc<RequestTracker>, id: RequestId) -> StreamCallbacks {
    let chunks = tracker.clone();
    StreamCallbacks::new(
        move |text| chunks.append_stream_chunk(id, text),
        move |done| {
            if done.disconnected {
                tracker.mark_aborted(id);
                tracing::info!(request_id = %id, "stream aborted by client");
                return;
            }
            tracker.record_response(
                id,
                ResponseRecord::completed(done.content)
                    .model(done.model)
                    .usage(done.usage)
                    .finish_reason("stop")
                    .tool_calls(done.tool_calls),
            );
        },
    )
}

fn sse_response(body: BodyStream) -> Response {
    let mut response = Body::from_stream(body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Simulated(SimulatedError),
    NotFound(String),
    InvalidRequest(String),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Simulated(e) => {
                StatusCode::from_u16(e.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Simulated(e) => e.body["error"]["message"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            AppError::NotFound(msg) | AppError::InvalidRequest(msg) | AppError::Internal(msg) => {
                msg.clone()
            }
        }
    }
}

impl From<SimulatedError> for AppError {
    fn from(error: SimulatedError) -> Self {
        AppError::Simulated(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = match self {
            AppError::Simulated(error) => {
                let mut response = Json(error.body).into_response();
                if let Some(retry_after) = error.retry_after {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                }
                response
            }
            AppError::NotFound(msg) => {
                Json(ErrorResponse::new(msg, "not_found_error")).into_response()
            }
            AppError::InvalidRequest(msg) => {
                Json(ErrorResponse::invalid_request(msg)).into_response()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                Json(ErrorResponse::internal(msg)).into_response()
            }
        };
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_response_for;

    #[test]
    fn test_simulated_error_response() {
        let error = error_response_for(ErrorKind::RateLimit).unwrap();
        let response = AppError::from(error).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }

    #[test]
    fn test_simulated_error_message() {
        let error = AppError::from(error_response_for(ErrorKind::Timeout).unwrap());
        assert_eq!(error.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(!error.message().is_empty());
    }

    #[test]
    fn test_internal_error_status() {
        let response = AppError::Internal("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
