// Error Simulation Module
// Holds the process-wide fault selection and maps it to canned
// OpenAI-style error payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use thiserror::Error;

/// Kinds of simulated faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    None,
    SafetyContentFilter,
    RateLimit,
    ModelOverloaded,
    Timeout,
    InvalidRequest,
    AuthenticationError,
    ContextLengthExceeded,
}

impl ErrorKind {
    /// Every selectable fault, in dashboard order (excludes `None`)
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::SafetyContentFilter,
        ErrorKind::RateLimit,
        ErrorKind::ModelOverloaded,
        ErrorKind::Timeout,
        ErrorKind::InvalidRequest,
        ErrorKind::AuthenticationError,
        ErrorKind::ContextLengthExceeded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::None => "none",
            ErrorKind::SafetyContentFilter => "safety_content_filter",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ModelOverloaded => "model_overloaded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::ContextLengthExceeded => "context_length_exceeded",
        }
    }

    /// Human-readable label for the dashboard
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::None => "None",
            ErrorKind::SafetyContentFilter => "Safety Content Filter (Microsoft/Azure)",
            ErrorKind::RateLimit => "Rate Limit Exceeded",
            ErrorKind::ModelOverloaded => "Model Overloaded",
            ErrorKind::Timeout => "Request Timeout",
            ErrorKind::InvalidRequest => "Invalid Request Error",
            ErrorKind::AuthenticationError => "Authentication Error",
            ErrorKind::ContextLengthExceeded => "Context Length Exceeded",
        }
    }

    /// The kind after this one in `ALL`, wrapping around; `None` starts the cycle
    pub fn next(&self) -> ErrorKind {
        let position = ErrorKind::ALL.iter().position(|k| k == self);
        match position {
            Some(i) => ErrorKind::ALL[(i + 1) % ErrorKind::ALL.len()],
            None => ErrorKind::ALL[0],
        }
    }

    /// Catalog entry; `None` has no entry
    pub fn entry(&self) -> Option<CatalogEntry> {
        let entry = match self {
            ErrorKind::None => return None,
            ErrorKind::SafetyContentFilter => CatalogEntry {
                status: 400,
                code: "content_filter",
                message: "The response was filtered due to the prompt triggering Azure OpenAI's content management policy. Please modify your prompt and retry.",
                retry_after: None,
            },
            ErrorKind::RateLimit => CatalogEntry {
                status: 429,
                code: "rate_limit_exceeded",
                message: "Rate limit reached for requests. Please retry after a short wait.",
                retry_after: Some(60),
            },
            ErrorKind::ModelOverloaded => CatalogEntry {
                status: 503,
                code: "model_overloaded",
                message: "The model is currently overloaded with requests. Please try again later.",
                retry_after: Some(30),
            },
            ErrorKind::Timeout => CatalogEntry {
                status: 504,
                code: "timeout",
                message: "The request timed out. The model took too long to respond.",
                retry_after: None,
            },
            ErrorKind::InvalidRequest => CatalogEntry {
                status: 400,
                code: "invalid_request_error",
                message: "Invalid request: The model parameter is not supported or the messages format is incorrect.",
                retry_after: None,
            },
            ErrorKind::AuthenticationError => CatalogEntry {
                status: 401,
                code: "invalid_api_key",
                message: "Incorrect API key provided. Please check your API key and try again.",
                retry_after: None,
            },
            ErrorKind::ContextLengthExceeded => CatalogEntry {
                status: 400,
                code: "context_length_exceeded",
                message: "This model's maximum context length is 8192 tokens. However, your messages resulted in 10234 tokens.",
                retry_after: None,
            },
        };
        Some(entry)
    }

    /// Kind-specific fields merged into the error object
    fn details(&self) -> Value {
        match self {
            ErrorKind::None => json!({}),
            ErrorKind::SafetyContentFilter => json!({
                "error_type": "content_policy_violation",
                "filter_result": {
                    "hate": { "filtered": false, "severity": "safe" },
                    "self_harm": { "filtered": false, "severity": "safe" },
                    "sexual": { "filtered": false, "severity": "safe" },
                    "violence": { "filtered": true, "severity": "high" }
                }
            }),
            ErrorKind::RateLimit => json!({
                "retry_after": 60,
                "limit": "100 requests per minute"
            }),
            ErrorKind::ModelOverloaded => json!({
                "model_status": "overloaded",
                "estimated_wait_time": "30 seconds"
            }),
            ErrorKind::Timeout => json!({ "timeout_duration": "30s" }),
            ErrorKind::InvalidRequest => json!({
                "param": "model",
                "suggestion": "Please check the API documentation for valid parameters."
            }),
            ErrorKind::AuthenticationError => json!({ "code": "invalid_api_key" }),
            ErrorKind::ContextLengthExceeded => json!({
                "max_tokens": 8192,
                "requested_tokens": 10234,
                "suggestion": "Please reduce the length of the messages."
            }),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown error kind: {0}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "none" {
            return Ok(ErrorKind::None);
        }
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}

/// Static description of one fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub status: u16,
    pub code: &'static str,
    pub message: &'static str,
    /// Seconds for the `Retry-After` header
    pub retry_after: Option<u32>,
}

/// A fault ready to be sent to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedError {
    pub kind: ErrorKind,
    pub status: u16,
    pub body: Value,
    pub retry_after: Option<u32>,
}

impl SimulatedError {
    /// `error.type` of the body
    pub fn code(&self) -> &str {
        self.body["error"]["type"].as_str().unwrap_or_default()
    }
}

/// Build the canned response for a kind, or `None` for `ErrorKind::None`
pub fn error_response_for(kind: ErrorKind) -> Option<SimulatedError> {
    let entry = kind.entry()?;

    let mut error = Map::new();
    error.insert("message".into(), Value::from(entry.message));
    error.insert("type".into(), Value::from(entry.code));
    error.insert("code".into(), Value::from(entry.code));
    if let Value::Object(details) = kind.details() {
        error.extend(details);
    }

    Some(SimulatedError {
        kind,
        status: entry.status,
        body: json!({ "error": Value::Object(error) }),
        retry_after: entry.retry_after,
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct Selection {
    enabled: bool,
    kind: ErrorKind,
}

/// Serializable view of the simulator state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorStatus {
    pub enabled: bool,
    pub kind: ErrorKind,
    pub active: bool,
}

/// Process-wide fault switch. At most one kind is active at a time.
#[derive(Debug, Default)]
pub struct ErrorSimulator {
    selection: RwLock<Selection>,
}

impl ErrorSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `kind`, replacing whatever was active
    pub fn enable(&self, kind: ErrorKind) {
        let mut selection = self.selection.write().unwrap_or_else(|e| e.into_inner());
        selection.enabled = kind != ErrorKind::None;
        selection.kind = kind;
    }

    pub fn disable(&self) {
        let mut selection = self.selection.write().unwrap_or_else(|e| e.into_inner());
        *selection = Selection::default();
    }

    /// Flip the enabled bit. Turning off clears the selection.
    pub fn toggle(&self) -> bool {
        let mut selection = self.selection.write().unwrap_or_else(|e| e.into_inner());
        selection.enabled = !selection.enabled;
        if !selection.enabled {
            selection.kind = ErrorKind::None;
        }
        selection.enabled
    }

    pub fn is_active(&self) -> bool {
        let selection = self.selection.read().unwrap_or_else(|e| e.into_inner());
        selection.enabled && selection.kind != ErrorKind::None
    }

    pub fn current_selection(&self) -> ErrorKind {
        self.selection
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .kind
    }

    pub fn status(&self) -> ErrorStatus {
        let selection = *self.selection.read().unwrap_or_else(|e| e.into_inner());
        ErrorStatus {
            enabled: selection.enabled,
            kind: selection.kind,
            active: selection.enabled && selection.kind != ErrorKind::None,
        }
    }

    /// Response for the active fault, if any
    pub fn error_response(&self) -> Option<SimulatedError> {
        let selection = *self.selection.read().unwrap_or_else(|e| e.into_inner());
        if !selection.enabled {
            return None;
        }
        error_response_for(selection.kind)
    }
}
