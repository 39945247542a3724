// Passthrough Client
// Forwards requests to a real OpenAI-compatible upstream. Unary responses
// are normalized; streamed chat is relayed byte for byte while content and
// tool calls are accumulated on the side.

use super::config::{
    PassthroughConfig, DEFAULT_UPSTREAM_CHAT_MODEL, DEFAULT_UPSTREAM_COMPLETION_MODEL,
    DEFAULT_UPSTREAM_EMBEDDING_MODEL,
};
use super::tool_calls::ToolCallAccumulator;
use crate::generator::generate_id;
use crate::openai::{
    embeddings_summary_text, first_finish_reason, ChatCompletionRequest, ChunkDelta,
    CompletionRequest, EmbeddingRequest, MessageContent, ResponseSummary, Summarize, ToolCall,
    Usage,
};
use crate::stream::{EventSink, DONE_FRAME};
use axum::body::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Why a forwarded call failed
#[derive(Debug, Error)]
pub enum PassthroughError {
    #[error("no upstream API key configured")]
    MissingApiKey,

    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("could not decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PassthroughError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            PassthroughError::Timeout(timeout)
        } else {
            PassthroughError::Transport(err)
        }
    }
}

/// A unary upstream answer with its envelope filled in.
///
/// The body is kept as the JSON the upstream sent, so fields this crate
/// has no type for (`service_tier`, `refusal`, base64 embeddings, ...)
/// reach the client unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UpstreamReply(Value);

impl UpstreamReply {
    pub fn body(&self) -> &Value {
        &self.0
    }

    pub fn into_body(self) -> Value {
        self.0
    }

    pub fn id(&self) -> &str {
        self.0["id"].as_str().unwrap_or_default()
    }

    pub fn created(&self) -> i64 {
        self.0["created"].as_i64().unwrap_or_default()
    }

    pub fn model(&self) -> &str {
        self.0["model"].as_str().unwrap_or_default()
    }

    fn is_embedding_list(&self) -> bool {
        self.0["object"] == "list"
    }

    /// Text of the first choice: chat message content or completion text
    pub fn text(&self) -> String {
        let choice = &self.0["choices"][0];
        if let Some(text) = choice["text"].as_str() {
            return text.to_string();
        }
        serde_json::from_value::<MessageContent>(choice["message"]["content"].clone())
            .map(|content| content.as_text())
            .unwrap_or_default()
    }

    /// Usage read field by field; anything missing or odd counts as zero
    pub fn usage(&self) -> Usage {
        let usage = &self.0["usage"];
        let field = |name: &str| {
            usage[name]
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        };
        let mut parsed = Usage::new(field("prompt_tokens"), field("completion_tokens"));
        if let Some(total) = usage["total_tokens"].as_u64().and_then(|n| u32::try_from(n).ok()) {
            parsed.total_tokens = total;
        }
        parsed
    }

    fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        let calls = self.0["choices"][0]["message"].get("tool_calls")?;
        serde_json::from_value(calls.clone()).ok()
    }
}

impl Summarize for UpstreamReply {
    fn summary(&self) -> ResponseSummary {
        if self.is_embedding_list() {
            let vectors = self.0["data"].as_array().map(Vec::len).unwrap_or(0);
            let usage = self.usage();
            return ResponseSummary {
                model: self.model().to_string(),
                text: embeddings_summary_text(vectors),
                usage: Usage::new(usage.prompt_tokens, 0),
                finish_reason: None,
                tool_calls: None,
            };
        }
        ResponseSummary {
            model: self.model().to_string(),
            text: self.text(),
            usage: self.usage(),
            finish_reason: Some(first_finish_reason(
                self.0["choices"][0]["finish_reason"].as_str(),
            )),
            tool_calls: self.tool_calls(),
        }
    }
}

/// Result of a relayed chat stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    pub model: String,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Usage reported by the upstream, if it sent any
    pub usage: Option<Usage>,
    /// The client went away before the upstream finished
    pub disconnected: bool,
}

/// Splits an SSE byte stream into lines, carrying partial lines across blocks
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, block: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(block);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

/// Accumulates content and tool calls from relayed SSE lines
#[derive(Debug, Default)]
struct StreamAccumulator {
    content: String,
    tool_calls: ToolCallAccumulator,
    usage: Option<Usage>,
    model: Option<String>,
    saw_done: bool,
}

impl StreamAccumulator {
    /// Feed one SSE line; returns the content delta it carried, if any
    fn line(&mut self, line: &str) -> Option<String> {
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            self.saw_done = true;
            return None;
        }
        let envelope: StreamEnvelope = serde_json::from_str(data).ok()?;
        if self.model.is_none() {
            self.model = envelope.model;
        }
        if envelope.usage.is_some() {
            self.usage = envelope.usage;
        }

        let mut delta_text = String::new();
        for choice in envelope.choices {
            if let Some(fragments) = choice.delta.tool_calls.as_ref() {
                self.tool_calls.extend(fragments);
            }
            if let Some(content) = choice.delta.content {
                delta_text.push_str(&content);
            }
        }
        if delta_text.is_empty() {
            return None;
        }
        self.content.push_str(&delta_text);
        Some(delta_text)
    }
}

/// Upstream HTTP client bound to one config snapshot
#[derive(Debug, Clone)]
pub struct PassthroughClient {
    http: reqwest::Client,
    config: PassthroughConfig,
}

impl PassthroughClient {
    pub fn new(http: reqwest::Client, config: PassthroughConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &PassthroughConfig {
        &self.config
    }

    /// Serialize the request with the effective model and stream flag
    fn body<T: Serialize>(
        &self,
        request: &T,
        default_model: &str,
        stream: Option<bool>,
    ) -> Result<(Value, String), PassthroughError> {
        let mut body = serde_json::to_value(request)?;
        let requested = body.get("model").and_then(Value::as_str).map(str::to_string);
        let model = self.config.effective_model(requested.as_deref(), default_model);
        if let Value::Object(map) = &mut body {
            map.insert("model".into(), Value::from(model.clone()));
            if let Some(stream) = stream {
                map.insert("stream".into(), Value::from(stream));
            }
        }
        Ok((body, model))
    }

    async fn post(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> Result<reqwest::Response, PassthroughError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(PassthroughError::MissingApiKey)?;
        let timeout = self.config.timeout;

        let response = self
            .http
            .post(self.config.endpoint_url(endpoint))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| PassthroughError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PassthroughError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// POST a unary request and fill in the envelope fields upstreams omit
    async fn unary(
        &self,
        endpoint: &str,
        body: Value,
        model: &str,
        object: &str,
        id_prefix: &str,
    ) -> Result<UpstreamReply, PassthroughError> {
        let timeout = self.config.timeout;
        let response = self.post(endpoint, &body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PassthroughError::from_reqwest(e, timeout))?;
        let mut data: Value = serde_json::from_slice(&bytes)?;
        normalize_envelope(&mut data, model, object, id_prefix);
        Ok(UpstreamReply(data))
    }

    pub async fn unary_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<UpstreamReply, PassthroughError> {
        let (body, model) = self.body(request, DEFAULT_UPSTREAM_COMPLETION_MODEL, Some(false))?;
        self.unary("completions", body, &model, "text_completion", "cmpl")
            .await
    }

    pub async fn unary_chat(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<UpstreamReply, PassthroughError> {
        let (body, model) = self.body(request, DEFAULT_UPSTREAM_CHAT_MODEL, Some(false))?;
        self.unary("chat/completions", body, &model, "chat.completion", "chatcmpl")
            .await
    }

    pub async fn unary_embedding(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<UpstreamReply, PassthroughError> {
        let (body, model) = self.body(request, DEFAULT_UPSTREAM_EMBEDDING_MODEL, None)?;
        self.unary("embeddings", body, &model, "list", "embd").await
    }

    /// Relay a streamed chat completion into `sink`.
    ///
    /// Fails only before the first byte reaches the client. After that a
    /// broken upstream ends the relay with what arrived so far.
    pub async fn stream_chat<C>(
        &self,
        request: &ChatCompletionRequest,
        sink: &EventSink,
        mut on_chunk: C,
    ) -> Result<StreamSummary, PassthroughError>
    where
        C: FnMut(&str),
    {
        let (body, model) = self.body(request, DEFAULT_UPSTREAM_CHAT_MODEL, Some(true))?;
        let response = self.post("chat/completions", &body).await?;

        let timeout = self.config.timeout;
        let mut upstream = std::pin::pin!(response.bytes_stream());
        let mut lines = SseLineBuffer::default();
        let mut acc = StreamAccumulator::default();
        let mut forwarded = false;
        let mut disconnected = false;

        while let Some(block) = upstream.next().await {
            let block: Bytes = match block {
                Ok(block) => block,
                Err(err) if !forwarded => {
                    return Err(PassthroughError::from_reqwest(err, timeout));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "upstream stream broke off");
                    break;
                }
            };
            forwarded = true;
            if !sink.send(block.clone()).await {
                tracing::debug!("client disconnected from relayed stream");
                disconnected = true;
                break;
            }
            for line in lines.push(&block) {
                if let Some(delta) = acc.line(&line) {
                    on_chunk(&delta);
                }
            }
        }

        if !disconnected {
            if let Some(rest) = lines.finish() {
                if let Some(delta) = acc.line(&rest) {
                    on_chunk(&delta);
                }
            }
            if !acc.saw_done {
                sink.send(Bytes::from_static(DONE_FRAME.as_bytes())).await;
            }
        }

        Ok(StreamSummary {
            model: acc.model.unwrap_or(model),
            content: acc.content,
            tool_calls: acc.tool_calls.finish(),
            usage: acc.usage,
            disconnected,
        })
    }
}

/// Substitute a local id, the current time, the effective model and zero usage
/// where the upstream left them out.
fn normalize_envelope(data: &mut Value, model: &str, object: &str, id_prefix: &str) {
    let Value::Object(map) = data else {
        return;
    };
    let missing = |v: Option<&Value>| v.is_none_or(|v| v.is_null() || v.as_str() == Some(""));

    if missing(map.get("id")) {
        map.insert("id".into(), Value::from(generate_id(id_prefix)));
    }
    if map.get("created").and_then(Value::as_i64).is_none() {
        map.insert("created".into(), Value::from(chrono::Utc::now().timestamp()));
    }
    if missing(map.get("model")) {
        map.insert("model".into(), Value::from(model));
    }
    if map.get("usage").is_none_or(Value::is_null) {
        let usage = if object == "list" {
            json!({ "prompt_tokens": 0, "total_tokens": 0 })
        } else {
            json!({ "prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0 })
        };
        map.insert("usage".into(), usage);
    }
    map.insert("object".into(), Value::from(object));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_across_blocks() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let lines = buffer.push(b":1}\n\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), String::new()]);
        let lines = buffer.push(b"NE]\r\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn test_line_buffer_split_utf8() {
        let text = "data: {\"c\":\"°\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC2).unwrap() + 1;
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(&text[..split]).is_empty());
        assert_eq!(buffer.push(&text[split..]), vec!["data: {\"c\":\"°\"}"]);
    }

    #[test]
    fn test_accumulator_content_and_tools() {
        let mut acc = StreamAccumulator::default();
        assert_eq!(
            acc.line(r#"data: {"model":"gpt-4o","choices":[{"delta":{"role":"assistant","content":"Hi"}}]}"#),
            Some("Hi".to_string())
        );
        acc.line(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","type":"function","function":{"name":"f","arguments":"{\"a\":"}}]}}]}"#);
        acc.line(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"1}"}}]}}]}"#);
        assert_eq!(acc.line("data: not json"), None);
        assert_eq!(acc.line(": keep-alive"), None);
        acc.line("data: [DONE]");

        assert!(acc.saw_done);
        assert_eq!(acc.content, "Hi");
        assert_eq!(acc.model.as_deref(), Some("gpt-4o"));
        let calls = acc.tool_calls.finish().unwrap();
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.arguments, "{\"a\":1}");
    }

    #[test]
    fn test_normalize_envelope_fills_missing_fields() {
        let mut data = json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "x"}, "finish_reason": "stop"}]
        });
        normalize_envelope(&mut data, "gpt-4o", "chat.completion", "chatcmpl");
        let reply = UpstreamReply(data);
        assert!(reply.id().starts_with("chatcmpl-"));
        assert_eq!(reply.model(), "gpt-4o");
        assert!(reply.created() > 0);
        assert_eq!(reply.usage(), Usage::default());
        assert_eq!(reply.text(), "x");
    }

    #[test]
    fn test_upstream_reply_summary_keeps_unknown_fields() {
        let reply = UpstreamReply(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": "gpt-4o",
            "service_tier": "default",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "refusal": null,
                    "tool_calls": [{"id": "c1", "type": "function",
                                    "function": {"name": "f", "arguments": "{}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7,
                      "prompt_tokens_details": {"cached_tokens": 0}}
        }));
        let summary = reply.summary();
        assert_eq!(summary.text, "");
        assert_eq!(summary.usage, Usage::new(3, 4));
        assert_eq!(summary.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(summary.tool_calls.unwrap()[0].function.name, "f");

        let body = serde_json::to_value(&reply).unwrap();
        assert_eq!(body["service_tier"], "default");
        assert_eq!(body["usage"]["prompt_tokens_details"]["cached_tokens"], 0);
    }

    #[test]
    fn test_upstream_embedding_summary() {
        let reply = UpstreamReply(json!({
            "object": "list",
            "model": "text-embedding-3-small",
            "data": [{"index": 0, "object": "embedding", "embedding": "AACAPwAAAAA="}],
            "usage": {"prompt_tokens": 2, "total_tokens": 2}
        }));
        let summary = reply.summary();
        assert_eq!(summary.text, "Embeddings generated: 1 vectors");
        assert_eq!(summary.usage, Usage::new(2, 0));
    }

    #[test]
    fn test_normalize_envelope_keeps_upstream_values() {
        let mut data = json!({
            "id": "upstream-id",
            "created": 7,
            "model": "gpt-4o-2024",
            "choices": [],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        });
        normalize_envelope(&mut data, "gpt-4o", "chat.completion", "chatcmpl");
        assert_eq!(data["id"], "upstream-id");
        assert_eq!(data["created"], 7);
        assert_eq!(data["model"], "gpt-4o-2024");
        assert_eq!(data["usage"]["total_tokens"], 3);
    }

    #[test]
    fn test_body_overrides_model_and_stream() {
        let client = PassthroughClient::new(
            reqwest::Client::new(),
            PassthroughConfig {
                model: Some("forced".to_string()),
                ..Default::default()
            },
        );
        let request: ChatCompletionRequest =
            serde_json::from_str(r#"{"model":"gpt-4","messages":[],"top_k":5}"#).unwrap();
        let (body, model) = client.body(&request, "d", Some(true)).unwrap();
        assert_eq!(model, "forced");
        assert_eq!(body["model"], "forced");
        assert_eq!(body["stream"], true);
        assert_eq!(body["top_k"], 5);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let client = PassthroughClient::new(reqwest::Client::new(), PassthroughConfig::default());
        let request = ChatCompletionRequest::default();
        let err = client.unary_chat(&request).await.unwrap_err();
        assert!(matches!(err, PassthroughError::MissingApiKey));
    }
}
