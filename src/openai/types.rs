// OpenAI API Types
// Wire types for the OpenAI-compatible subset served by llm-doctor:
// text completions, chat completions, embeddings and model listing.
// Reference: https://platform.openai.com/docs/api-reference

use crate::tokens::{count_sequence_tokens, count_tokens, SCALAR_TOKENS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Role of a message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    Function,
}

/// Message content: plain text or a list of typed parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Text of the content; parts without text (images, audio) are skipped
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A typed content part (`{"type": "text", "text": "..."}` and friends)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content.into())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_text(Role::Assistant, content)
    }

    /// Text content of the message, empty when absent
    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::as_text)
            .unwrap_or_default()
    }
}

/// A tool call made by the assistant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// A function call within a tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A function definition for function calling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Function {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A tool definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Function,
}

/// Stop condition for generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StopCondition {
    Single(String),
    Multiple(Vec<String>),
}

/// Prompt of a text completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Texts(Vec<String>),
    Tokens(Vec<i64>),
    TokenBatches(Vec<Vec<i64>>),
}

impl Prompt {
    /// Approximate prompt tokens: text is counted, token ids count one each
    pub fn token_count(&self) -> u32 {
        match self {
            Prompt::Text(text) => count_tokens(text),
            Prompt::Texts(texts) => texts.iter().map(|t| count_tokens(t)).sum(),
            Prompt::Tokens(ids) => count_sequence_tokens(ids.len()),
            Prompt::TokenBatches(batches) => batches
                .iter()
                .map(|b| count_sequence_tokens(b.len()))
                .sum(),
        }
    }
}

/// Text completion request (`POST /v1/completions`)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Parameters this server does not interpret (`top_k`, `min_p`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletionRequest {
    pub fn prompt_tokens(&self) -> u32 {
        self.prompt.as_ref().map(Prompt::token_count).unwrap_or(0)
    }
}

/// Chat completion request (`POST /v1/chat/completions`)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    /// Sum of the approximate token counts of every message's content
    pub fn prompt_tokens(&self) -> u32 {
        self.messages.iter().map(|m| count_tokens(&m.text())).sum()
    }
}

/// Embedding input in any of the shapes the API accepts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Text(String),
    Token(i64),
    Texts(Vec<String>),
    Tokens(Vec<i64>),
    TokenBatches(Vec<Vec<i64>>),
}

/// One item to embed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmbeddingItem<'a> {
    Text(&'a str),
    Token(i64),
    Tokens(&'a [i64]),
}

impl EmbeddingItem<'_> {
    pub fn token_count(&self) -> u32 {
        match self {
            EmbeddingItem::Text(text) => count_tokens(text),
            EmbeddingItem::Token(_) => SCALAR_TOKENS,
            EmbeddingItem::Tokens(ids) => count_sequence_tokens(ids.len()),
        }
    }
}

impl EmbeddingInput {
    /// Split the input into the items that each get their own vector
    pub fn items(&self) -> Vec<EmbeddingItem<'_>> {
        match self {
            EmbeddingInput::Text(text) => vec![EmbeddingItem::Text(text)],
            EmbeddingInput::Token(id) => vec![EmbeddingItem::Token(*id)],
            EmbeddingInput::Texts(texts) => texts.iter().map(|t| EmbeddingItem::Text(t)).collect(),
            EmbeddingInput::Tokens(ids) => vec![EmbeddingItem::Tokens(ids)],
            EmbeddingInput::TokenBatches(batches) => {
                batches.iter().map(|b| EmbeddingItem::Tokens(b)).collect()
            }
        }
    }

    pub fn token_count(&self) -> u32 {
        self.items().iter().map(EmbeddingItem::token_count).sum()
    }
}

/// Embedding request (`POST /v1/embeddings`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input: EmbeddingInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Most choices a completion or chat request may ask for
pub const MAX_CHOICES: u32 = 128;

/// Largest embedding a request may ask for
pub const MAX_EMBEDDING_DIMENSIONS: usize = 8192;

/// A request parameter above what the server will generate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{param}' must be at most {max}, got {value}")]
pub struct ParameterOutOfRange {
    pub param: &'static str,
    pub value: u64,
    pub max: u64,
}

fn check_limit(
    param: &'static str,
    value: Option<u64>,
    max: u64,
) -> Result<(), ParameterOutOfRange> {
    match value {
        Some(value) if value > max => Err(ParameterOutOfRange { param, value, max }),
        _ => Ok(()),
    }
}

impl CompletionRequest {
    pub fn validate(&self) -> Result<(), ParameterOutOfRange> {
        check_limit("n", self.n.map(u64::from), u64::from(MAX_CHOICES))
    }
}

impl ChatCompletionRequest {
    pub fn validate(&self) -> Result<(), ParameterOutOfRange> {
        check_limit("n", self.n.map(u64::from), u64::from(MAX_CHOICES))
    }
}

impl EmbeddingRequest {
    pub fn validate(&self) -> Result<(), ParameterOutOfRange> {
        check_limit(
            "dimensions",
            self.dimensions.map(|d| d as u64),
            MAX_EMBEDDING_DIMENSIONS as u64,
        )
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Embedding usage (no completion tokens)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

/// A choice in a text completion response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    pub index: u32,
    pub text: String,
    #[serde(default)]
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>,
}

/// Text completion response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

impl CompletionResponse {
    /// Text of the first choice
    pub fn text(&self) -> &str {
        self.choices.first().map(|c| c.text.as_str()).unwrap_or("")
    }
}

/// A choice in the chat completion response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatChoice {
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>,
}

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice's message
    pub fn text(&self) -> String {
        self.choices
            .first()
            .map(|c| c.message.text())
            .unwrap_or_default()
    }

    pub fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        self.choices
            .first()
            .and_then(|c| c.message.tool_calls.clone())
    }
}

/// One embedding vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingData {
    pub index: u32,
    pub object: String,
    pub embedding: Vec<f32>,
}

/// Embedding response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub data: Vec<EmbeddingData>,
    pub usage: EmbeddingUsage,
}

/// The parts of a unary response the request history keeps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSummary {
    pub model: String,
    pub text: String,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// The first choice's finish reason, "stop" when the response has none
pub fn first_finish_reason(reason: Option<&str>) -> String {
    reason.unwrap_or("stop").to_string()
}

/// Anything that can be summarized for the request history
pub trait Summarize {
    fn summary(&self) -> ResponseSummary;
}

impl Summarize for CompletionResponse {
    fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            model: self.model.clone(),
            text: self.text().to_string(),
            usage: self.usage,
            finish_reason: Some(first_finish_reason(
                self.choices.first().and_then(|c| c.finish_reason.as_deref()),
            )),
            tool_calls: None,
        }
    }
}

impl Summarize for ChatCompletionResponse {
    fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            model: self.model.clone(),
            text: self.text(),
            usage: self.usage,
            finish_reason: Some(first_finish_reason(
                self.choices.first().and_then(|c| c.finish_reason.as_deref()),
            )),
            tool_calls: self.tool_calls(),
        }
    }
}

/// History text of an embeddings answer
pub fn embeddings_summary_text(vectors: usize) -> String {
    format!("Embeddings generated: {} vectors", vectors)
}

impl Summarize for EmbeddingResponse {
    /// Embeddings report no completion tokens
    fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            model: self.model.clone(),
            text: embeddings_summary_text(self.data.len()),
            usage: Usage::new(self.usage.prompt_tokens, 0),
            finish_reason: None,
            tool_calls: None,
        }
    }
}

/// Delta content in streaming response
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

/// Tool call fragment in a streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkToolCall {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<ChunkFunctionCall>,
}

/// Function call fragment in a streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChunkFunctionCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A choice in a streaming chat chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub logprobs: Option<Value>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Streaming chat completion chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    pub fn new(id: String, model: String, created: i64) -> Self {
        Self {
            id,
            object: "chat.completion.chunk".to_string(),
            created,
            model,
            choices: vec![],
            usage: None,
        }
    }

    /// Content delta; the first chunk of a stream also announces the role
    pub fn with_content(mut self, content: String, first: bool, finish: bool) -> Self {
        self.choices = vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: first.then_some(Role::Assistant),
                content: Some(content),
                tool_calls: None,
            },
            logprobs: None,
            finish_reason: finish.then(|| "stop".to_string()),
        }];
        self
    }
}

/// Streaming text completion chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
}

impl CompletionChunk {
    pub fn new(id: String, model: String, created: i64, text: String, finish: bool) -> Self {
        Self {
            id,
            object: "text_completion".to_string(),
            created,
            model,
            choices: vec![CompletionChoice {
                index: 0,
                text,
                logprobs: None,
                finish_reason: finish.then(|| "stop".to_string()),
            }],
        }
    }
}

/// OpenAI-style error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.into(),
                param: None,
                code: None,
            },
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(message, "internal_error")
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(message, "invalid_request_error")
    }
}

/// Model object returned by /v1/models endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    pub root: String,
    pub parent: Option<String>,
    pub max_model_len: u32,
    pub permission: Vec<Value>,
}

/// Response for /v1/models endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<Model>,
}

impl ModelsResponse {
    pub fn new(models: Vec<Model>) -> Self {
        Self {
            object: "list".to_string(),
            data: models,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_deserialization() {
        let json = r#"{
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": "Hello!"}
            ],
            "temperature": 0.7,
            "stream": true,
            "top_k": 40
        }"#;

        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.model.as_deref(), Some("gpt-4"));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, Some(0.7));
        assert!(request.stream);
        assert_eq!(request.extra.get("top_k"), Some(&serde_json::json!(40)));
    }

    #[test]
    fn test_unknown_params_survive_reserialization() {
        let json = r#"{"messages": [], "min_p": 0.1, "repetition_penalty": 1.2}"#;
        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["min_p"], serde_json::json!(0.1));
        assert_eq!(value["repetition_penalty"], serde_json::json!(1.2));
        assert!(value.get("model").is_none());
    }

    #[test]
    fn test_message_content_parts() {
        let json = r#"{
            "role": "user",
            "content": [
                {"type": "text", "text": "What is in"},
                {"type": "image_url", "image_url": {"url": "http://x"}},
                {"type": "text", "text": "this image?"}
            ]
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.text(), "What is in this image?");
    }

    #[test]
    fn test_assistant_message_without_content() {
        let json = r#"{
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": "call_1", "type": "function",
                            "function": {"name": "f", "arguments": "{}"}}]
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.text(), "");
        assert_eq!(message.tool_calls.unwrap()[0].function.name, "f");
    }

    #[test]
    fn test_prompt_shapes() {
        let text: CompletionRequest = serde_json::from_str(r#"{"prompt": "abcdefgh"}"#).unwrap();
        assert_eq!(text.prompt_tokens(), 2);

        let texts: CompletionRequest =
            serde_json::from_str(r#"{"prompt": ["abcd", "abcde"]}"#).unwrap();
        assert_eq!(texts.prompt_tokens(), 3);

        let tokens: CompletionRequest = serde_json::from_str(r#"{"prompt": [1, 2, 3]}"#).unwrap();
        assert_eq!(tokens.prompt_tokens(), 3);

        let none: CompletionRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(none.prompt_tokens(), 0);
    }

    #[test]
    fn test_embedding_input_items() {
        let input: EmbeddingInput = serde_json::from_str(r#""hello world""#).unwrap();
        assert_eq!(input.items().len(), 1);
        assert_eq!(input.token_count(), 3);

        let input: EmbeddingInput = serde_json::from_str(r#"["a", "bb", "ccccc"]"#).unwrap();
        assert_eq!(input.items().len(), 3);
        assert_eq!(input.token_count(), 4);

        let input: EmbeddingInput = serde_json::from_str(r#"[5, 6, 7, 8]"#).unwrap();
        assert_eq!(input.items(), vec![EmbeddingItem::Tokens(&[5, 6, 7, 8])]);
        assert_eq!(input.token_count(), 4);

        let input: EmbeddingInput = serde_json::from_str(r#"[[1, 2], [3]]"#).unwrap();
        assert_eq!(input.items().len(), 2);
        assert_eq!(input.token_count(), 3);

        let input: EmbeddingInput = serde_json::from_str("42").unwrap();
        assert_eq!(input.token_count(), 1);
    }

    #[test]
    fn test_chat_chunk_first_and_last() {
        let first = ChatCompletionChunk::new("id".into(), "m".into(), 1)
            .with_content("Hi".into(), true, false);
        let json = serde_json::to_value(&first).unwrap();
        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["choices"][0]["delta"]["role"], "assistant");
        assert!(json["choices"][0]["finish_reason"].is_null());

        let last = ChatCompletionChunk::new("id".into(), "m".into(), 1)
            .with_content(".".into(), false, true);
        let json = serde_json::to_value(&last).unwrap();
        assert!(json["choices"][0]["delta"].get("role").is_none());
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_completion_chunk() {
        let chunk = CompletionChunk::new("cmpl-1".into(), "m".into(), 1, " harm".into(), false);
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["object"], "text_completion");
        assert_eq!(json["choices"][0]["text"], " harm");
        assert!(json["choices"][0]["logprobs"].is_null());
    }

    #[test]
    fn test_embedding_summary_has_no_completion_tokens() {
        let response = EmbeddingResponse {
            id: "embd-1".into(),
            object: "list".into(),
            created: 0,
            model: "m".into(),
            data: vec![],
            usage: EmbeddingUsage {
                prompt_tokens: 5,
                total_tokens: 5,
            },
        };
        let summary = response.summary();
        assert_eq!(summary.usage, Usage::new(5, 0));
        assert_eq!(summary.text, "Embeddings generated: 0 vectors");
        assert!(summary.finish_reason.is_none());
        let json = serde_json::to_value(EmbeddingUsage::default()).unwrap();
        assert!(json.get("completion_tokens").is_none());
    }

    #[test]
    fn test_request_limits() {
        let request: ChatCompletionRequest =
            serde_json::from_str(r#"{"messages": [], "n": 128}"#).unwrap();
        assert!(request.validate().is_ok());

        let request: CompletionRequest = serde_json::from_str(r#"{"n": 4000000000}"#).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.param, "n");
        assert_eq!(err.to_string(), "'n' must be at most 128, got 4000000000");

        let request: EmbeddingRequest =
            serde_json::from_str(r#"{"input": "x", "dimensions": 100000000000}"#).unwrap();
        assert_eq!(request.validate().unwrap_err().param, "dimensions");

        let request: EmbeddingRequest =
            serde_json::from_str(r#"{"input": "x", "dimensions": 8192}"#).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_usage_tolerates_missing_completion_tokens() {
        let usage: Usage = serde_json::from_str(r#"{"prompt_tokens": 4, "total_tokens": 4}"#).unwrap();
        assert_eq!(usage.completion_tokens, 0);
    }
}
