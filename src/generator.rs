// Fake Response Generator Module
// Synthesizes completion, chat and embedding payloads without any upstream
// model, plus the fixed token sequences used by fake streaming.

use crate::openai::models::{
    list_models, DEFAULT_CHAT_MODEL, DEFAULT_COMPLETION_MODEL, DEFAULT_EMBEDDING_MODEL,
};
use crate::openai::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, CompletionChoice,
    CompletionRequest, CompletionResponse, EmbeddingData, EmbeddingRequest, EmbeddingResponse,
    EmbeddingUsage, Message, ModelsResponse, Tool, Usage,
};
use crate::tokens::count_tokens;
use rand::Rng;
use rand_distr::StandardNormal;
use std::time::Duration;

pub const COMPLETION_TEXT: &str = " or through inaction allow a human being to come to harm.";

pub const WEATHER_REPLY: &str =
    "Based on the current data, the weather is sunny with a temperature of 22°C.";
pub const GREETING_REPLY: &str = "Hello! How can I assist you today?";
pub const HELP_REPLY: &str = "I'm here to help! What would you like to know?";
pub const DEFAULT_REPLY: &str =
    "This is a fake response generated by the vLLM fake server for testing purposes.";
pub const EMPTY_CONVERSATION_REPLY: &str = "Hello! How can I help you today?";

/// Token sequence emitted by fake chat streaming
pub const CHAT_STREAM_TOKENS: &[&str] = &[
    "This",
    " is",
    " a",
    " fake",
    " streaming",
    " chat",
    " completion",
    " response",
    ".",
];

/// Token sequence emitted by fake completion streaming
pub const COMPLETION_STREAM_TOKENS: &[&str] = &[
    "or",
    " through",
    " inaction",
    " allow",
    " a",
    " human",
    " being",
    " to",
    " come",
    " to",
    " harm",
    ".",
];

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Re-draws allowed before falling back to a basis vector
const MAX_EMBEDDING_DRAWS: usize = 8;

/// Keyword-driven canned replies
#[derive(Debug, Default, Clone, Copy)]
pub struct CannedResponses;

impl CannedResponses {
    /// Reply for a chat conversation; keyword rules win over tools
    pub fn chat_reply(&self, messages: &[Message], tools: Option<&[Tool]>) -> String {
        let Some(last) = messages.last() else {
            return EMPTY_CONVERSATION_REPLY.to_string();
        };

        let content = last.text().to_lowercase();
        if content.contains("weather") {
            return WEATHER_REPLY.to_string();
        }
        if content.contains("hello") || content.contains("hi") {
            return GREETING_REPLY.to_string();
        }
        if content.contains("help") {
            return HELP_REPLY.to_string();
        }
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();
            return format!(
                "I can help you with that using available tools: {}.",
                names.join(", ")
            );
        }
        DEFAULT_REPLY.to_string()
    }

    pub fn completion_text(&self, _request: &CompletionRequest) -> String {
        COMPLETION_TEXT.to_string()
    }
}

/// Generate an id like `chatcmpl-<uuid>`
pub fn generate_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// A vector of standard-normal components scaled to unit length.
///
/// An all-zero draw is redrawn a few times, then replaced by `e0`.
pub fn normalized_embedding(dimensions: usize) -> Vec<f32> {
    if dimensions == 0 {
        return Vec::new();
    }

    let mut rng = rand::rng();
    for _ in 0..MAX_EMBEDDING_DRAWS {
        let raw: Vec<f32> = (0..dimensions).map(|_| rng.sample(StandardNormal)).collect();
        let magnitude = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 && magnitude.is_finite() {
            return raw.into_iter().map(|x| x / magnitude).collect();
        }
    }

    let mut basis = vec![0.0; dimensions];
    basis[0] = 1.0;
    basis
}

/// Number of choices to produce; zero or absent means one
fn choice_count(n: Option<u32>) -> u32 {
    n.filter(|n| *n > 0).unwrap_or(1)
}

/// Fake response synthesizer
#[derive(Debug, Clone)]
pub struct FakeGenerator {
    latency: Duration,
    dimensions: usize,
    responses: CannedResponses,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl FakeGenerator {
    pub fn new(latency: Duration, dimensions: usize) -> Self {
        Self {
            latency,
            dimensions,
            responses: CannedResponses,
        }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn simulate_work(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub async fn completion(&self, request: &CompletionRequest) -> CompletionResponse {
        self.simulate_work().await;

        let text = self.responses.completion_text(request);
        let choices = (0..choice_count(request.n))
            .map(|index| CompletionChoice {
                index,
                text: text.clone(),
                logprobs: None,
                finish_reason: Some("stop".to_string()),
            })
            .collect();

        CompletionResponse {
            id: generate_id("cmpl"),
            object: "text_completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: request
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            choices,
            usage: Usage::new(request.prompt_tokens(), count_tokens(&text)),
        }
    }

    pub async fn chat_completion(&self, request: &ChatCompletionRequest) -> ChatCompletionResponse {
        self.simulate_work().await;

        let reply = self
            .responses
            .chat_reply(&request.messages, request.tools.as_deref());
        let choices = (0..choice_count(request.n))
            .map(|index| ChatChoice {
                index,
                message: Message::assistant(reply.clone()),
                logprobs: None,
                finish_reason: Some("stop".to_string()),
            })
            .collect();

        ChatCompletionResponse {
            id: generate_id("chatcmpl"),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: request
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            choices,
            usage: Usage::new(request.prompt_tokens(), count_tokens(&reply)),
            system_fingerprint: None,
        }
    }

    pub async fn embeddings(&self, request: &EmbeddingRequest) -> EmbeddingResponse {
        self.simulate_work().await;

        let dimensions = request.dimensions.unwrap_or(self.dimensions);
        let items = request.input.items();
        let data = items
            .iter()
            .enumerate()
            .map(|(index, _)| EmbeddingData {
                index: index as u32,
                object: "embedding".to_string(),
                embedding: normalized_embedding(dimensions),
            })
            .collect();
        let tokens = request.input.token_count();

        EmbeddingResponse {
            id: generate_id("embd"),
            object: "list".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: request
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            data,
            usage: EmbeddingUsage {
                prompt_tokens: tokens,
                total_tokens: tokens,
            },
        }
    }

    pub fn models(&self) -> ModelsResponse {
        list_models()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::{EmbeddingInput, Function, Prompt};
    use serde_json::Map;

    fn instant() -> FakeGenerator {
        FakeGenerator::new(Duration::ZERO, DEFAULT_EMBEDDING_DIMENSIONS)
    }

    fn chat(content: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages: vec![Message::user(content)],
            ..Default::default()
        }
    }

    fn tool(name: &str) -> Tool {
        Tool {
            tool_type: "function".to_string(),
            function: Function {
                name: name.to_string(),
                description: None,
                parameters: None,
            },
        }
    }

    fn embedding_request(input: EmbeddingInput) -> EmbeddingRequest {
        EmbeddingRequest {
            model: None,
            input,
            encoding_format: None,
            dimensions: None,
            user: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_reply_rules_in_order() {
        let canned = CannedResponses;
        let reply = |text: &str| canned.chat_reply(&[Message::user(text)], None);

        assert_eq!(reply("What's the WEATHER like? hello"), WEATHER_REPLY);
        assert_eq!(reply("Hello there"), GREETING_REPLY);
        assert_eq!(reply("say hi"), GREETING_REPLY);
        assert_eq!(reply("I need help"), HELP_REPLY);
        assert_eq!(reply("quantum"), DEFAULT_REPLY);
        assert_eq!(canned.chat_reply(&[], None), EMPTY_CONVERSATION_REPLY);
    }

    #[test]
    fn test_reply_lists_tools() {
        let canned = CannedResponses;
        let tools = vec![tool("get_weather"), tool("search")];
        let reply = canned.chat_reply(&[Message::user("book a flight")], Some(&tools));
        assert_eq!(
            reply,
            "I can help you with that using available tools: get_weather, search."
        );

        // keyword rules win over tools
        let reply = canned.chat_reply(&[Message::user("help")], Some(&tools));
        assert_eq!(reply, HELP_REPLY);
    }

    #[tokio::test]
    async fn test_chat_completion_hello_there() {
        let response = instant().chat_completion(&chat("Hello there")).await;

        assert!(response.id.starts_with("chatcmpl-"));
        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.model, "fake-llama-3-8b");
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.text(), GREETING_REPLY);
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.prompt_tokens, 3);
        assert_eq!(response.usage.completion_tokens, 9);
        assert_eq!(response.usage.total_tokens, 12);
    }

    #[tokio::test]
    async fn test_completion_n_choices() {
        let request = CompletionRequest {
            model: Some("fake-mistral-7b".to_string()),
            prompt: Some(Prompt::Text("Three laws".to_string())),
            n: Some(3),
            ..Default::default()
        };
        let response = instant().completion(&request).await;

        assert!(response.id.starts_with("cmpl-"));
        assert_eq!(response.model, "fake-mistral-7b");
        assert_eq!(response.choices.len(), 3);
        for (i, choice) in response.choices.iter().enumerate() {
            assert_eq!(choice.index, i as u32);
            assert_eq!(choice.text, COMPLETION_TEXT);
        }
        assert_eq!(response.usage.prompt_tokens, 3);
        assert_eq!(response.usage.completion_tokens, count_tokens(COMPLETION_TEXT));
    }

    #[tokio::test]
    async fn test_completion_zero_n_is_one() {
        let request = CompletionRequest {
            n: Some(0),
            ..Default::default()
        };
        let response = instant().completion(&request).await;
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.usage.prompt_tokens, 0);
    }

    #[tokio::test]
    async fn test_embeddings_unit_norm() {
        let request = embedding_request(EmbeddingInput::Texts(vec![
            "first".to_string(),
            "second".to_string(),
        ]));
        let response = instant().embeddings(&request).await;

        assert!(response.id.starts_with("embd-"));
        assert_eq!(response.model, "fake-e5-embeddings");
        assert_eq!(response.data.len(), 2);
        for (i, data) in response.data.iter().enumerate() {
            assert_eq!(data.index, i as u32);
            assert_eq!(data.embedding.len(), 768);
            let norm = data.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm {}", norm);
        }
        assert_eq!(response.usage.prompt_tokens, 4);
        assert_eq!(response.usage.total_tokens, 4);
    }

    #[tokio::test]
    async fn test_embeddings_requested_dimensions() {
        let mut request = embedding_request(EmbeddingInput::Tokens(vec![1, 2, 3]));
        request.dimensions = Some(16);
        let response = instant().embeddings(&request).await;
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].embedding.len(), 16);
        assert_eq!(response.usage.prompt_tokens, 3);
    }

    #[test]
    fn test_normalized_embedding_edge_sizes() {
        assert!(normalized_embedding(0).is_empty());
        let one = normalized_embedding(1);
        assert_eq!(one.len(), 1);
        assert!((one[0].abs() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_generator_waits_for_latency() {
        let generator = FakeGenerator::new(Duration::from_millis(30), 8);
        let start = std::time::Instant::now();
        generator.chat_completion(&chat("x")).await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_stream_sequences_concatenate() {
        assert_eq!(
            CHAT_STREAM_TOKENS.concat(),
            "This is a fake streaming chat completion response."
        );
        assert_eq!(
            COMPLETION_STREAM_TOKENS.concat(),
            "or through inaction allow a human being to come to harm."
        );
    }
}
