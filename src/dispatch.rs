// Request Dispatcher
// Decides how each generation request is answered: a simulated fault,
// the live upstream, or the fake generator as the fallback.

use crate::errors::{ErrorSimulator, SimulatedError};
use crate::generator::{FakeGenerator, CHAT_STREAM_TOKENS, COMPLETION_STREAM_TOKENS};
use crate::openai::models::{DEFAULT_CHAT_MODEL, DEFAULT_COMPLETION_MODEL};
use crate::openai::{
    ChatCompletionRequest, ChatCompletionResponse, CompletionRequest, CompletionResponse,
    EmbeddingRequest, EmbeddingResponse, ModelsResponse, ResponseSummary, Summarize, ToolCall,
    Usage,
};
use crate::passthrough::{Passthrough, PassthroughError, UpstreamReply};
use serde::Serialize;
use crate::stream::{split_words, BodyStream, ChunkKind, EventSink, StreamOutcome, TokenStreamBuilder};
use crate::tokens::count_tokens;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one passthrough attempt
#[derive(Debug)]
pub enum Attempt<T> {
    Succeeded(T),
    Failed(PassthroughError),
}

impl<T> From<Result<T, PassthroughError>> for Attempt<T> {
    fn from(result: Result<T, PassthroughError>) -> Self {
        match result {
            Ok(value) => Attempt::Succeeded(value),
            Err(err) => Attempt::Failed(err),
        }
    }
}

impl<T> Attempt<T> {
    /// The value, or `None` after logging the failure
    fn or_fallback(self, endpoint: &str) -> Option<T> {
        match self {
            Attempt::Succeeded(value) => Some(value),
            Attempt::Failed(err) => {
                tracing::warn!(endpoint, error = %err, "passthrough failed, falling back to fake response");
                None
            }
        }
    }
}

/// A unary answer: the upstream's JSON as received, or a fake response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Upstream(UpstreamReply),
    Fake(T),
}

impl<T> Reply<T> {
    pub fn is_upstream(&self) -> bool {
        matches!(self, Reply::Upstream(_))
    }
}

impl<T: Summarize> Summarize for Reply<T> {
    fn summary(&self) -> ResponseSummary {
        match self {
            Reply::Upstream(reply) => reply.summary(),
            Reply::Fake(response) => response.summary(),
        }
    }
}

/// Final report of a streamed response
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCompletion {
    pub model: String,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub usage: Usage,
    pub disconnected: bool,
}

impl From<StreamOutcome> for StreamCompletion {
    fn from(outcome: StreamOutcome) -> Self {
        Self {
            model: outcome.model,
            content: outcome.content,
            tool_calls: None,
            usage: outcome.usage,
            disconnected: outcome.disconnected,
        }
    }
}

type ChunkCallback = Box<dyn FnMut(&str) + Send>;
type CompleteCallback = Box<dyn FnOnce(StreamCompletion) + Send>;

/// Callbacks a streaming caller receives
pub struct StreamCallbacks {
    on_chunk: ChunkCallback,
    on_complete: CompleteCallback,
}

impl StreamCallbacks {
    pub fn new(
        on_chunk: impl FnMut(&str) + Send + 'static,
        on_complete: impl FnOnce(StreamCompletion) + Send + 'static,
    ) -> Self {
        Self {
            on_chunk: Box::new(on_chunk),
            on_complete: Box::new(on_complete),
        }
    }

    /// Callbacks that ignore everything
    pub fn noop() -> Self {
        Self::new(|_| {}, |_| {})
    }
}

/// Routes requests through fault simulation, passthrough and fake generation
#[derive(Clone)]
pub struct Dispatcher {
    errors: Arc<ErrorSimulator>,
    passthrough: Arc<Passthrough>,
    generator: FakeGenerator,
    stream_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        errors: Arc<ErrorSimulator>,
        passthrough: Arc<Passthrough>,
        generator: FakeGenerator,
        stream_delay: Duration,
    ) -> Self {
        Self {
            errors,
            passthrough,
            generator,
            stream_delay,
        }
    }

    pub fn errors(&self) -> &Arc<ErrorSimulator> {
        &self.errors
    }

    pub fn passthrough(&self) -> &Arc<Passthrough> {
        &self.passthrough
    }

    pub fn generator(&self) -> &FakeGenerator {
        &self.generator
    }

    /// The active simulated fault, if any
    pub fn check_errors(&self) -> Result<(), SimulatedError> {
        match self.errors.error_response() {
            Some(error) => {
                tracing::warn!(kind = %error.kind, status = error.status, "returning simulated error");
                Err(error)
            }
            None => Ok(()),
        }
    }

    pub fn models(&self) -> ModelsResponse {
        self.generator.models()
    }

    pub async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<Reply<CompletionResponse>, SimulatedError> {
        self.check_errors()?;
        if let Some(client) = self.passthrough.client() {
            let attempt = Attempt::from(client.unary_completion(request).await);
            if let Some(reply) = attempt.or_fallback("completions") {
                return Ok(Reply::Upstream(reply));
            }
        }
        Ok(Reply::Fake(self.generator.completion(request).await))
    }

    pub async fn chat(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<Reply<ChatCompletionResponse>, SimulatedError> {
        self.check_errors()?;
        if let Some(client) = self.passthrough.client() {
            let attempt = Attempt::from(client.unary_chat(request).await);
            if let Some(reply) = attempt.or_fallback("chat/completions") {
                return Ok(Reply::Upstream(reply));
            }
        }
        Ok(Reply::Fake(self.generator.chat_completion(request).await))
    }

    pub async fn embeddings(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<Reply<EmbeddingResponse>, SimulatedError> {
        self.check_errors()?;
        if let Some(client) = self.passthrough.client() {
            let attempt = Attempt::from(client.unary_embedding(request).await);
            if let Some(reply) = attempt.or_fallback("embeddings") {
                return Ok(Reply::Upstream(reply));
            }
        }
        Ok(Reply::Fake(self.generator.embeddings(request).await))
    }

    /// Start a streamed completion.
    ///
    /// A simulated fault is returned before anything is streamed. Otherwise
    /// the body is fed by a background task.
    pub fn stream_completion(
        &self,
        request: CompletionRequest,
        callbacks: StreamCallbacks,
    ) -> Result<BodyStream, SimulatedError> {
        self.check_errors()?;
        let (sink, body) = EventSink::channel();
        let this = self.clone();
        tokio::spawn(async move { this.run_completion_stream(request, sink, callbacks).await });
        Ok(body)
    }

    /// Start a streamed chat completion
    pub fn stream_chat(
        &self,
        request: ChatCompletionRequest,
        callbacks: StreamCallbacks,
    ) -> Result<BodyStream, SimulatedError> {
        self.check_errors()?;
        let (sink, body) = EventSink::channel();
        let this = self.clone();
        tokio::spawn(async move { this.run_chat_stream(request, sink, callbacks).await });
        Ok(body)
    }

    async fn run_completion_stream(
        &self,
        request: CompletionRequest,
        sink: EventSink,
        callbacks: StreamCallbacks,
    ) {
        // upstream completions are fetched whole and re-chunked word by word
        let mut builder = None;
        if let Some(client) = self.passthrough.client() {
            let attempt = Attempt::from(client.unary_completion(&request).await);
            if let Some(reply) = attempt.or_fallback("completions") {
                builder = Some(
                    TokenStreamBuilder::new(
                        ChunkKind::Completion,
                        reply.model(),
                        split_words(&reply.text()),
                    )
                    .id(reply.id())
                    .created(reply.created()),
                );
            }
        }
        let builder = builder.unwrap_or_else(|| {
            let model = request
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string());
            TokenStreamBuilder::new(
                ChunkKind::Completion,
                model,
                COMPLETION_STREAM_TOKENS.iter().copied(),
            )
        });

        let stream = builder
            .delay(self.stream_delay)
            .prompt_tokens(request.prompt_tokens())
            .build();
        let StreamCallbacks {
            mut on_chunk,
            on_complete,
        } = callbacks;
        stream
            .emit(sink, |t| on_chunk(t), move |o| on_complete(o.into()))
            .await;
    }

    async fn run_chat_stream(
        &self,
        request: ChatCompletionRequest,
        sink: EventSink,
        callbacks: StreamCallbacks,
    ) {
        let StreamCallbacks {
            mut on_chunk,
            on_complete,
        } = callbacks;
        let prompt_tokens = request.prompt_tokens();

        if let Some(client) = self.passthrough.client() {
            let attempt = Attempt::from(client.stream_chat(&request, &sink, |t| on_chunk(t)).await);
            if let Some(summary) = attempt.or_fallback("chat/completions") {
                let usage = summary
                    .usage
                    .unwrap_or_else(|| Usage::new(prompt_tokens, count_tokens(&summary.content)));
                on_complete(StreamCompletion {
                    model: summary.model,
                    content: summary.content,
                    tool_calls: summary.tool_calls,
                    usage,
                    disconnected: summary.disconnected,
                });
                return;
            }
        }

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        TokenStreamBuilder::new(ChunkKind::Chat, model, CHAT_STREAM_TOKENS.iter().copied())
            .delay(self.stream_delay)
            .prompt_tokens(prompt_tokens)
            .build()
            .emit(sink, |t| on_chunk(t), move |o| on_complete(o.into()))
            .await;
    }
}
