// Streaming Engine Module
// Delivers responses as Server-Sent Events, one chunk at a time with a
// fixed inter-chunk delay, and stops as soon as the client goes away.

use crate::openai::{ChatCompletionChunk, CompletionChunk, Usage};
use crate::tokens::count_tokens;
use async_stream::stream;
use axum::body::Bytes;
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Terminal event of every stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Default pause between chunks
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(50);

const SINK_BUFFER: usize = 16;

/// Response body fed by an `EventSink`
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// Format a chunk as Server-Sent Event
pub fn format_sse<T: Serialize>(chunk: &T) -> String {
    let json = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}

/// Write half of a streaming response.
///
/// The read half is the HTTP body; when the client disconnects the body is
/// dropped and the sink reports itself closed. Dropping the sink ends the body.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Bytes>,
}

impl EventSink {
    /// Create a sink and the body stream it feeds
    pub fn channel() -> (EventSink, BodyStream) {
        Self::with_capacity(SINK_BUFFER)
    }

    pub fn with_capacity(buffer: usize) -> (EventSink, BodyStream) {
        let (tx, mut rx) = mpsc::channel::<Bytes>(buffer.max(1));
        let body = Box::pin(stream! {
            while let Some(bytes) = rx.recv().await {
                yield Ok::<Bytes, Infallible>(bytes);
            }
        });
        (EventSink { tx }, body)
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Forward raw bytes; false once the client is gone
    pub async fn send(&self, bytes: Bytes) -> bool {
        self.tx.send(bytes).await.is_ok()
    }

    pub async fn send_event<T: Serialize>(&self, chunk: &T) -> bool {
        self.send(Bytes::from(format_sse(chunk))).await
    }

    pub async fn send_done(&self) -> bool {
        self.send(Bytes::from_static(DONE_FRAME.as_bytes())).await
    }
}

/// Which chunk envelope a stream uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// `chat.completion.chunk` with deltas
    Chat,
    /// `text_completion` with `choices[0].text`
    Completion,
}

/// What a finished (or interrupted) stream produced
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub id: String,
    pub model: String,
    pub content: String,
    pub usage: Usage,
    /// The client went away before every chunk was delivered
    pub disconnected: bool,
}

/// Split text on single spaces; every word after the first keeps a leading space
pub fn split_words(text: &str) -> Vec<String> {
    text.split(' ')
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                word.to_string()
            } else {
                format!(" {}", word)
            }
        })
        .collect()
}

/// A response that is streamed chunk by chunk
#[derive(Debug, Clone)]
pub struct TokenStream {
    id: String,
    model: String,
    created: i64,
    kind: ChunkKind,
    tokens: Vec<String>,
    delay: Duration,
    prompt_tokens: u32,
}

impl TokenStream {
    fn frame(&self, index: usize, token: &str) -> String {
        let first = index == 0;
        let last = index + 1 == self.tokens.len();
        match self.kind {
            ChunkKind::Chat => format_sse(
                &ChatCompletionChunk::new(self.id.clone(), self.model.clone(), self.created)
                    .with_content(token.to_string(), first, last),
            ),
            ChunkKind::Completion => format_sse(&CompletionChunk::new(
                self.id.clone(),
                self.model.clone(),
                self.created,
                token.to_string(),
                last,
            )),
        }
    }

    /// Emit every chunk into `sink`, then `[DONE]`.
    ///
    /// `on_chunk` sees each delivered token; `on_complete` runs exactly once,
    /// also when the client disconnected midway.
    pub async fn emit<C, F>(self, sink: EventSink, mut on_chunk: C, on_complete: F)
    where
        C: FnMut(&str),
        F: FnOnce(StreamOutcome),
    {
        let mut content = String::new();
        let mut disconnected = false;

        for (index, token) in self.tokens.iter().enumerate() {
            if !sink.is_open() {
                disconnected = true;
                break;
            }
            if index > 0 && !self.delay.is_zero() {
                sleep(self.delay).await;
                if !sink.is_open() {
                    disconnected = true;
                    break;
                }
            }
            if !sink.send(Bytes::from(self.frame(index, token))).await {
                disconnected = true;
                break;
            }
            content.push_str(token);
            on_chunk(token);
        }

        if !disconnected {
            sink.send_done().await;
        }
        drop(sink);

        let usage = Usage::new(self.prompt_tokens, count_tokens(&content));
        on_complete(StreamOutcome {
            id: self.id,
            model: self.model,
            content,
            usage,
            disconnected,
        });
    }
}

/// Builder for creating token streams
pub struct TokenStreamBuilder {
    id: Option<String>,
    model: String,
    created: Option<i64>,
    kind: ChunkKind,
    tokens: Vec<String>,
    delay: Duration,
    prompt_tokens: u32,
}

impl TokenStreamBuilder {
    pub fn new<I, S>(kind: ChunkKind, model: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: None,
            model: model.into(),
            created: None,
            kind,
            tokens: tokens.into_iter().map(Into::into).collect(),
            delay: DEFAULT_CHUNK_DELAY,
            prompt_tokens: 0,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn created(mut self, created: i64) -> Self {
        self.created = Some(created);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn prompt_tokens(mut self, prompt_tokens: u32) -> Self {
        self.prompt_tokens = prompt_tokens;
        self
    }

    pub fn build(self) -> TokenStream {
        let prefix = match self.kind {
            ChunkKind::Chat => "chatcmpl",
            ChunkKind::Completion => "cmpl",
        };
        TokenStream {
            id: self
                .id
                .unwrap_or_else(|| format!("{}-{}", prefix, uuid::Uuid::new_v4())),
            model: self.model,
            created: self
                .created
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            kind: self.kind,
            tokens: self.tokens,
            delay: self.delay,
            prompt_tokens: self.prompt_tokens,
        }
    }
}
