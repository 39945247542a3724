//! # llm-doctor - OpenAI-compatible mock server
//!
//! A drop-in stand-in for the OpenAI HTTP API, built for exercising client
//! code without paying for (or depending on) a real model.
//!
//! ## Features
//!
//! - Fake completions, chat completions, embeddings and model listings
//! - Streaming support (Server-Sent Events)
//! - Switchable fault simulation (rate limits, timeouts, content filter, ...)
//! - Optional passthrough to a real provider with fallback to fake responses
//! - Request history and live stats, with a terminal dashboard
//!
//! ## Usage
//!
//! ### As a CLI
//!
//! ```bash
//! # Start the server
//! llm-doctor serve --port 8032
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use llm_doctor::{
//!     errors::{ErrorKind, ErrorSimulator},
//!     generator::FakeGenerator,
//!     openai::{ChatCompletionRequest, Message},
//! };
//!
//! # async fn demo() {
//! let generator = FakeGenerator::default();
//! let request = ChatCompletionRequest {
//!     messages: vec![Message::user("Hello there")],
//!     ..Default::default()
//! };
//! let response = generator.chat_completion(&request).await;
//! println!("{}", response.text());
//!
//! let errors = ErrorSimulator::new();
//! errors.enable(ErrorKind::RateLimit);
//! assert_eq!(errors.error_response().unwrap().status, 429);
//! # }
//! ```

// Core library modules
pub mod dispatch;
pub mod errors;
pub mod generator;
pub mod openai;
pub mod passthrough;
pub mod stats;
pub mod stream;
pub mod tokens;
pub mod tracker;

// CLI module (for `llm-doctor serve` command)
pub mod cli;

// TUI module (for `llm-doctor serve --tui`)
pub mod tui;

// Re-export commonly used types
pub use dispatch::{Attempt, Dispatcher, Reply, StreamCallbacks, StreamCompletion};
pub use errors::{ErrorKind, ErrorSimulator, SimulatedError};
pub use generator::{CannedResponses, FakeGenerator};
pub use passthrough::{
    Passthrough, PassthroughClient, PassthroughConfig, PassthroughError, UpstreamReply,
};
pub use stats::{new_shared_stats, SharedStats, StatCategory, Stats, StatsSnapshot};
pub use stream::{EventSink, TokenStream, TokenStreamBuilder};
pub use tokens::count_tokens;
pub use tracker::{EntryState, RequestId, RequestLogEntry, RequestTracker, ResponseRecord};
