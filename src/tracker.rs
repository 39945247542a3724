//! Request lifecycle tracking.
//!
//! Every inbound request gets an entry on arrival. The entry moves
//! `Pending -> Streaming* -> Completed | Aborted` and lives in a bounded
//! history. The tracker is the only writer; everyone else gets clones.

use crate::openai::{ToolCall, Usage};
use crate::stats::SharedStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Opaque request identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Streaming,
    Completed,
    Aborted,
}

impl EntryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Completed | EntryState::Aborted)
    }
}

/// What the server answered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseRecord {
    pub status: u16,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Marks the start of a stream rather than a final answer
    pub streaming: bool,
}

impl ResponseRecord {
    /// A final answer with the given content
    pub fn completed(content: impl Into<String>) -> Self {
        Self {
            status: 200,
            content: content.into(),
            tool_calls: None,
            finish_reason: None,
            model: None,
            usage: None,
            streaming: false,
        }
    }

    /// The "stream has started" marker
    pub fn streaming() -> Self {
        Self {
            streaming: true,
            ..Self::completed("")
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    pub fn tool_calls(mut self, tool_calls: Option<Vec<ToolCall>>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// One tracked request
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    pub id: RequestId,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: String,
    pub body: Value,
    pub headers: BTreeMap<String, String>,
    pub response: Option<ResponseRecord>,
    /// Text streamed so far; cleared when the stream completes
    pub streaming_content: Option<String>,
    pub elapsed_ms: Option<u64>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub aborted: bool,
    pub state: EntryState,
    #[serde(skip)]
    started: Instant,
}

impl RequestLogEntry {
    /// Time since arrival, or the fixed elapsed time once terminal
    pub fn elapsed(&self) -> Duration {
        match self.elapsed_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.started.elapsed(),
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.tokens_in + self.tokens_out
    }

    /// Final content, or whatever has streamed so far
    pub fn display_content(&self) -> &str {
        if let Some(response) = self.response.as_ref() {
            return &response.content;
        }
        self.streaming_content.as_deref().unwrap_or("")
    }

    fn fix_elapsed(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        self.elapsed_ms = Some(elapsed.as_millis() as u64);
        elapsed
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<RequestId, RequestLogEntry>,
    history: VecDeque<RequestId>,
    pending: HashSet<RequestId>,
}

impl Inner {
    /// Drop an entry that left both the history and the pending set
    fn forget_if_evicted(&mut self, id: RequestId) {
        if !self.pending.contains(&id) && !self.history.contains(&id) {
            self.entries.remove(&id);
        }
    }
}

/// Bounded request log plus pending-set bookkeeping
#[derive(Debug)]
pub struct RequestTracker {
    capacity: usize,
    stats: SharedStats,
    inner: Mutex<Inner>,
}

impl RequestTracker {
    pub fn new(capacity: usize, stats: SharedStats) -> Self {
        Self {
            capacity: capacity.max(1),
            stats,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Register an arriving request
    pub fn begin(
        &self,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        body: Value,
        headers: BTreeMap<String, String>,
    ) -> RequestId {
        let id = RequestId::new();
        let entry = RequestLogEntry {
            id,
            timestamp: Utc::now(),
            endpoint: endpoint.into(),
            method: method.into(),
            body,
            headers,
            response: None,
            streaming_content: None,
            elapsed_ms: None,
            tokens_in: 0,
            tokens_out: 0,
            aborted: false,
            state: EntryState::Pending,
            started: Instant::now(),
        };

        {
            let mut inner = self.inner();
            inner.entries.insert(id, entry);
            inner.pending.insert(id);
            inner.history.push_back(id);
            while inner.history.len() > self.capacity {
                if let Some(oldest) = inner.history.pop_front() {
                    inner.forget_if_evicted(oldest);
                }
            }
        }

        self.stats.record_request();
        id
    }

    /// Record the answer for a pending request.
    ///
    /// A `streaming` record only flips the entry to `Streaming`. Returns
    /// false when the request is no longer pending.
    pub fn record_response(&self, id: RequestId, record: ResponseRecord) -> bool {
        let mut inner = self.inner();
        if !inner.pending.contains(&id) {
            return false;
        }
        let Some(entry) = inner.entries.get_mut(&id) else {
            return false;
        };

        if record.streaming {
            entry.state = EntryState::Streaming;
            entry.streaming_content.get_or_insert_with(String::new);
            return true;
        }

        let elapsed = entry.fix_elapsed();
        let usage = record.usage;
        if let Some(usage) = usage {
            entry.tokens_in = usage.prompt_tokens;
            entry.tokens_out = usage.completion_tokens;
        }
        entry.streaming_content = None;
        entry.response = Some(record);
        entry.state = EntryState::Completed;

        inner.pending.remove(&id);
        inner.forget_if_evicted(id);
        drop(inner);

        if let Some(usage) = usage {
            self.stats
                .add_tokens(usage.prompt_tokens, usage.completion_tokens);
        }
        self.stats.record_latency(elapsed);
        true
    }

    /// Append streamed text; ignored once the request left the pending set
    pub fn append_stream_chunk(&self, id: RequestId, text: &str) {
        let mut inner = self.inner();
        if !inner.pending.contains(&id) {
            return;
        }
        if let Some(entry) = inner.entries.get_mut(&id) {
            entry
                .streaming_content
                .get_or_insert_with(String::new)
                .push_str(text);
        }
    }

    /// Mark a pending request as aborted. A completed request is left alone.
    pub fn mark_aborted(&self, id: RequestId) -> bool {
        let mut inner = self.inner();
        if !inner.pending.contains(&id) {
            return false;
        }
        let Some(entry) = inner.entries.get_mut(&id) else {
            return false;
        };
        if entry.response.is_some() {
            return false;
        }

        entry.fix_elapsed();
        entry.aborted = true;
        entry.state = EntryState::Aborted;
        inner.pending.remove(&id);
        inner.forget_if_evicted(id);
        true
    }

    pub fn get(&self, id: RequestId) -> Option<RequestLogEntry> {
        self.inner().entries.get(&id).cloned()
    }

    pub fn state(&self, id: RequestId) -> Option<EntryState> {
        self.inner().entries.get(&id).map(|entry| entry.state)
    }

    /// Entries in arrival order, oldest first
    pub fn history(&self) -> Vec<RequestLogEntry> {
        let inner = self.inner();
        inner
            .history
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.inner().pending.len()
    }

    /// Forget all history and pending requests
    pub fn clear(&self) {
        let mut inner = self.inner();
        *inner = Inner::default();
    }
}
