//! Statistics module for tracking server-wide counters.
//!
//! Counters are lock-free atomics; the two rolling windows (request
//! timestamps for requests-per-minute and recent latencies for the average
//! response time) sit behind short mutexes that are never held across an
//! `.await`.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Relaxed ordering for stats - we don't need strict ordering guarantees
const ORDERING: Ordering = Ordering::Relaxed;

/// Width of the requests-per-minute window
const RPM_WINDOW: Duration = Duration::from_secs(60);

/// Number of latency samples kept for the average
pub const LATENCY_SAMPLES: usize = 100;

/// Request categories with their own counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatCategory {
    Completions,
    ChatCompletions,
    Embeddings,
    Models,
    Errors,
}

/// Bounded window of recent latencies with a running sum
#[derive(Debug, Default)]
struct LatencyWindow {
    samples: VecDeque<Duration>,
    sum: Duration,
}

impl LatencyWindow {
    fn push(&mut self, latency: Duration) {
        self.samples.push_back(latency);
        self.sum += latency;
        if self.samples.len() > LATENCY_SAMPLES {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
    }

    fn average_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum.as_secs_f64() * 1000.0 / self.samples.len() as f64
    }
}

/// Global statistics for the llm-doctor server.
#[derive(Debug)]
pub struct Stats {
    start_time: RwLock<Instant>,

    /// Total number of requests received (every route)
    pub total_requests: AtomicU64,
    pub completions: AtomicU64,
    pub chat_completions: AtomicU64,
    pub embeddings: AtomicU64,
    pub models: AtomicU64,
    /// Error responses: simulated faults, rejected bodies and internal errors
    pub errors: AtomicU64,

    pub prompt_tokens: AtomicU64,
    pub completion_tokens: AtomicU64,

    request_times: Mutex<VecDeque<Instant>>,
    latencies: Mutex<LatencyWindow>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(Instant::now()),
            total_requests: AtomicU64::new(0),
            completions: AtomicU64::new(0),
            chat_completions: AtomicU64::new(0),
            embeddings: AtomicU64::new(0),
            models: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            request_times: Mutex::new(VecDeque::new()),
            latencies: Mutex::new(LatencyWindow::default()),
        }
    }

    fn counter(&self, category: StatCategory) -> &AtomicU64 {
        match category {
            StatCategory::Completions => &self.completions,
            StatCategory::ChatCompletions => &self.chat_completions,
            StatCategory::Embeddings => &self.embeddings,
            StatCategory::Models => &self.models,
            StatCategory::Errors => &self.errors,
        }
    }

    /// Count an arriving request and slide the per-minute window
    pub fn record_request(&self) {
        self.record_request_at(Instant::now());
    }

    pub(crate) fn record_request_at(&self, at: Instant) {
        self.total_requests.fetch_add(1, ORDERING);
        if let Ok(mut times) = self.request_times.lock() {
            times.push_back(at);
            prune_window(&mut times, at);
        }
    }

    pub fn increment(&self, category: StatCategory) {
        self.counter(category).fetch_add(1, ORDERING);
    }

    pub fn record_error(&self) {
        self.increment(StatCategory::Errors);
    }

    pub fn add_tokens(&self, prompt_tokens: u32, completion_tokens: u32) {
        self.prompt_tokens.fetch_add(prompt_tokens as u64, ORDERING);
        self.completion_tokens
            .fetch_add(completion_tokens as u64, ORDERING);
    }

    pub fn record_latency(&self, latency: Duration) {
        if let Ok(mut window) = self.latencies.lock() {
            window.push(latency);
        }
    }

    /// Requests seen during the last 60 seconds
    pub fn requests_per_minute(&self) -> u64 {
        self.requests_per_minute_at(Instant::now())
    }

    pub(crate) fn requests_per_minute_at(&self, now: Instant) -> u64 {
        match self.request_times.lock() {
            Ok(mut times) => {
                prune_window(&mut times, now);
                times.len() as u64
            }
            Err(_) => 0,
        }
    }

    /// Average over the most recent latency samples, in milliseconds
    pub fn avg_response_time_ms(&self) -> f64 {
        self.latencies
            .lock()
            .map(|w| w.average_ms())
            .unwrap_or(0.0)
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.load(ORDERING) + self.completion_tokens.load(ORDERING)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time
            .read()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    /// Zero every counter and window and restart the uptime clock
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.completions,
            &self.chat_completions,
            &self.embeddings,
            &self.models,
            &self.errors,
            &self.prompt_tokens,
            &self.completion_tokens,
        ] {
            counter.store(0, ORDERING);
        }
        if let Ok(mut times) = self.request_times.lock() {
            times.clear();
        }
        if let Ok(mut window) = self.latencies.lock() {
            *window = LatencyWindow::default();
        }
        if let Ok(mut start) = self.start_time.write() {
            *start = Instant::now();
        }
    }

    /// Get a snapshot of all stats for serialization
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            total_requests: self.total_requests.load(ORDERING),
            completions: self.completions.load(ORDERING),
            chat_completions: self.chat_completions.load(ORDERING),
            embeddings: self.embeddings.load(ORDERING),
            models: self.models.load(ORDERING),
            errors: self.errors.load(ORDERING),
            prompt_tokens: self.prompt_tokens.load(ORDERING),
            completion_tokens: self.completion_tokens.load(ORDERING),
            total_tokens: self.total_tokens(),
            requests_per_minute: self.requests_per_minute(),
            avg_response_time_ms: self.avg_response_time_ms(),
        }
    }
}

/// Drop timestamps that fell out of the window; the deque is in arrival order
fn prune_window(times: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = times.front() {
        if now.saturating_duration_since(*front) >= RPM_WINDOW {
            times.pop_front();
        } else {
            break;
        }
    }
}

/// A serializable snapshot of statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub completions: u64,
    pub chat_completions: u64,
    pub embeddings: u64,
    pub models: u64,
    pub errors: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub requests_per_minute: u64,
    pub avg_response_time_ms: f64,
}

/// Shared stats handle for use across threads
pub type SharedStats = Arc<Stats>;

/// Create a new shared stats instance
pub fn new_shared_stats() -> SharedStats {
    Arc::new(Stats::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = Stats::new();

        stats.record_request();
        stats.increment(StatCategory::ChatCompletions);
        stats.add_tokens(50, 100);

        assert_eq!(stats.total_requests.load(ORDERING), 1);
        assert_eq!(stats.chat_completions.load(ORDERING), 1);
        assert_eq!(stats.prompt_tokens.load(ORDERING), 50);
        assert_eq!(stats.completion_tokens.load(ORDERING), 100);
        assert_eq!(stats.total_tokens(), 150);
    }

    #[test]
    fn test_categories_are_independent() {
        let stats = Stats::new();
        stats.increment(StatCategory::Completions);
        stats.increment(StatCategory::Completions);
        stats.increment(StatCategory::Embeddings);
        stats.increment(StatCategory::Models);
        stats.record_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.completions, 2);
        assert_eq!(snapshot.chat_completions, 0);
        assert_eq!(snapshot.embeddings, 1);
        assert_eq!(snapshot.models, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.total_requests, 0);
    }

    #[test]
    fn test_requests_per_minute_window() {
        let stats = Stats::new();
        let t0 = Instant::now();

        stats.record_request_at(t0);
        stats.record_request_at(t0 + Duration::from_secs(30));
        assert_eq!(stats.requests_per_minute_at(t0 + Duration::from_secs(31)), 2);

        // the first request ages out, the second is still inside
        assert_eq!(stats.requests_per_minute_at(t0 + Duration::from_secs(61)), 1);
        assert_eq!(stats.requests_per_minute_at(t0 + Duration::from_secs(91)), 0);
        assert_eq!(stats.total_requests.load(ORDERING), 2);
    }

    #[test]
    fn test_average_latency() {
        let stats = Stats::new();
        assert_eq!(stats.avg_response_time_ms(), 0.0);

        stats.record_latency(Duration::from_millis(100));
        stats.record_latency(Duration::from_millis(200));
        assert!((stats.avg_response_time_ms() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_window_keeps_last_samples() {
        let stats = Stats::new();
        for _ in 0..LATENCY_SAMPLES {
            stats.record_latency(Duration::from_millis(1000));
        }
        for _ in 0..LATENCY_SAMPLES {
            stats.record_latency(Duration::from_millis(10));
        }
        assert!((stats.avg_response_time_ms() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let stats = Stats::new();
        stats.record_request();
        stats.increment(StatCategory::Models);
        stats.add_tokens(1, 2);
        stats.record_latency(Duration::from_millis(5));

        stats.reset();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.models, 0);
        assert_eq!(snapshot.total_tokens, 0);
        assert_eq!(snapshot.requests_per_minute, 0);
        assert_eq!(snapshot.avg_response_time_ms, 0.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = Stats::new();
        stats.increment(StatCategory::ChatCompletions);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["chat_completions"], 1);
        assert!(json.get("requests_per_minute").is_some());
    }
}
