// Application State Module
// Service objects built once at startup and shared by handlers and the dashboard.

use super::config::Config;
use crate::dispatch::Dispatcher;
use crate::errors::ErrorSimulator;
use crate::passthrough::Passthrough;
use crate::stats::SharedStats;
use crate::tracker::RequestTracker;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub stats: SharedStats,
    pub tracker: Arc<RequestTracker>,
    pub errors: Arc<ErrorSimulator>,
    pub passthrough: Arc<Passthrough>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: Config, stats: SharedStats) -> Self {
        let tracker = Arc::new(RequestTracker::new(config.history.capacity, stats.clone()));
        let errors = Arc::new(ErrorSimulator::new());
        let passthrough = Arc::new(Passthrough::new(config.passthrough_config()));
        let dispatcher = Dispatcher::new(
            errors.clone(),
            passthrough.clone(),
            config.generator(),
            config.stream_delay(),
        );
        Self {
            config,
            stats,
            tracker,
            errors,
            passthrough,
            dispatcher,
        }
    }
}
