//! TUI Application logic and event handling.

use super::ui;
use crate::cli::AppState;
use crate::passthrough::config::mask_key;
use crate::stats::StatsSnapshot;
use crate::tracker::RequestLogEntry;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Samples kept for the requests-per-minute sparkline
const SPARKLINE_SAMPLES: usize = 60;

/// Configuration for the dashboard
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Refresh interval in milliseconds
    pub refresh_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { refresh_ms: 200 }
    }
}

/// Application state for the dashboard
pub struct App {
    state: Arc<AppState>,
    /// Current stats snapshot
    pub stats: StatsSnapshot,
    /// Request history, newest first
    pub history: Vec<RequestLogEntry>,
    /// Index into `history`
    pub selected: usize,
    /// Recent requests-per-minute values for the sparkline
    pub rpm_history: Vec<u64>,
    /// Feedback for the last key press
    pub message: Option<String>,
    /// API key being typed while the key dialog is open
    pub key_input: Option<String>,
    /// Whether to exit
    pub should_quit: bool,
}

impl App {
    pub fn new(state: Arc<AppState>) -> Self {
        let stats = state.stats.snapshot();
        let mut app = Self {
            state,
            stats,
            history: Vec::new(),
            selected: 0,
            rpm_history: Vec::with_capacity(SPARKLINE_SAMPLES),
            message: None,
            key_input: None,
            should_quit: false,
        };
        app.refresh();
        app
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Pull fresh stats and history from the running server
    pub fn refresh(&mut self) {
        self.stats = self.state.stats.snapshot();

        self.rpm_history.push(self.stats.requests_per_minute);
        if self.rpm_history.len() > SPARKLINE_SAMPLES {
            self.rpm_history.remove(0);
        }

        self.history = self.state.tracker.history();
        self.history.reverse();
        if self.selected >= self.history.len() {
            self.selected = self.history.len().saturating_sub(1);
        }
    }

    pub fn selected_entry(&self) -> Option<&RequestLogEntry> {
        self.history.get(self.selected)
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        if self.key_input.is_some() {
            self.handle_key_dialog(code);
            return;
        }
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('m') => {
                let next = self.state.errors.current_selection().next();
                self.state.errors.enable(next);
                self.message = Some(format!("Simulating: {}", next.label()));
            }
            KeyCode::Char('e') => {
                let enabled = self.state.errors.toggle();
                self.message = Some(if enabled {
                    "Error simulation on (press m to pick a fault)".to_string()
                } else {
                    "Error simulation off".to_string()
                });
            }
            KeyCode::Char('x') => {
                self.state.errors.disable();
                self.message = Some("Error simulation off".to_string());
            }
            KeyCode::Char('p') => {
                let enabled = self.state.passthrough.toggle();
                self.message = Some(match (enabled, self.state.passthrough.has_api_key()) {
                    (true, _) => "Passthrough on".to_string(),
                    (false, true) => "Passthrough off".to_string(),
                    (false, false) => "Passthrough needs an API key".to_string(),
                });
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected + 1 < self.history.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Char('c') => {
                self.state.tracker.clear();
                self.selected = 0;
                self.message = Some("History cleared".to_string());
            }
            KeyCode::Char('a') => {
                self.key_input = Some(String::new());
                self.message = None;
            }
            _ => {}
        }
        self.refresh();
    }

    /// Keys while the API key dialog is open. Enter installs the key and
    /// turns passthrough on; an empty key clears it.
    fn handle_key_dialog(&mut self, code: KeyCode) {
        let Some(input) = self.key_input.as_mut() else {
            return;
        };
        match code {
            KeyCode::Char(c) => input.push(c),
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Esc => {
                self.key_input = None;
                self.message = Some("API key unchanged".to_string());
            }
            KeyCode::Enter => {
                let key = input.trim().to_string();
                self.key_input = None;
                let passthrough = &self.state.passthrough;
                passthrough.set_api_key(key.clone());
                self.message = Some(if key.is_empty() {
                    "API key cleared, passthrough off".to_string()
                } else if passthrough.enable() {
                    format!("API key {} set, passthrough on", mask_key(&key))
                } else {
                    "API key rejected".to_string()
                });
                tracing::info!(
                    enabled = passthrough.is_enabled(),
                    "API key changed from dashboard"
                );
            }
            _ => {}
        }
    }
}

/// Run the TUI dashboard against in-process server state
pub async fn run_dashboard(state: Arc<AppState>, config: DashboardConfig) -> io::Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(state);
    let tick_rate = Duration::from_millis(config.refresh_ms);
    let mut last_tick = Instant::now();

    let result: io::Result<()> = loop {
        if let Err(e) = terminal.draw(|f| ui::draw(f, &app)) {
            break Err(e);
        }

        // Handle events with timeout
        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        match event::poll(timeout) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    app.handle_key(key.code);
                }
                Ok(_) => {}
                Err(e) => break Err(e),
            },
            Ok(false) => {}
            Err(e) => break Err(e),
        }

        if app.should_quit {
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            app.refresh();
            last_tick = Instant::now();
        }
        tokio::task::yield_now().await;
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Config;
    use crate::errors::ErrorKind;
    use crate::stats::new_shared_stats;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn app() -> App {
        App::new(Arc::new(AppState::new(Config::default(), new_shared_stats())))
    }

    #[test]
    fn test_cycle_fault_kinds() {
        let mut app = app();
        app.handle_key(KeyCode::Char('m'));
        assert_eq!(app.state().errors.current_selection(), ErrorKind::SafetyContentFilter);
        assert!(app.state().errors.is_active());

        app.handle_key(KeyCode::Char('m'));
        assert_eq!(app.state().errors.current_selection(), ErrorKind::RateLimit);

        app.handle_key(KeyCode::Char('x'));
        assert!(!app.state().errors.is_active());
    }

    #[test]
    fn test_passthrough_without_key() {
        let mut app = app();
        app.handle_key(KeyCode::Char('p'));
        assert!(!app.state().passthrough.is_enabled());
        assert_eq!(app.message.as_deref(), Some("Passthrough needs an API key"));
    }

    #[test]
    fn test_history_navigation_and_clear() {
        let mut app = app();
        for path in ["/a", "/b", "/c"] {
            app.state()
                .tracker
                .begin(path, "GET", Value::Null, BTreeMap::new());
        }
        app.refresh();
        assert_eq!(app.selected_entry().unwrap().endpoint, "/c");

        app.handle_key(KeyCode::Char('j'));
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_entry().unwrap().endpoint, "/a");

        app.handle_key(KeyCode::Up);
        assert_eq!(app.selected_entry().unwrap().endpoint, "/b");

        app.handle_key(KeyCode::Char('c'));
        assert!(app.history.is_empty());
        assert!(app.selected_entry().is_none());
    }

    #[test]
    fn test_api_key_dialog_enables_passthrough() {
        let mut app = app();
        app.handle_key(KeyCode::Char('a'));
        assert_eq!(app.key_input.as_deref(), Some(""));

        // keys go to the dialog, not to the dashboard
        for c in "sk-typoq".chars() {
            app.handle_key(KeyCode::Char(c));
        }
        app.handle_key(KeyCode::Backspace);
        app.handle_key(KeyCode::Backspace);
        for c in "ed99".chars() {
            app.handle_key(KeyCode::Char(c));
        }
        assert!(!app.should_quit);
        assert!(!app.state().errors.is_active());

        app.handle_key(KeyCode::Enter);
        assert!(app.key_input.is_none());
        let passthrough = &app.state().passthrough;
        assert!(passthrough.is_enabled());
        assert_eq!(passthrough.config().api_key.as_deref(), Some("sk-typed99"));
        assert_eq!(app.message.as_deref(), Some("API key ****ed99 set, passthrough on"));
    }

    #[test]
    fn test_api_key_dialog_cancel_and_clear() {
        let mut app = app();
        app.handle_key(KeyCode::Char('a'));
        app.handle_key(KeyCode::Char('x'));
        app.handle_key(KeyCode::Esc);
        assert!(app.key_input.is_none());
        assert!(!app.should_quit);
        assert!(!app.state().passthrough.has_api_key());

        app.state().passthrough.set_api_key("sk-old");
        app.state().passthrough.enable();
        app.handle_key(KeyCode::Char('a'));
        app.handle_key(KeyCode::Enter);
        assert!(!app.state().passthrough.has_api_key());
        assert!(!app.state().passthrough.is_enabled());
    }

    #[test]
    fn test_quit_keys() {
        let mut app = app();
        app.handle_key(KeyCode::Esc);
        assert!(app.should_quit);
    }
}
