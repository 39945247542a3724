//! TUI module for the live request dashboard.
//!
//! Runs in-process next to the server, reading the tracker and stats
//! directly and driving the fault and passthrough switches.

mod app;
mod ui;

pub use app::{run_dashboard, App, DashboardConfig};
