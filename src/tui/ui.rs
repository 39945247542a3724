//! TUI rendering logic using Ratatui.

use super::app::App;
use crate::tracker::{EntryState, RequestLogEntry};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Sparkline, Table, TableState, Wrap},
    Frame,
};

/// Main draw function
pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(8), // Stats + sparkline
            Constraint::Min(8),    // History + detail
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_stats_row(f, app, chunks[1]);
    draw_requests_row(f, app, chunks[2]);
    draw_footer(f, app, chunks[3]);

    if let Some(input) = app.key_input.as_deref() {
        draw_key_dialog(f, input);
    }
}

/// Centered popup for typing an upstream API key
fn draw_key_dialog(f: &mut Frame, input: &str) {
    let area = f.area();
    let width = area.width.min(60);
    let popup = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + area.height.saturating_sub(5) / 2,
        width,
        area.height.min(5),
    );

    let typed = "•".repeat(input.chars().count());
    let dialog = Paragraph::new(vec![
        Line::from(vec![
            Span::raw("Key: "),
            Span::styled(typed, Style::default().fg(Color::Yellow)),
        ]),
        Line::from(Span::styled(
            "Enter to save, Esc to cancel, empty to clear",
            Style::default().fg(Color::Gray),
        )),
    ])
    .block(
        Block::default()
            .title(" Upstream API key ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(Clear, popup);
    f.render_widget(dialog, popup);
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let passthrough = state.passthrough.status();
    let errors = state.errors.status();

    let passthrough_span = if passthrough.enabled {
        Span::styled(
            format!("● PASSTHROUGH {}", passthrough.base_url),
            Style::default().fg(Color::Green).bold(),
        )
    } else {
        Span::styled("○ FAKE RESPONSES", Style::default().fg(Color::Gray))
    };

    let fault_span = if errors.active {
        Span::styled(
            format!("⚠ {}", errors.kind.label()),
            Style::default().fg(Color::Red).bold(),
        )
    } else {
        Span::styled("no faults", Style::default().fg(Color::Gray))
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled("  LLM Doctor  ", Style::default().fg(Color::Cyan).bold()),
        Span::raw(" │ Uptime: "),
        Span::styled(
            format_uptime(app.stats.uptime_secs),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(" │ "),
        passthrough_span,
        Span::raw(" │ "),
        fault_span,
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn draw_stats_row(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(30),
            Constraint::Percentage(35),
        ])
        .split(area);

    draw_request_stats(f, app, chunks[0]);
    draw_token_stats(f, app, chunks[1]);
    draw_sparkline(f, app, chunks[2]);
}

fn draw_request_stats(f: &mut Frame, app: &App, area: Rect) {
    let stats = &app.stats;

    let error_style = if stats.errors > 0 {
        Style::default().fg(Color::Red).bold()
    } else {
        Style::default().fg(Color::Gray)
    };

    let rows = vec![
        Row::new(vec![
            Span::raw("Total Requests"),
            Span::styled(
                format_number(stats.total_requests),
                Style::default().fg(Color::Green).bold(),
            ),
        ]),
        Row::new(vec![
            Span::raw("Chat / Completions"),
            Span::styled(
                format!(
                    "{} / {}",
                    format_number(stats.chat_completions),
                    format_number(stats.completions)
                ),
                Style::default().fg(Color::Cyan),
            ),
        ]),
        Row::new(vec![
            Span::raw("Embeddings"),
            Span::styled(
                format_number(stats.embeddings),
                Style::default().fg(Color::Magenta),
            ),
        ]),
        Row::new(vec![
            Span::raw("Errors"),
            Span::styled(format_number(stats.errors), error_style),
        ]),
        Row::new(vec![
            Span::raw("Avg Response"),
            Span::styled(
                format!("{:.1} ms", stats.avg_response_time_ms),
                Style::default().fg(Color::Yellow),
            ),
        ]),
        Row::new(vec![
            Span::raw("Pending"),
            Span::raw(app.state().tracker.pending_count().to_string()),
        ]),
    ];

    let table = Table::new(
        rows,
        [Constraint::Percentage(60), Constraint::Percentage(40)],
    )
    .block(
        Block::default()
            .title(" Requests ")
            .title_style(Style::default().fg(Color::Green).bold())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    f.render_widget(table, area);
}

fn draw_token_stats(f: &mut Frame, app: &App, area: Rect) {
    let stats = &app.stats;

    let rows = vec![
        Row::new(vec![
            Span::raw("Prompt"),
            Span::styled(
                format_number(stats.prompt_tokens),
                Style::default().fg(Color::Blue),
            ),
        ]),
        Row::new(vec![
            Span::raw("Completion"),
            Span::styled(
                format_number(stats.completion_tokens),
                Style::default().fg(Color::Magenta),
            ),
        ]),
        Row::new(vec![
            Span::raw("Total"),
            Span::styled(
                format_number(stats.total_tokens),
                Style::default().fg(Color::Cyan).bold(),
            ),
        ]),
    ];

    let table = Table::new(
        rows,
        [Constraint::Percentage(55), Constraint::Percentage(45)],
    )
    .block(
        Block::default()
            .title(" Tokens ")
            .title_style(Style::default().fg(Color::Cyan).bold())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(table, area);
}

fn draw_sparkline(f: &mut Frame, app: &App, area: Rect) {
    let max_rpm = app.rpm_history.iter().copied().max().unwrap_or(0);

    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .title(format!(
                    " Req/min (current: {}, max: {}) ",
                    app.stats.requests_per_minute, max_rpm
                ))
                .title_style(Style::default().fg(Color::Green))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        )
        .data(&app.rpm_history)
        .style(Style::default().fg(Color::Green));

    f.render_widget(sparkline, area);
}

fn draw_requests_row(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    draw_history(f, app, chunks[0]);
    draw_detail(f, app, chunks[1]);
}

fn draw_history(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = app
        .history
        .iter()
        .map(|entry| {
            Row::new(vec![
                Span::raw(entry.timestamp.format("%H:%M:%S").to_string()),
                Span::raw(entry.method.clone()),
                Span::raw(entry.endpoint.clone()),
                state_span(entry),
                Span::raw(format!("{} ms", entry.elapsed().as_millis())),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Min(16),
            Constraint::Length(10),
            Constraint::Length(9),
        ],
    )
    .header(
        Row::new(vec!["Time", "Method", "Endpoint", "State", "Elapsed"])
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray))
    .block(
        Block::default()
            .title(format!(" History ({}) ", app.history.len()))
            .title_style(Style::default().fg(Color::Magenta).bold())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    let mut table_state = TableState::default();
    if !app.history.is_empty() {
        table_state.select(Some(app.selected));
    }
    f.render_stateful_widget(table, area, &mut table_state);
}

fn draw_detail(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Detail ")
        .title_style(Style::default().fg(Color::Yellow).bold())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let Some(entry) = app.selected_entry() else {
        let empty = Paragraph::new("No requests yet")
            .style(Style::default().fg(Color::Gray))
            .block(block);
        f.render_widget(empty, area);
        return;
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Endpoint: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} {}", entry.method, entry.endpoint)),
        ]),
        Line::from(vec![
            Span::styled("State:    ", Style::default().fg(Color::Gray)),
            state_span(entry),
        ]),
        Line::from(vec![
            Span::styled("Elapsed:  ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} ms", entry.elapsed().as_millis())),
        ]),
        Line::from(vec![
            Span::styled("Tokens:   ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{} in / {} out / {} total",
                entry.tokens_in,
                entry.tokens_out,
                entry.total_tokens()
            )),
        ]),
    ];
    if let Some(response) = entry.response.as_ref() {
        lines.push(Line::from(vec![
            Span::styled("Status:   ", Style::default().fg(Color::Gray)),
            Span::raw(response.status.to_string()),
            Span::raw(
                response
                    .model
                    .as_deref()
                    .map(|m| format!("  ({})", m))
                    .unwrap_or_default(),
            ),
        ]));
    }
    lines.push(Line::raw(""));
    lines.push(Line::raw(entry.display_content().to_string()));

    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(block);
    f.render_widget(detail, area);
}

fn state_span(entry: &RequestLogEntry) -> Span<'static> {
    match entry.state {
        EntryState::Pending => Span::styled("pending", Style::default().fg(Color::Yellow)),
        EntryState::Streaming => Span::styled("streaming", Style::default().fg(Color::Blue)),
        EntryState::Completed => {
            let failed = entry.response.as_ref().is_some_and(|r| r.status >= 400);
            if failed {
                Span::styled("failed", Style::default().fg(Color::Red))
            } else {
                Span::styled("done", Style::default().fg(Color::Green))
            }
        }
        EntryState::Aborted => Span::styled("aborted", Style::default().fg(Color::Magenta)),
    }
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Black).bg(Color::White));
    let mut spans = vec![
        key(" q "),
        Span::raw(" Quit  "),
        key(" m "),
        Span::raw(" Fault  "),
        key(" e "),
        Span::raw(" Toggle  "),
        key(" x "),
        Span::raw(" Off  "),
        key(" p "),
        Span::raw(" Passthrough  "),
        key(" j/k "),
        Span::raw(" Move  "),
        key(" c "),
        Span::raw(" Clear  "),
        key(" a "),
        Span::raw(" API key  "),
    ];
    if let Some(message) = app.message.as_ref() {
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::Gray));
    f.render_widget(footer, area);
}

/// Format uptime in human-readable format
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format large numbers with K/M/B suffixes
fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{AppState, Config};
    use crate::stats::new_shared_stats;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(90061), "1d 1h 1m 1s");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_500), "1.50K");
        assert_eq!(format_number(2_000_000), "2.00M");
    }

    #[test]
    fn test_draw_with_history() {
        let state = Arc::new(AppState::new(Config::default(), new_shared_stats()));
        state.tracker.begin(
            "/v1/chat/completions",
            "POST",
            serde_json::Value::Null,
            Default::default(),
        );
        let app = App::new(state);

        let mut terminal = Terminal::new(TestBackend::new(140, 40)).unwrap();
        terminal.draw(|f| draw(f, &app)).unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("LLM Doctor"));
        assert!(text.contains("/v1/chat/completions"));
    }
}
