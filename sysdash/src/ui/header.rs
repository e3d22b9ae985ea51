//! Top header: connection state, alert switch and tab bar.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use sysdash::channel::ConnectionState;
use sysdash::threshold::ThresholdConfig;

use crate::ui::theme::{ACCENT, MUTED};

pub const TABS: [&str; 5] = ["Overview", "CPU", "Memory", "Network", "Processes"];

pub struct HeaderInfo<'a> {
    pub user: &'a str,
    pub connection: &'a ConnectionState,
    pub config: ThresholdConfig,
    pub paused: bool,
    pub synthetic: bool,
    pub tab: usize,
}

pub fn draw_header(f: &mut ratatui::Frame<'_>, area: Rect, h: &HeaderInfo<'_>) {
    let (state, state_color) = match h.connection {
        ConnectionState::Waiting => ("waiting for data".to_string(), Color::Yellow),
        ConnectionState::Live => ("live".to_string(), Color::Green),
        ConnectionState::Closed(e) => (format!("not live: {e}"), Color::Red),
    };
    let alerts = if h.config.enabled { "alerts on" } else { "alerts off" };

    let mut spans = vec![
        Span::styled("sysdash", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {} | ", h.user)),
        Span::styled(state, Style::default().fg(state_color)),
        Span::raw(format!(" | {alerts}")),
    ];
    if h.paused {
        spans.push(Span::styled(" | paused", Style::default().fg(Color::Yellow)));
    }
    if h.synthetic {
        spans.push(Span::styled(" | SYNTHETIC", Style::default().fg(Color::Magenta)));
    }
    spans.push(Span::raw("   "));
    for (i, t) in TABS.iter().enumerate() {
        let style = if i == h.tab {
            Style::default().fg(ACCENT).add_modifier(Modifier::REVERSED)
        } else {
            Style::default().fg(MUTED)
        };
        spans.push(Span::styled(format!(" {} {} ", i + 1, t), style));
    }
    spans.push(Span::styled("  (q quit, a alerts, p pause, e export)", Style::default().fg(MUTED)));

    f.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM)),
        area,
    );
}
