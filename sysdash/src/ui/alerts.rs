//! Recent alerts list.

use ratatui::{
    layout::Rect,
    style::Style,
    text::Line,
    widgets::{Block, Borders, Paragraph},
};

use sysdash::threshold::AlertEvent;

use crate::ui::theme::{ALERT, MUTED};

pub fn draw_alerts(f: &mut ratatui::Frame<'_>, area: Rect, recent: &[AlertEvent], enabled: bool) {
    let title = if enabled { "Alerts" } else { "Alerts (monitoring off, press 'a')" };
    let block = Block::default().borders(Borders::ALL).title(title);
    let lines: Vec<Line> = if recent.is_empty() {
        vec![Line::styled("no alerts", Style::default().fg(MUTED))]
    } else {
        recent
            .iter()
            .take(area.height.saturating_sub(2) as usize)
            .map(|a| {
                let time = a.at.with_timezone(&chrono::Local).format("%H:%M:%S");
                Line::styled(
                    format!("{time}  {}: {:.1}", a.label, a.value),
                    Style::default().fg(ALERT),
                )
            })
            .collect()
    };
    f.render_widget(Paragraph::new(lines).block(block), area);
}
