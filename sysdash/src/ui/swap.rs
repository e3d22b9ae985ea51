//! Swap gauge.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Gauge},
};

use sysdash::types::MemoryDetail;

use crate::ui::util::human_mb;

pub fn draw_swap(f: &mut ratatui::Frame<'_>, area: Rect, d: &MemoryDetail) {
    let pct = d.swap_percent.clamp(0.0, 100.0).round() as u16;
    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Swap"))
        .gauge_style(Style::default().fg(Color::Yellow))
        .percent(pct)
        .label(format!("{} / {}", human_mb(d.swap_used), human_mb(d.swap_total)));
    f.render_widget(g, area);
}
