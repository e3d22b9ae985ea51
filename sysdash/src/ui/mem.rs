//! Memory gauge and detailed breakdown.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Gauge, Sparkline},
};

use sysdash::views::{MemoryDetailView, MemoryView, Provenance};

use crate::ui::swap::draw_swap;
use crate::ui::util::{human_mb, provenance_tag, spark_data};

pub fn draw_mem(f: &mut ratatui::Frame<'_>, area: Rect, view: &MemoryView) {
    let pct = view
        .series_values("used")
        .last()
        .copied()
        .flatten()
        .unwrap_or(0.0);
    let color = if view.status().overloaded { Color::Red } else { Color::Magenta };
    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Memory"))
        .gauge_style(Style::default().fg(color))
        .percent(pct.clamp(0.0, 100.0).round() as u16)
        .label(format!("{pct:.1}% used"));
    f.render_widget(g, area);
}

fn slice_gauge(f: &mut ratatui::Frame<'_>, area: Rect, title: &str, mb: f64, total: f64, color: Color) {
    let ratio = if total > 0.0 { (mb / total).clamp(0.0, 1.0) } else { 0.0 };
    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .gauge_style(Style::default().fg(color))
        .ratio(ratio)
        .label(format!("{} ({:.1}%)", human_mb(mb), ratio * 100.0));
    f.render_widget(g, area);
}

pub fn draw_memory_detail(f: &mut ratatui::Frame<'_>, area: Rect, view: &MemoryDetailView) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // percent history
            Constraint::Length(3), // used (real)
            Constraint::Length(3), // buffers
            Constraint::Length(3), // cached
            Constraint::Length(3), // available
            Constraint::Length(3), // swap
        ])
        .split(area);

    let latest = view.latest();
    let provenance = latest.map(|p| p.provenance).unwrap_or(Provenance::Coarse);
    let title = match latest {
        Some(p) => format!("Memory {:.1}%{}", p.percent, provenance_tag(provenance)),
        None => "Memory".into(),
    };
    let data = spark_data(
        view.history().to_series().map(|p| p.percent),
        rows[0].width.saturating_sub(2) as usize,
    );
    let color = if view.status().overloaded { Color::Red } else { Color::Magenta };
    f.render_widget(
        Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .data(&data)
            .max(100)
            .style(Style::default().fg(color)),
        rows[0],
    );

    let detail = latest.and_then(|p| p.detail.as_ref());
    let (Some(b), Some(d)) = (view.breakdown(), detail) else {
        f.render_widget(
            Block::default()
                .borders(Borders::ALL)
                .title("Breakdown not reported (start with --synthetic to estimate)"),
            rows[1],
        );
        return;
    };
    slice_gauge(f, rows[1], "Used (excl. buffers/cache)", b.used_real, d.total, Color::Red);
    slice_gauge(f, rows[2], "Buffers", b.buffers, d.total, Color::Blue);
    slice_gauge(f, rows[3], "Cached", b.cached, d.total, Color::Yellow);
    slice_gauge(f, rows[4], "Available", b.available, d.total, Color::Green);
    draw_swap(f, rows[5], d);
}
