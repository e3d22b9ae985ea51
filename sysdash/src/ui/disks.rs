//! Disk usage gauge with a short history line.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Gauge, Sparkline},
};

use sysdash::views::DiskView;

use crate::ui::util::spark_data;

pub fn draw_disks(f: &mut ratatui::Frame<'_>, area: Rect, view: &DiskView) {
    let used = view.series_values("used");
    let pct = used.last().copied().flatten().unwrap_or(0.0);
    let color = if view.status().overloaded {
        Color::Red
    } else if pct < 70.0 {
        Color::Green
    } else {
        Color::Yellow
    };
    let title = match view.threshold() {
        Some(t) => format!("Disk (alert at {t:.0}%)"),
        None => "Disk".into(),
    };
    f.render_widget(Block::default().borders(Borders::ALL).title(title), area);

    let inner = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    };
    if inner.height == 0 {
        return;
    }
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    f.render_widget(
        Gauge::default()
            .percent(pct.clamp(0.0, 100.0).round() as u16)
            .gauge_style(Style::default().fg(color))
            .label(format!("{pct:.1}% used")),
        parts[0],
    );
    let data = spark_data(used.into_iter().flatten(), parts[1].width as usize);
    f.render_widget(
        Sparkline::default()
            .data(&data)
            .max(100)
            .style(Style::default().fg(color)),
        parts[1],
    );
}
