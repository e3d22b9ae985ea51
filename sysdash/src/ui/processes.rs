//! Process table with per-cell coloring, sorting, search line and a scrollbar.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::style::Modifier;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};

use sysdash::views::process::{ProcessKey, ProcessView};
use sysdash::views::SortDirection;

use crate::ui::theme::{ACCENT, MUTED, SB_ARROW, SB_THUMB, SB_TRACK};
use crate::ui::util::human_mb;

// Keep the header widths here so drawing and sort hints match.
const COLS: [(ProcessKey, &str, Constraint); 5] = [
    (ProcessKey::Pid, "PID", Constraint::Length(8)),
    (ProcessKey::Name, "Name", Constraint::Percentage(40)),
    (ProcessKey::Cpu, "CPU %", Constraint::Length(9)),
    (ProcessKey::Memory, "Mem", Constraint::Length(11)),
    (ProcessKey::Status, "Status", Constraint::Length(12)),
];

pub fn draw_processes(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    view: &ProcessView,
    scroll_offset: usize,
    searching: bool,
) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);
    draw_table(f, cols[0], view, scroll_offset, searching);
    draw_summary(f, cols[1], view);
}

fn draw_table(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    view: &ProcessView,
    scroll_offset: usize,
    searching: bool,
) {
    let rows = view.visible();
    let total = view.processes().len();
    let mut title = format!("Processes ({} of {total})", rows.len());
    if searching || !view.search.is_empty() {
        title.push_str(&format!("  search: {}{}", view.search, if searching { "_" } else { "" }));
    }
    let block = Block::default().borders(Borders::ALL).title(title);
    f.render_widget(block, area);

    let inner = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    };
    if inner.height < 1 || inner.width < 3 {
        return;
    }
    // reserve 2 columns for the scrollbar
    let content = Rect {
        width: inner.width.saturating_sub(2),
        ..inner
    };

    let total_rows = rows.len();
    let viewport_rows = content.height.saturating_sub(1) as usize;
    let max_off = total_rows.saturating_sub(viewport_rows);
    let offset = scroll_offset.min(max_off);

    let peak_cpu = rows.iter().map(|p| p.cpu_percent).fold(0.0_f64, f64::max);
    let body = rows.iter().skip(offset).take(viewport_rows).map(|p| {
        let cpu_fg = match p.cpu_percent {
            x if x < 25.0 => Color::Green,
            x if x < 60.0 => Color::Yellow,
            _ => Color::Red,
        };
        let emphasis = if p.cpu_percent > 0.0 && (p.cpu_percent - peak_cpu).abs() < f64::EPSILON {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(p.pid.to_string()).style(Style::default().fg(MUTED)),
            Cell::from(p.name.clone()),
            Cell::from(format!("{:>6.1}", p.cpu_percent)).style(Style::default().fg(cpu_fg)),
            Cell::from(human_mb(p.memory_mb)),
            Cell::from(p.status.to_string()),
        ])
        .style(emphasis)
    });

    let header = Row::new(COLS.iter().map(|(key, name, _)| {
        let mark = if *key == view.sort.key {
            match view.sort.direction {
                SortDirection::Ascending => " ▲",
                SortDirection::Descending => " ▼",
            }
        } else {
            ""
        };
        Cell::from(format!("{name}{mark}"))
    }))
    .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));

    let widths: Vec<Constraint> = COLS.iter().map(|(_, _, w)| *w).collect();
    f.render_widget(
        Table::new(body, widths).header(header).column_spacing(1),
        content,
    );

    let scroll_area = Rect {
        x: inner.x + inner.width.saturating_sub(1),
        y: inner.y,
        width: 1,
        height: inner.height,
    };
    draw_scrollbar(f, scroll_area, total_rows, viewport_rows, offset);
}

fn draw_scrollbar(f: &mut ratatui::Frame<'_>, area: Rect, total_rows: usize, viewport: usize, offset: usize) {
    if area.height < 3 {
        return;
    }
    let track = (area.height - 2) as usize;
    let total = total_rows.max(1);
    let view = viewport.clamp(1, total);
    let max_off = total.saturating_sub(view);

    let thumb_len = (track * view).div_ceil(total).max(1).min(track);
    let thumb_top = if max_off == 0 {
        0
    } else {
        ((track - thumb_len) * offset.min(max_off) + max_off / 2) / max_off
    };

    let mut lines: Vec<Line> = Vec::with_capacity(area.height as usize);
    lines.push(Line::from(Span::styled("▲", Style::default().fg(SB_ARROW))));
    for i in 0..track {
        if i >= thumb_top && i < thumb_top + thumb_len {
            lines.push(Line::from(Span::styled("█", Style::default().fg(SB_THUMB))));
        } else {
            lines.push(Line::from(Span::styled("│", Style::default().fg(SB_TRACK))));
        }
    }
    lines.push(Line::from(Span::styled("▼", Style::default().fg(SB_ARROW))));
    f.render_widget(Paragraph::new(lines), area);
}

fn draw_summary(f: &mut ratatui::Frame<'_>, area: Rect, view: &ProcessView) {
    let mut lines = Vec::new();
    if let Some(p) = view.history().latest() {
        lines.push(Line::from(format!("count {}", p.count)));
        lines.push(Line::from(format!("avg cpu {:.2}%", p.cpu_avg)));
        lines.push(Line::from(format!("avg mem {}", human_mb(p.memory_avg))));
    }
    lines.push(Line::from(""));
    lines.push(Line::styled("by status", Style::default().fg(ACCENT)));
    for (status, n) in view.status_distribution() {
        lines.push(Line::from(format!("  {status:<14}{n}")));
    }
    lines.push(Line::from(""));
    lines.push(Line::styled("top cpu", Style::default().fg(ACCENT)));
    for p in view.top_by_cpu() {
        lines.push(Line::from(format!("  {:<16.16}{:>6.1}%", p.name, p.cpu_percent)));
    }
    lines.push(Line::styled("top memory", Style::default().fg(ACCENT)));
    for p in view.top_by_memory() {
        lines.push(Line::from(format!("  {:<16.16}{:>9}", p.name, human_mb(p.memory_mb))));
    }
    let color = if view.status().overloaded { Color::Red } else { Color::Reset };
    f.render_widget(
        Paragraph::new(lines)
            .style(Style::default().fg(color))
            .block(Block::default().borders(Borders::ALL).title("Summary")),
        area,
    );
}

/// Keyboard scrolling (Up/Down/PageUp/PageDown/Home/End). Returns true if handled.
pub fn scroll_handle_key(scroll_offset: &mut usize, key: KeyEvent, page_size: usize) -> bool {
    let page = page_size.max(1);
    match key.code {
        KeyCode::Up => *scroll_offset = scroll_offset.saturating_sub(1),
        KeyCode::Down => *scroll_offset = scroll_offset.saturating_add(1),
        KeyCode::PageUp => *scroll_offset = scroll_offset.saturating_sub(page),
        KeyCode::PageDown => *scroll_offset = scroll_offset.saturating_add(page),
        KeyCode::Home => *scroll_offset = 0,
        KeyCode::End => *scroll_offset = usize::MAX,
        _ => return false,
    }
    true
}

/// Keep the offset inside `0..=total - viewport`.
pub fn scroll_clamp(scroll_offset: &mut usize, total_rows: usize, viewport: usize) {
    *scroll_offset = (*scroll_offset).min(total_rows.saturating_sub(viewport));
}
