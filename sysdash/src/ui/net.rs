//! Network sparklines and the connection table.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Cell, Paragraph, Row, Sparkline, Table},
};

use sysdash::rate::per_second;
use sysdash::threshold::network_utilization;
use sysdash::views::network::{ConnectionKey, NetworkDetailView};
use sysdash::views::{NetworkView, SortDirection};

use crate::ui::theme::{ACCENT, MUTED};
use crate::ui::util::{human_kb, provenance_tag, spark_data, truncate_middle};

pub fn draw_net_spark(f: &mut ratatui::Frame<'_>, area: Rect, title: &str, hist: &[f64], color: Color) {
    let data = spark_data(hist.iter().copied(), area.width.saturating_sub(2) as usize);
    let spark = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .data(&data)
        .style(Style::default().fg(color));
    f.render_widget(spark, area);
}

/// `interval_ms` is the configured update interval, used for the per-second figures.
pub fn draw_net(f: &mut ratatui::Frame<'_>, area: Rect, view: &NetworkView, interval_ms: u64) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let sent: Vec<f64> = view.series_values("sent").into_iter().flatten().collect();
    let received: Vec<f64> = view.series_values("received").into_iter().flatten().collect();
    let conns = view
        .series_values("connections")
        .last()
        .copied()
        .flatten()
        .unwrap_or(0.0);
    let overloaded = view.status().overloaded;
    let last_sent = sent.last().copied().unwrap_or(0.0);
    let last_received = received.last().copied().unwrap_or(0.0);
    let load = match view.threshold() {
        Some(t) => format!(
            " | {:.0}% of limit",
            network_utilization(last_sent.max(last_received), t)
        ),
        None => String::new(),
    };
    draw_net_spark(
        f,
        rows[0],
        &format!(
            "Sent / interval: {} ({}/s) | connections: {conns:.0}{load}",
            human_kb(last_sent),
            human_kb(per_second(last_sent, interval_ms))
        ),
        &sent,
        if overloaded { Color::Red } else { Color::Blue },
    );
    draw_net_spark(
        f,
        rows[1],
        &format!(
            "Received / interval: {} ({}/s)",
            human_kb(last_received),
            human_kb(per_second(last_received, interval_ms))
        ),
        &received,
        if overloaded { Color::Red } else { Color::Green },
    );
}

const COLS: [(ConnectionKey, &str, Constraint); 7] = [
    (ConnectionKey::Protocol, "Proto", Constraint::Length(6)),
    (ConnectionKey::LocalAddress, "Local", Constraint::Percentage(22)),
    (ConnectionKey::LocalPort, "LPort", Constraint::Length(6)),
    (ConnectionKey::RemoteAddress, "Remote", Constraint::Percentage(22)),
    (ConnectionKey::RemotePort, "RPort", Constraint::Length(6)),
    (ConnectionKey::Status, "Status", Constraint::Length(12)),
    (ConnectionKey::Process, "Process", Constraint::Min(8)),
];

pub fn draw_network_detail(f: &mut ratatui::Frame<'_>, area: Rect, view: &NetworkDetailView, scroll: usize) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Length(2), Constraint::Min(4)])
        .split(area);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);

    let sent: Vec<f64> = view.history().to_series().map(|p| p.sent).collect();
    let received: Vec<f64> = view.history().to_series().map(|p| p.received).collect();
    draw_net_spark(f, top[0], "Sent / interval", &sent, Color::Blue);
    draw_net_spark(f, top[1], "Received / interval", &received, Color::Green);

    let dist = view
        .protocol_distribution()
        .iter()
        .map(|(p, n)| format!("{p}: {n}"))
        .collect::<Vec<_>>()
        .join("  ");
    let mut info = vec![Line::from(format!("protocols  {dist}"))];
    if !view.privileged() {
        info.push(Line::styled(
            "agent lacks privilege to list all connections",
            Style::default().fg(Color::Yellow),
        ));
    }
    f.render_widget(Paragraph::new(info), rows[1]);

    let visible = view.visible_connections();
    let total = view.connections().len();
    let title = format!(
        "Connections ({} of {}){}",
        visible.len(),
        total,
        provenance_tag(view.connections_source())
    );
    let viewport = rows[2].height.saturating_sub(3) as usize;
    let offset = scroll.min(visible.len().saturating_sub(viewport));

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

    let body = visible.iter().skip(offset).take(viewport).map(|c| {
        let style = if c.is_error_row() {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(c.protocol.clone()),
            Cell::from(truncate_middle(&c.local_address, 24)),
            Cell::from(c.local_port.to_string()),
            Cell::from(truncate_middle(&c.remote_address, 24)),
            Cell::from(c.remote_port.to_string()),
            Cell::from(c.status.clone()),
            Cell::from(format!("{} ({})", c.process_name, c.owning_pid))
                .style(Style::default().fg(MUTED)),
        ])
        .style(style)
    });

    let widths: Vec<Constraint> = COLS.iter().map(|(_, _, w)| *w).collect();
    let table = Table::new(body, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, rows[2]);
}
