//! CPU usage sparkline, per-core mini bars and load average.

use ratatui::style::Modifier;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline},
};

use sysdash::views::{CpuDetailView, CpuView, Severity};

use crate::ui::util::{provenance_tag, severity_color, spark_data};

pub fn draw_cpu_avg_graph(f: &mut ratatui::Frame<'_>, area: Rect, view: &CpuView) {
    let usage = view.series_values("usage");
    let now = usage.last().copied().flatten();
    let mut title = match now {
        Some(u) => format!("CPU (now: {u:>5.1}%)"),
        None => "CPU".into(),
    };
    if let Some(t) = view.threshold() {
        title.push_str(&format!(" limit {t:.0}%"));
    }
    let color = if view.status().overloaded {
        Color::Red
    } else {
        now.map(|u| severity_color(Severity::for_usage(u)))
            .unwrap_or(Color::Cyan)
    };
    let data = spark_data(
        usage.into_iter().flatten(),
        area.width.saturating_sub(2) as usize,
    );
    let spark = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .data(&data)
        .max(100)
        .style(Style::default().fg(color));
    f.render_widget(spark, area);
}

pub fn draw_cpu_detail(f: &mut ratatui::Frame<'_>, area: Rect, view: &CpuDetailView) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(4)])
        .split(cols[0]);

    let latest = view.latest();
    let title = match latest {
        Some(p) => {
            let temp = p
                .temperature
                .map(|t| format!("{t:.1}°C"))
                .unwrap_or_else(|| "N/A".into());
            let freq = p
                .frequency
                .map(|g| format!("{g:.2} GHz"))
                .unwrap_or_else(|| "N/A".into());
            format!("CPU usage {:.1}% | temp {temp} | freq {freq}", p.usage)
        }
        None => "CPU usage".into(),
    };
    let color = view
        .usage_severity()
        .map(severity_color)
        .unwrap_or(Color::Cyan);
    let data = spark_data(
        view.history().to_series().map(|p| p.usage),
        left[0].width.saturating_sub(2) as usize,
    );
    f.render_widget(
        Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .data(&data)
            .max(100)
            .style(Style::default().fg(color)),
        left[0],
    );

    let load = match view.load_avg() {
        Some((l, src)) => format!(
            "1m {:.2}  5m {:.2}  15m {:.2}{}",
            l[0],
            l[1],
            l[2],
            provenance_tag(src)
        ),
        None => "not reported".into(),
    };
    let temp_line = match view.temperature_severity() {
        Some(s) => Line::from(Span::styled(
            format!("temperature band: {s:?}"),
            Style::default().fg(severity_color(s)),
        )),
        None => Line::from("temperature: N/A"),
    };
    f.render_widget(
        Paragraph::new(vec![Line::from(load), temp_line])
            .block(Block::default().borders(Borders::ALL).title("Load average")),
        left[1],
    );

    draw_per_core_bars(f, cols[1], view);
}

pub fn draw_per_core_bars(f: &mut ratatui::Frame<'_>, area: Rect, view: &CpuDetailView) {
    let title = format!("Per-core{}", provenance_tag(view.per_core_source()));
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

    let cores = &view.per_core().cores;
    let show_n = (inner.height as usize).min(cores.len());
    let constraints: Vec<Constraint> = (0..show_n).map(|_| Constraint::Length(1)).collect();
    let vchunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    for (i, buf) in cores.iter().take(show_n).enumerate() {
        let hchunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(6), Constraint::Length(12)])
            .split(vchunks[i]);

        let curr = buf.latest().copied().unwrap_or(0.0);
        let older = buf.to_series().rev().nth(20).copied().unwrap_or(curr);
        let trend = if curr > older + 0.2 {
            "↑"
        } else if curr + 0.2 < older {
            "↓"
        } else {
            "╌"
        };
        let fg = severity_color(Severity::for_usage(curr));

        let hist = spark_data(buf.to_series().copied(), hchunks[0].width as usize);
        f.render_widget(
            Sparkline::default()
                .data(&hist)
                .max(100)
                .style(Style::default().fg(fg)),
            hchunks[0],
        );

        let label = format!("cpu{i:<2}{trend}{curr:>5.1}%");
        let line = Line::from(Span::styled(
            label,
            Style::default().fg(fg).add_modifier(Modifier::BOLD),
        ));
        f.render_widget(Paragraph::new(line).right_aligned(), hchunks[1]);
    }
}
