//! Small UI helpers: human-readable sizes, truncation, colour bands.

use ratatui::style::Color;

use sysdash::views::{Provenance, Severity};

/// Megabytes to a short human string.
pub fn human_mb(mb: f64) -> String {
    const K: f64 = 1024.0;
    if mb < 1.0 { return format!("{:.0}KB", mb * K); }
    if mb < K { return format!("{mb:.1}MB"); }
    let gb = mb / K;
    if gb < K { return format!("{gb:.1}GB"); }
    format!("{:.2}TB", gb / K)
}

/// Per-interval KB figure.
pub fn human_kb(kb: f64) -> String {
    if kb < 1024.0 { format!("{kb:.1}KB") } else { human_mb(kb / 1024.0) }
}

pub fn truncate_middle(s: &str, max: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max { return s.to_string(); }
    if max <= 3 { return "...".into(); }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    let head: String = chars[..left].iter().collect();
    let tail: String = chars[chars.len() - right..].iter().collect();
    format!("{head}...{tail}")
}

pub fn severity_color(s: Severity) -> Color {
    match s {
        Severity::Normal => Color::Green,
        Severity::Elevated => Color::Yellow,
        Severity::High => Color::LightRed,
        Severity::Critical => Color::Red,
    }
}

/// Suffix for panel titles so fabricated data is never mistaken for real data.
pub fn provenance_tag(p: Provenance) -> &'static str {
    match p {
        Provenance::Reported => "",
        Provenance::Coarse => " (not reported)",
        Provenance::Synthetic => " [SYNTHETIC]",
    }
}

/// 0..=100 float history to sparkline data, keeping the newest `max_points`.
pub fn spark_data<I: IntoIterator<Item = f64>>(values: I, max_points: usize) -> Vec<u64> {
    let all: Vec<u64> = values
        .into_iter()
        .map(|v| v.max(0.0).round() as u64)
        .collect();
    let start = all.len().saturating_sub(max_points);
    all[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_sizes() {
        assert_eq!(human_mb(512.0), "512.0MB");
        assert_eq!(human_mb(2048.0), "2.0GB");
        assert_eq!(human_kb(10.0), "10.0KB");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_middle("abcdefghij", 7), "ab...ij");
        assert_eq!(truncate_middle("ñandú-ñandú", 7), "ña...dú");
        assert_eq!(truncate_middle("short", 10), "short");
    }

    #[test]
    fn spark_keeps_newest() {
        assert_eq!(spark_data([1.0, 2.4, 3.6], 2), vec![2, 4]);
    }
}
