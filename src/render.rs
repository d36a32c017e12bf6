//! Plain-text presentation of a validated forecast. Formatting only.

use std::fmt::Write;

use crate::forecast::{FactorTrend, Forecast, TimelineCategory};

const BAR_WIDTH: usize = 40;

fn bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn trend_marker(trend: FactorTrend) -> &'static str {
    match trend {
        FactorTrend::PositiveForUkraine => "▲",
        FactorTrend::NegativeForUkraine => "▼",
        FactorTrend::Neutral => "■",
    }
}

fn timeline_gauge(active: TimelineCategory) -> String {
    TimelineCategory::ALL
        .iter()
        .map(|c| {
            if *c == active {
                format!("[{}]", c.label().to_uppercase())
            } else {
                format!(" {} ", c.label())
            }
        })
        .collect::<Vec<_>>()
        .join(" ── ")
}

pub fn render_forecast(forecast: &Forecast) -> String {
    let mut out = String::new();
    let probs = forecast.outcome_probabilities;

    let _ = writeln!(out, "WAR END TIMELINE");
    let _ = writeln!(out, "  {}", timeline_gauge(forecast.timeline_category));
    let _ = writeln!(out, "  {}", forecast.timeline_justification);
    let _ = writeln!(out);

    let _ = writeln!(out, "OUTCOME PROBABILITIES");
    for (label, value) in [
        ("Ukraine victory", probs.ukraine_win),
        ("Frozen conflict", probs.frozen_conflict),
        ("Russia victory ", probs.russia_win),
    ] {
        let _ = writeln!(out, "  {}  {} {:>3.0}%", label, bar(value, BAR_WIDTH), value);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "KEY FACTORS");
    for factor in &forecast.key_factors {
        let _ = writeln!(
            out,
            "  {} {}: {}",
            trend_marker(factor.trend),
            factor.title,
            factor.impact
        );
    }

    if !forecast.sources.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "SOURCES");
        for (i, source) in forecast.sources.iter().enumerate() {
            let _ = writeln!(out, "  {}. {} <{}>", i + 1, source.title, source.uri);
        }
    }
    out
}

pub fn render_progress(progress: u8) -> String {
    let p = progress.min(100);
    format!("ANALYSING DATA [{}] {:>3}%", bar(p as f64, 30), p)
}

pub fn render_error(message: &str, retryable: bool) -> String {
    let mut out = format!("ANALYSIS FAILED\n  {}\n", message);
    if retryable {
        out.push_str("  Press Enter to retry, or q to quit.\n");
    }
    out
}
