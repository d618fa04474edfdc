//! Formatting helpers for progress lines, byte sizes and durations.

use std::time::Duration;

use crate::progress::ProgressEvent;

const NAME_WIDTH: usize = 50;
const PERCENT_WIDTH: usize = 7;
const BYTES_WIDTH: usize = 23;
const SPEED_WIDTH: usize = 10;
const ETA_WIDTH: usize = 12;

/// Renders one event as a fixed-width, single-line status.
///
/// Columns, joined by `" | "`: `[source]`, `[index/count]`, name, percent,
/// `done / total`, speed, ETA and message. Columns with nothing to show are
/// left out.
#[must_use]
pub fn format_line(event: &ProgressEvent) -> String {
    let terminal = event.stage.is_terminal();
    let mut cols = vec![format!("[{}]", event.source)];

    if let Some((index, count)) = event.item {
        cols.push(format!("[{index}/{count}]"));
    }
    if !event.name.is_empty() {
        cols.push(fit(&event.name, NAME_WIDTH));
    }

    let percent = if terminal && event.total.is_some() {
        Some(100.0)
    } else {
        // anything that would round to 100.0 is shown as 99.9
        event.percent.map(|p| if p >= 99.95 { 99.9 } else { p })
    };
    if let Some(p) = percent {
        cols.push(pad(&format!("{p:5.1}%"), PERCENT_WIDTH));
    }

    if event.downloaded > 0 || event.total.is_some() {
        let left = match event.total {
            Some(total) if terminal => total,
            _ => event.downloaded,
        };
        let text = match event.total {
            Some(total) if total > 0 => {
                format!("{} / {}", format_bytes(left), format_bytes(total))
            }
            _ => format_bytes(left),
        };
        cols.push(pad(&text, BYTES_WIDTH));
    }

    if let Some(speed) = event.speed {
        cols.push(pad(&format_speed(speed), SPEED_WIDTH));
    }
    if let Some(eta) = event.eta {
        cols.push(pad(&format_eta(eta), ETA_WIDTH));
    }
    if let Some(message) = event.message.as_deref().filter(|m| !m.is_empty()) {
        cols.push(message.to_string());
    }

    cols.join(" | ")
}

/// Formats a byte count with binary units (B, KB, MB, GB, TB).
///
/// Bytes are shown as an integer, larger units with one decimal place and
/// no space: `512B`, `1.5KB`, `3.0MB`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let (value, unit) = scale(bytes as f64, &UNITS);
    format!("{value:.1}{unit}")
}

/// Formats a transfer rate in bytes per second: ` 6.1MB/s`.
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
    let (value, unit) = scale(bytes_per_sec.max(0.0), &UNITS);
    format!("{value:4.1}{unit}")
}

/// Formats a remaining time as `ETA HH:MM:SS`.
#[must_use]
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    format!(
        "ETA {:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Formats a duration as a human-readable string (e.g. "5.0s", "1m 05s", "1h 01m 05s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!(
            "{}h {:02}m {:02}s",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:01}s", secs, d.subsec_millis() / 100)
    }
}

/// Pads or left-truncates `s` to exactly `width` characters, keeping the
/// tail and marking the cut with `…`.
#[must_use]
pub fn fit(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len <= width {
        return pad(s, width);
    }
    if width == 0 {
        return String::new();
    }
    let tail: String = s.chars().skip(len - (width - 1)).collect();
    format!("…{tail}")
}

fn pad(s: &str, width: usize) -> String {
    format!("{s:<width$}")
}

fn scale<'a>(mut value: f64, units: &[&'a str]) -> (f64, &'a str) {
    let mut index = 0;
    while value >= 1024.0 && index + 1 < units.len() {
        value /= 1024.0;
        index += 1;
    }
    (value, units[index])
}
