//! Copy timing and human-readable formatting for reports.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Timing information for one archive copy
#[derive(Debug, Clone)]
pub struct CopyStats {
    /// Bytes written to the destination
    pub bytes: u64,

    /// Wall-clock time spent copying
    pub elapsed: Duration,
}

impl CopyStats {
    /// Average throughput in bytes/second
    pub fn bytes_per_second(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Measures a copy from start to finish
pub struct CopyTimer {
    start_time: Instant,
}

impl CopyTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn finish(self, bytes: u64) -> CopyStats {
        CopyStats {
            bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Compact age of a timestamp relative to `now` ("3d", "5h", "just now")
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    if minutes <= 0 {
        return "just now".to_string();
    }

    let hours = minutes / 60;
    let days = hours / 24;
    match (days / 365, days / 30, days, hours) {
        (y, _, _, _) if y > 0 => format!("{}y", y),
        (_, mo, _, _) if mo > 0 => format!("{}mo", mo),
        (_, _, d, _) if d > 0 => format!("{}d", d),
        (_, _, _, h) if h > 0 => format!("{}h", h),
        _ => format!("{}m", minutes),
    }
}
