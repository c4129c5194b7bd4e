//! Time parsing and formatting utilities

use crate::error::{ExportError, ExportResult};

/// Parser for the clock strings ffmpeg prints (`HH:MM:SS.micro`)
pub struct TimeParser;

impl TimeParser {
    /// Create a new time parser
    pub fn new() -> Self {
        Self
    }
}

impl Default for TimeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeParser {
    /// Parse a time string to seconds
    ///
    /// Accepts plain seconds, `MM:SS(.frac)` and `HH:MM:SS(.frac)`.
    /// A leading `-` (ffmpeg reports `-00:00:00.000000` before the first
    /// frame) yields a negative value.
    pub fn parse_time(&self, time_str: &str) -> ExportResult<f64> {
        let time_str = time_str.trim();
        if time_str.is_empty() || time_str == "N/A" {
            return Err(invalid(time_str));
        }

        if let Ok(seconds) = time_str.parse::<f64>() {
            return Ok(seconds);
        }

        let (sign, body) = match time_str.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, time_str),
        };

        let parts: Vec<&str> = body.split(':').collect();
        let (hours, minutes, seconds) = match parts.as_slice() {
            [m, s] => ("0", *m, *s),
            [h, m, s] => (*h, *m, *s),
            _ => return Err(invalid(time_str)),
        };

        let hours: f64 = hours.parse().map_err(|_| invalid(time_str))?;
        let minutes: f64 = minutes.parse().map_err(|_| invalid(time_str))?;
        let seconds: f64 = seconds.parse().map_err(|_| invalid(time_str))?;

        Ok(sign * (hours * 3600.0 + minutes * 60.0 + seconds))
    }
}

fn invalid(time_str: &str) -> ExportError {
    ExportError::InvalidJob(format!("invalid time value: {}", time_str))
}

/// Render seconds the way ffmpeg expects on the command line
pub fn ffmpeg_seconds(seconds: f64) -> String {
    let formatted = format!("{:.3}", seconds.max(0.0));
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
