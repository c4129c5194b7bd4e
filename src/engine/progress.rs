//! Progress parsing for ffmpeg's `-progress` stream and job progress math

use serde::Serialize;

use crate::utils::time::TimeParser;

/// Share of the job reserved for per-clip renders on the smart path
pub const RENDER_PHASE_PERCENT: f64 = 90.0;

/// Highest value reported before the job is marked complete
pub const MAX_RUNNING_PERCENT: u8 = 99;

/// Progress of one external process
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessProgress {
    /// Output timestamp reached, in seconds
    pub seconds: f64,
    /// Completed share in [0, 100] when the expected duration is known
    pub percent: Option<f64>,
    /// `progress=end` was seen
    pub finished: bool,
}

impl ProcessProgress {
    /// Completed share in [0, 1]; unknown counts as zero until finished
    pub fn fraction(&self) -> f64 {
        if self.finished {
            return 1.0;
        }
        self.percent.map_or(0.0, |p| (p / 100.0).clamp(0.0, 1.0))
    }
}

/// Incremental parser for `key=value` progress blocks
///
/// ffmpeg writes one block per update terminated by `progress=continue`, and
/// a last block terminated by `progress=end`.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    expected_duration: Option<f64>,
    out_time: f64,
    have_micros: bool,
}

impl ProgressParser {
    pub fn new(expected_duration: Option<f64>) -> Self {
        Self {
            expected_duration: expected_duration.filter(|d| *d > 0.0),
            out_time: 0.0,
            have_micros: false,
        }
    }

    /// Feed one line; returns a snapshot when a block completes
    pub fn feed_line(&mut self, line: &str) -> Option<ProcessProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key.trim() {
            // out_time_ms is reported in microseconds as well
            "out_time_us" | "out_time_ms" => {
                if let Ok(micros) = value.parse::<i64>() {
                    self.out_time = (micros.max(0) as f64) / 1_000_000.0;
                    self.have_micros = true;
                }
                None
            }
            "out_time" => {
                if !self.have_micros {
                    if let Ok(seconds) = TimeParser::new().parse_time(value) {
                        self.out_time = seconds.max(0.0);
                    }
                }
                None
            }
            "progress" => {
                let finished = value == "end";
                self.have_micros = false;
                Some(self.snapshot(finished))
            }
            _ => None,
        }
    }

    fn snapshot(&self, finished: bool) -> ProcessProgress {
        let percent = self.expected_duration.map(|total| {
            if finished {
                100.0
            } else {
                (self.out_time / total * 100.0).clamp(0.0, 100.0)
            }
        });
        ProcessProgress {
            seconds: self.out_time,
            percent,
            finished,
        }
    }
}

/// Job progress while rendering clip `completed` (0-based) of `total` with
/// the current clip `fraction` done: `floor((completed + fraction) / total * 90)`
pub fn render_phase_percent(completed: usize, fraction: f64, total: usize) -> u8 {
    if total == 0 {
        return RENDER_PHASE_PERCENT as u8;
    }
    let done = (completed as f64 + fraction.clamp(0.0, 1.0)).min(total as f64);
    (done * RENDER_PHASE_PERCENT / total as f64).floor() as u8
}

/// Job progress during the smart-path concatenation: 90 to 99
pub fn concat_phase_percent(fraction: f64) -> u8 {
    let span = MAX_RUNNING_PERCENT as f64 - RENDER_PHASE_PERCENT;
    (RENDER_PHASE_PERCENT + fraction.clamp(0.0, 1.0) * span).floor() as u8
}

/// Job progress during a fast-path concatenation, capped at 99
pub fn fast_path_percent(fraction: f64) -> u8 {
    ((fraction.clamp(0.0, 1.0) * 100.0).floor() as u8).min(MAX_RUNNING_PERCENT)
}
