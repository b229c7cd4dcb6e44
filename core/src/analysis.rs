//! Post-run inspection of frame logs: hardware frame-counter gaps and
//! inter-frame arrival statistics.

use crate::math::stats::StatsHelper;
use crate::prelude::{AnalysisError, AnalysisResult};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Intervals above this are treated as start-up latency, not frame timing.
pub const STARTUP_INTERVAL_MS: f64 = 1000.0;
pub const HISTOGRAM_BIN_MS: f64 = 2.0;

/// The subset of a logged frame the analysis needs.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggedFrame {
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub header: BTreeMap<String, serde_json::Value>,
}

impl LoggedFrame {
    pub fn frame_number(&self) -> Option<u64> {
        self.header.get("frameNumber").and_then(|v| v.as_u64())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameGap {
    /// Index (among frames with a timestamp and frame number) of the frame after the gap.
    pub log_index: usize,
    pub prev_frame: u64,
    pub next_frame: u64,
    pub skipped: u64,
    pub time_gap_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalStats {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub mode_ms: f64,
    pub std_dev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogReport {
    pub frames: usize,
    pub duration_s: f64,
    pub first_frame: u64,
    pub last_frame: u64,
    pub missed_frames: u64,
    pub gaps: Vec<FrameGap>,
    pub excluded_initial_ms: Option<f64>,
    pub intervals: Option<IntervalStats>,
}

/// Parses a frame log written as a JSON array (possibly missing its closing
/// bracket) or as JSON lines.
pub fn parse_log(text: &str) -> AnalysisResult<Vec<LoggedFrame>> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        return match serde_json::from_str(trimmed) {
            Ok(frames) => Ok(frames),
            Err(err) => repair_truncated_array(trimmed).ok_or(AnalysisError::Parse(err)),
        };
    }

    let lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut frames = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        match serde_json::from_str(line) {
            Ok(frame) => frames.push(frame),
            Err(_) if idx + 1 == lines.len() => warn!("Ignoring truncated final log line"),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(frames)
}

fn repair_truncated_array(text: &str) -> Option<Vec<LoggedFrame>> {
    let closed = format!("{}]", text.trim_end_matches(',').trim_end());
    if let Ok(frames) = serde_json::from_str(&closed) {
        warn!("Log was missing its closing bracket");
        return Some(frames);
    }
    // Last object cut off mid-write: keep everything before its separator.
    let cut = text.rfind(",\n")?;
    let frames = serde_json::from_str(&format!("{}]", &text[..cut])).ok()?;
    warn!("Log ended inside a frame; partial frame discarded");
    Some(frames)
}

pub fn load_log<P: AsRef<Path>>(path: P) -> AnalysisResult<Vec<LoggedFrame>> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_log(&contents)
}

/// Newest `fHist_*` log in `dir`, by modification time.
pub fn latest_log<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("fHist_") && (name.ends_with(".json") || name.ends_with(".jsonl"))
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

pub fn analyze(frames: &[LoggedFrame]) -> AnalysisResult<LogReport> {
    let valid: Vec<(f64, u64)> = frames
        .iter()
        .filter_map(|f| Some((f.timestamp?, f.frame_number()?)))
        .collect();
    let (first, last) = match (valid.first(), valid.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(AnalysisError::Empty),
    };

    let mut gaps = Vec::new();
    for (idx, pair) in valid.windows(2).enumerate() {
        let (prev_ts, prev_frame) = pair[0];
        let (next_ts, next_frame) = pair[1];
        if next_frame > prev_frame + 1 {
            gaps.push(FrameGap {
                log_index: idx + 1,
                prev_frame,
                next_frame,
                skipped: next_frame - prev_frame - 1,
                time_gap_s: next_ts - prev_ts,
            });
        }
    }

    let mut intervals_ms: Vec<f64> = valid
        .windows(2)
        .map(|pair| (pair[1].0 - pair[0].0) * 1000.0)
        .collect();
    let mut excluded_initial_ms = None;
    if intervals_ms.first().is_some_and(|&first| first > STARTUP_INTERVAL_MS) {
        excluded_initial_ms = Some(intervals_ms.remove(0));
    }

    let intervals = if intervals_ms.is_empty() {
        None
    } else {
        let max_ms = StatsHelper::max(&intervals_ms);
        let upper = (max_ms + 50.0).max(200.0);
        Some(IntervalStats {
            mean_ms: StatsHelper::mean(&intervals_ms),
            median_ms: StatsHelper::median(&intervals_ms),
            mode_ms: StatsHelper::binned_mode(&intervals_ms, HISTOGRAM_BIN_MS, upper),
            std_dev_ms: StatsHelper::std_dev(&intervals_ms),
            min_ms: StatsHelper::min(&intervals_ms),
            max_ms,
        })
    };

    Ok(LogReport {
        frames: valid.len(),
        duration_s: last.0 - first.0,
        first_frame: first.1,
        last_frame: last.1,
        missed_frames: gaps.iter().map(|g| g.skipped).sum(),
        gaps,
        excluded_initial_ms,
        intervals,
    })
}

impl fmt::Display for LogReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Analysis Report ---")?;
        writeln!(f, "Total Valid Frames Logged: {}", self.frames)?;
        writeln!(f, "Duration: {:.2} seconds", self.duration_s)?;
        writeln!(f, "Frame Number Range: {} to {}", self.first_frame, self.last_frame)?;
        writeln!(f, "Total Missed Frames (Hardware Counter): {}", self.missed_frames)?;
        if !self.gaps.is_empty() {
            writeln!(f, "\nMissed Frame Events:")?;
            writeln!(
                f,
                "{:<10} {:<15} {:<15} {:<10} {:<15}",
                "Log Index", "Prev Frame", "Next Frame", "Skipped", "Time Gap (s)"
            )?;
            for gap in &self.gaps {
                writeln!(
                    f,
                    "{:<10} {:<15} {:<15} {:<10} {:.4}",
                    gap.log_index, gap.prev_frame, gap.next_frame, gap.skipped, gap.time_gap_s
                )?;
            }
        }
        if let Some(excluded) = self.excluded_initial_ms {
            writeln!(f, "\nExcluded initial interval of {:.2} ms", excluded)?;
        }
        match &self.intervals {
            Some(stats) => {
                writeln!(f, "\n--- Timing Statistics ---")?;
                writeln!(f, "Mean Interval:   {:.2} ms", stats.mean_ms)?;
                writeln!(f, "Median Interval: {:.2} ms", stats.median_ms)?;
                writeln!(f, "Mode Interval:   {:.2} ms", stats.mode_ms)?;
                writeln!(f, "Std Dev:         {:.2} ms", stats.std_dev_ms)?;
                writeln!(f, "Min Interval:    {:.2} ms", stats.min_ms)?;
                write!(f, "Max Interval:    {:.2} ms", stats.max_ms)
            }
            None => write!(f, "\nNot enough frames to analyse intervals."),
        }
    }
}
