use serde::{Deserialize, Serialize};

use crate::attention::{AttentionSample, LineReadingState, LineStatus};
use crate::line_mapper::{has_passed_right_edge, horizontal_progress, RIGHT_EDGE_THRESHOLD};

/// Tunable thresholds of the two line completion rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionThresholds {
    /// Horizontal progress that completes a line on its own.
    pub right_edge: f64,
    /// Share of the line width the recent window has to span.
    pub sweep_span: f64,
    /// Progress the line must have reached before a sweep counts.
    pub sweep_min_progress: f64,
    /// Number of most recent in-line samples the sweep rule looks at.
    pub sweep_window: usize,
}

impl Default for CompletionThresholds {
    fn default() -> Self {
        Self {
            right_edge: RIGHT_EDGE_THRESHOLD,
            sweep_span: 0.7,
            sweep_min_progress: 0.8,
            sweep_window: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CompletionRule {
    RightEdge,
    Sweep,
}

/// What a single sample did to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Not the line being read, or outside its box.
    Ignored,
    Progressed,
    Completed(CompletionRule),
}

pub fn right_edge_rule(sample: &AttentionSample, line: &LineReadingState, t: &CompletionThresholds) -> bool {
    has_passed_right_edge(sample.x, &line.bounds, t.right_edge)
}

/// The last `sweep_window` samples cover enough of the width and the line got far enough.
///
/// Needs a full window, so a handful of jittery samples can't complete a line.
pub fn sweep_rule(line: &LineReadingState, t: &CompletionThresholds) -> bool {
    let history = &line.attention_history;
    if t.sweep_window == 0 || history.len() < t.sweep_window || line.bounds.width <= 0.0 {
        return false;
    }
    let (min_x, max_x) = history
        .iter()
        .skip(history.len() - t.sweep_window)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s.x), hi.max(s.x))
        });
    (max_x - min_x) / line.bounds.width >= t.sweep_span
        && line.max_horizontal_progress >= t.sweep_min_progress
}

/// Applies one sample to the line currently being read.
pub fn apply_sample(
    line: &mut LineReadingState,
    sample: AttentionSample,
    t: &CompletionThresholds,
) -> SampleOutcome {
    if line.status != LineStatus::InProgress || !line.bounds.contains(sample.x, sample.y) {
        return SampleOutcome::Ignored;
    }

    let progress = horizontal_progress(sample.x, &line.bounds);
    line.record(sample, progress);

    let rule = if right_edge_rule(&sample, line, t) {
        Some(CompletionRule::RightEdge)
    } else if sweep_rule(line, t) {
        Some(CompletionRule::Sweep)
    } else {
        None
    };

    match rule {
        Some(rule) => {
            line.finish(rule);
            SampleOutcome::Completed(rule)
        }
        None => SampleOutcome::Progressed,
    }
}
