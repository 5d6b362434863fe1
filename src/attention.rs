use std::collections::VecDeque;

use crate::completion_policy::CompletionRule;
use crate::geometry::LineBounds;

/// Where the reader is focused at one instant. Produced outside the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionSample {
    pub x: f64,
    pub y: f64,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub confidence: Option<f64>,
}

impl AttentionSample {
    pub fn new(x: f64, y: f64, timestamp: i64) -> Self {
        Self {
            x,
            y,
            timestamp,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum LineStatus {
    Pending,
    InProgress,
    Complete,
}

/// Samples kept per line. The completion rules only look at the tail.
pub const MAX_LINE_HISTORY: usize = 512;

/// Reading state of one line of the active unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LineReadingState {
    pub line_index: usize,
    pub bounds: LineBounds,
    pub attention_history: VecDeque<AttentionSample>,
    pub started_at: Option<i64>,
    pub status: LineStatus,
    pub completion_percentage: u8,
    pub max_horizontal_progress: f64,
    pub completed_by: Option<CompletionRule>,
}

impl LineReadingState {
    pub fn new(bounds: LineBounds) -> Self {
        Self {
            line_index: bounds.index,
            bounds,
            attention_history: VecDeque::new(),
            started_at: None,
            status: LineStatus::Pending,
            completion_percentage: 0,
            max_horizontal_progress: 0.0,
            completed_by: None,
        }
    }

    /// A line already read in an earlier visit of its unit.
    pub fn already_read(bounds: LineBounds) -> Self {
        let mut state = Self::new(bounds);
        state.status = LineStatus::Complete;
        state.completion_percentage = 100;
        state.max_horizontal_progress = 1.0;
        state
    }

    pub fn is_complete(&self) -> bool {
        self.status == LineStatus::Complete
    }

    pub fn begin(&mut self, now_ms: i64) {
        if self.status == LineStatus::Pending {
            self.status = LineStatus::InProgress;
            self.started_at = Some(now_ms);
        }
    }

    pub(crate) fn record(&mut self, sample: AttentionSample, progress: f64) {
        if self.attention_history.len() >= MAX_LINE_HISTORY {
            self.attention_history.pop_front();
        }
        self.attention_history.push_back(sample);
        self.max_horizontal_progress = self.max_horizontal_progress.max(progress);
        self.completion_percentage = (self.max_horizontal_progress * 100.0).round() as u8;
    }

    /// Terminal. Calling it again keeps the first rule that fired.
    pub(crate) fn finish(&mut self, rule: CompletionRule) {
        if self.is_complete() {
            return;
        }
        self.status = LineStatus::Complete;
        self.completion_percentage = 100;
        self.completed_by = Some(rule);
    }
}
