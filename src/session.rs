use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use crate::geometry::LineBounds;

/// Plain extracted text handed to the engine, plus the key progress is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new(key: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            text: text.into(),
        }
    }

    /// Reads a plain-text file. The canonical path is the key, so the same
    /// file resumes wherever it is opened from.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let key = fs::canonicalize(path)?.display().to_string();
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());
        Ok(Self { key, title, text })
    }
}

/// A paragraph-sized chunk of the document sized to one viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingUnit {
    pub id: usize,
    pub text: String,
    pub word_count: usize,
    pub is_completed: bool,
    /// Milliseconds timestamp of the moment the unit became active.
    pub reading_started_at: Option<i64>,
    pub reading_duration: Option<Duration>,
    /// Attached lazily once on-screen geometry is known.
    pub lines: Option<Vec<LineBounds>>,
}

impl ReadingUnit {
    pub fn new(id: usize, text: String) -> Self {
        let word_count = text.split_whitespace().count();
        Self {
            id,
            text,
            word_count,
            is_completed: false,
            reading_started_at: None,
            reading_duration: None,
            lines: None,
        }
    }

    /// Marks the unit read. Returns false when it already was.
    pub(crate) fn complete(&mut self, now_ms: i64) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        if let Some(started) = self.reading_started_at {
            let elapsed = now_ms.saturating_sub(started).max(0) as u64;
            self.reading_duration = Some(Duration::from_millis(elapsed));
        }
        true
    }
}

/// Where a reader is in a document. One live record per document key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub document_key: String,
    pub current_unit_index: usize,
    pub completed_unit_indexes: BTreeSet<usize>,
    pub total_units: usize,
    pub last_updated: DateTime<Utc>,
}

impl ReadingProgress {
    pub fn completion_percentage(&self) -> u8 {
        completion_percentage(self.completed_unit_indexes.len(), self.total_units)
    }
}

/// Cumulative stats of one viewing of a document, upserted under `session_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSession {
    pub session_id: String,
    pub document_key: String,
    pub total_units: usize,
    pub completed_units: usize,
    pub total_words: usize,
    pub reading_time_seconds: u64,
    pub completion_percentage: u8,
    pub captured_at: DateTime<Utc>,
}

/// Final aggregate handed to the completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionStats {
    pub total_words: usize,
    pub total_units: usize,
    pub completed_units: usize,
    pub reading_time_seconds: u64,
    pub completion_percentage: u8,
}

pub fn completion_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed.min(total) as f64 / total as f64) * 100.0).round() as u8
}

/// Milliseconds since the epoch to a UTC timestamp; out-of-range values clamp to the epoch.
pub fn timestamp_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
