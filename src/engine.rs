use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::attention::{AttentionSample, LineReadingState};
use crate::completion_policy::{apply_sample, CompletionRule, CompletionThresholds, SampleOutcome};
use crate::error::EngineError;
use crate::geometry::{FontMetrics, Viewport};
use crate::line_mapper::map_to_lines;
use crate::segmenter::Segmenter;
use crate::session::{
    completion_percentage, timestamp_from_millis, CompletionStats, Document, ReadingProgress,
    ReadingSession, ReadingUnit,
};

/// Samples that missed the active line, kept for diagnostics.
pub const STRAY_SAMPLE_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    LineCompleted {
        unit: usize,
        line: usize,
        rule: CompletionRule,
    },
    UnitCompleted {
        unit: usize,
        duration: Option<Duration>,
    },
    UnitActivated {
        unit: usize,
    },
    DocumentCompleted(CompletionStats),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    pub thresholds: CompletionThresholds,
    /// Move to the next unit as soon as the active one is read.
    pub auto_advance: bool,
    /// Samples reporting a lower confidence are dropped.
    pub min_confidence: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            thresholds: CompletionThresholds::default(),
            auto_advance: true,
            min_confidence: 0.0,
        }
    }
}

pub type CompletionCallback = Box<dyn FnMut(&CompletionStats)>;

/// Reading state of one document load: the units, which one is active, and
/// line-level progress for the active unit only.
pub struct ReadingEngine {
    document_key: String,
    title: String,
    units: Vec<ReadingUnit>,
    active: usize,
    lines: Vec<LineReadingState>,
    active_line: Option<usize>,
    viewport: Option<Viewport>,
    font: FontMetrics,
    options: EngineOptions,
    opened_at: i64,
    last_seen: i64,
    document_completed: bool,
    stray_samples: VecDeque<AttentionSample>,
    stray_count: u64,
    on_complete: Option<CompletionCallback>,
}

impl fmt::Debug for ReadingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadingEngine")
            .field("document_key", &self.document_key)
            .field("units", &self.units.len())
            .field("active", &self.active)
            .field("active_line", &self.active_line)
            .field("viewport", &self.viewport)
            .field("document_completed", &self.document_completed)
            .finish_non_exhaustive()
    }
}

impl ReadingEngine {
    /// Segments the document and activates its first unit.
    pub fn new(
        document: &Document,
        segmenter: &Segmenter,
        viewport: Option<Viewport>,
        font: FontMetrics,
        options: EngineOptions,
        now_ms: i64,
    ) -> Self {
        let units = segmenter.segment(&document.text);
        log::info!(
            "loaded '{}' as {} units ({} mode, {} words per unit)",
            document.title,
            units.len(),
            segmenter.mode(),
            segmenter.words_per_unit()
        );
        Self::from_units(
            document.key.clone(),
            document.title.clone(),
            units,
            viewport,
            font,
            options,
            now_ms,
        )
    }

    pub fn from_units(
        document_key: String,
        title: String,
        units: Vec<ReadingUnit>,
        viewport: Option<Viewport>,
        font: FontMetrics,
        options: EngineOptions,
        now_ms: i64,
    ) -> Self {
        let mut units = units;
        if units.is_empty() {
            units.push(ReadingUnit::new(0, crate::segmenter::PLACEHOLDER_TEXT.to_string()));
        }
        let mut engine = Self {
            document_key,
            title,
            units,
            active: 0,
            lines: Vec::new(),
            active_line: None,
            viewport,
            font,
            options,
            opened_at: now_ms,
            last_seen: now_ms,
            document_completed: false,
            stray_samples: VecDeque::with_capacity(STRAY_SAMPLE_BUFFER),
            stray_count: 0,
            on_complete: None,
        };
        engine.activate(0, now_ms);
        engine
    }

    /// Registers the callback fired once when every unit has been read.
    pub fn on_document_complete<F>(&mut self, callback: F)
    where
        F: FnMut(&CompletionStats) + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    pub fn document_key(&self) -> &str {
        &self.document_key
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn units(&self) -> &[ReadingUnit] {
        &self.units
    }

    pub fn total_units(&self) -> usize {
        self.units.len()
    }

    pub fn total_words(&self) -> usize {
        self.units.iter().map(|u| u.word_count).sum()
    }

    pub fn completed_units(&self) -> usize {
        self.units.iter().filter(|u| u.is_completed).count()
    }

    pub fn active_unit_index(&self) -> usize {
        self.active
    }

    pub fn active_unit(&self) -> &ReadingUnit {
        &self.units[self.active]
    }

    pub fn line_states(&self) -> &[LineReadingState] {
        &self.lines
    }

    /// Index of the line being read, None once the unit is done or without geometry.
    pub fn active_line_index(&self) -> Option<usize> {
        self.active_line
    }

    pub fn active_line(&self) -> Option<&LineReadingState> {
        self.active_line.and_then(|i| self.lines.get(i))
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn font(&self) -> FontMetrics {
        self.font
    }

    pub fn is_document_complete(&self) -> bool {
        self.units.iter().all(|u| u.is_completed)
    }

    pub fn stray_sample_count(&self) -> u64 {
        self.stray_count
    }

    pub fn recent_stray_samples(&self) -> impl Iterator<Item = &AttentionSample> {
        self.stray_samples.iter()
    }

    /// Furthest unit the reader may open: the first unread one.
    pub fn furthest_available(&self) -> usize {
        self.units
            .iter()
            .position(|u| !u.is_completed)
            .unwrap_or(self.units.len() - 1)
    }

    /// Applies a stored position. Records for a different pagination are refused.
    pub fn restore(&mut self, progress: &ReadingProgress, now_ms: i64) -> bool {
        let total = self.units.len();
        if progress.total_units != total {
            log::info!(
                "ignoring stored progress for '{}': {} units stored, {} now",
                self.document_key,
                progress.total_units,
                total
            );
            return false;
        }
        if progress.current_unit_index >= total
            || progress.completed_unit_indexes.iter().any(|&i| i >= total)
        {
            log::warn!(
                "ignoring stored progress for '{}': indexes out of range",
                self.document_key
            );
            return false;
        }

        for &index in &progress.completed_unit_indexes {
            self.units[index].is_completed = true;
        }
        // Completion was reported when the earlier session finished the document.
        self.document_completed = self.is_document_complete();
        self.activate(progress.current_unit_index, now_ms);
        log::info!(
            "resumed '{}' at unit {} with {} units read",
            self.document_key,
            self.active,
            progress.completed_unit_indexes.len()
        );
        true
    }

    /// Recomputes line geometry for the active unit after a layout change.
    pub fn set_layout(&mut self, viewport: Viewport, font: FontMetrics) {
        if self.viewport == Some(viewport) && self.font == font {
            return;
        }
        self.viewport = Some(viewport);
        self.font = font;
        self.relayout();
    }

    pub fn process_sample(&mut self, sample: AttentionSample) -> Vec<EngineEvent> {
        let now = sample.timestamp;
        self.last_seen = now;

        if sample
            .confidence
            .is_some_and(|c| c < self.options.min_confidence)
        {
            return Vec::new();
        }

        let Some(line_index) = self.active_line else {
            self.record_stray(sample);
            return Vec::new();
        };

        let outcome = apply_sample(&mut self.lines[line_index], sample, &self.options.thresholds);
        let rule = match outcome {
            SampleOutcome::Ignored => {
                self.record_stray(sample);
                return Vec::new();
            }
            SampleOutcome::Progressed => return Vec::new(),
            SampleOutcome::Completed(rule) => rule,
        };

        let unit = self.active;
        log::debug!("unit {unit} line {line_index} read ({rule})");
        let mut events = vec![EngineEvent::LineCompleted {
            unit,
            line: line_index,
            rule,
        }];

        let next = line_index + 1;
        if next < self.lines.len() {
            self.lines[next].begin(now);
            self.active_line = Some(next);
            return events;
        }

        self.active_line = None;
        if self.units[unit].complete(now) {
            let duration = self.units[unit].reading_duration;
            log::info!("unit {unit} read in {duration:?}");
            events.push(EngineEvent::UnitCompleted { unit, duration });
        }
        events.extend(self.check_document_completion(now));

        if self.options.auto_advance && unit + 1 < self.units.len() {
            self.activate(unit + 1, now);
            events.push(EngineEvent::UnitActivated { unit: unit + 1 });
        }
        events
    }

    /// Fires document completion the first time every unit is read. Safe to
    /// call repeatedly.
    pub fn check_document_completion(&mut self, now_ms: i64) -> Option<EngineEvent> {
        if self.document_completed || !self.is_document_complete() {
            return None;
        }
        self.document_completed = true;
        let stats = self.completion_stats(now_ms);
        log::info!(
            "document '{}' read: {} words in {}s",
            self.document_key,
            stats.total_words,
            stats.reading_time_seconds
        );
        if let Some(callback) = self.on_complete.as_mut() {
            callback(&stats);
        }
        Some(EngineEvent::DocumentCompleted(stats))
    }

    pub fn go_to_unit(&mut self, index: usize, now_ms: i64) -> Result<Option<EngineEvent>, EngineError> {
        let total = self.units.len();
        if index >= total {
            return Err(EngineError::UnitOutOfRange { index, total });
        }
        let available = self.furthest_available();
        if index > available && index > self.active {
            return Err(EngineError::UnitLocked { index, available });
        }
        if index == self.active {
            return Ok(None);
        }
        self.activate(index, now_ms);
        Ok(Some(EngineEvent::UnitActivated { unit: index }))
    }

    /// Stays put on the last unit.
    pub fn next_unit(&mut self, now_ms: i64) -> Result<Option<EngineEvent>, EngineError> {
        if self.active + 1 >= self.units.len() {
            return Ok(None);
        }
        self.go_to_unit(self.active + 1, now_ms)
    }

    /// Stays put on the first unit.
    pub fn previous_unit(&mut self, now_ms: i64) -> Result<Option<EngineEvent>, EngineError> {
        match self.active.checked_sub(1) {
            Some(index) => self.go_to_unit(index, now_ms),
            None => Ok(None),
        }
    }

    pub fn completion_stats(&self, now_ms: i64) -> CompletionStats {
        let completed = self.completed_units();
        CompletionStats {
            total_words: self.total_words(),
            total_units: self.units.len(),
            completed_units: completed,
            reading_time_seconds: self.elapsed_seconds(now_ms),
            completion_percentage: completion_percentage(completed, self.units.len()),
        }
    }

    pub fn progress_snapshot(&self, now_ms: i64) -> ReadingProgress {
        ReadingProgress {
            document_key: self.document_key.clone(),
            current_unit_index: self.active,
            completed_unit_indexes: self
                .units
                .iter()
                .filter(|u| u.is_completed)
                .map(|u| u.id)
                .collect(),
            total_units: self.units.len(),
            last_updated: timestamp_from_millis(now_ms),
        }
    }

    pub fn session_snapshot(&self, session_id: &str, now_ms: i64) -> ReadingSession {
        let stats = self.completion_stats(now_ms);
        ReadingSession {
            session_id: session_id.to_string(),
            document_key: self.document_key.clone(),
            total_units: stats.total_units,
            completed_units: stats.completed_units,
            total_words: stats.total_words,
            reading_time_seconds: stats.reading_time_seconds,
            completion_percentage: stats.completion_percentage,
            captured_at: timestamp_from_millis(now_ms),
        }
    }

    /// Seconds since the document was opened.
    pub fn elapsed_seconds(&self, now_ms: i64) -> u64 {
        (now_ms.saturating_sub(self.opened_at).max(0) / 1000) as u64
    }

    fn activate(&mut self, index: usize, now_ms: i64) {
        if index != self.active {
            self.units[self.active].lines = None;
        }
        self.active = index;
        self.last_seen = now_ms;
        let unit = &mut self.units[index];
        if !unit.is_completed && unit.reading_started_at.is_none() {
            unit.reading_started_at = Some(now_ms);
        }
        self.lines.clear();
        self.active_line = None;
        self.relayout();
    }

    fn relayout(&mut self) {
        let unit = &mut self.units[self.active];
        let Some(viewport) = self.viewport.filter(Viewport::is_usable) else {
            log::debug!("no usable viewport, unit {} waits for geometry", unit.id);
            unit.lines = None;
            self.lines.clear();
            self.active_line = None;
            return;
        };

        let bounds = map_to_lines(&unit.text, &viewport, &self.font);
        unit.lines = Some(bounds.clone());

        if unit.is_completed {
            self.lines = bounds.into_iter().map(LineReadingState::already_read).collect();
            self.active_line = None;
            return;
        }

        if bounds.len() == self.lines.len() {
            for (state, b) in self.lines.iter_mut().zip(bounds) {
                state.bounds = b;
            }
            return;
        }

        // Wrapping changed: keep the number of lines already read, minus the last.
        let read = self.lines.iter().filter(|l| l.is_complete()).count();
        let keep = read.min(bounds.len().saturating_sub(1));
        let now = self.last_seen;
        self.lines = bounds
            .into_iter()
            .enumerate()
            .map(|(i, b)| {
                if i < keep {
                    LineReadingState::already_read(b)
                } else {
                    LineReadingState::new(b)
                }
            })
            .collect();
        self.active_line = self.lines.get_mut(keep).map(|line| {
            line.begin(now);
            keep
        });
    }

    fn record_stray(&mut self, sample: AttentionSample) {
        self.stray_count += 1;
        if self.stray_samples.len() == STRAY_SAMPLE_BUFFER {
            self.stray_samples.pop_front();
        }
        self.stray_samples.push_back(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion_policy::CompletionRule;
    use crate::segmenter::SegmentMode;
    use assert_matches::assert_matches;
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    // 10px font: 6px glyphs. 50-glyph words are exactly 300px, one per line,
    // and lines start at x = 20.
    fn font() -> FontMetrics {
        FontMetrics {
            font_size: 10.0,
            line_height: 20.0,
            padding: 20.0,
        }
    }

    fn viewport() -> Viewport {
        Viewport::new(0.0, 0.0, 340.0, 400.0)
    }

    fn long_word(c: char) -> String {
        std::iter::repeat(c).take(50).collect()
    }

    /// `units` units of `lines` lines each.
    fn engine(units: usize, lines: usize) -> ReadingEngine {
        let words: Vec<String> = (0..units * lines)
            .map(|i| long_word((b'a' + (i % 26) as u8) as char))
            .collect();
        let doc = Document::new("doc", "Doc", words.join(" "));
        let segmenter = Segmenter::with_words_per_unit(SegmentMode::Viewport, lines);
        ReadingEngine::new(
            &doc,
            &segmenter,
            Some(viewport()),
            font(),
            EngineOptions::default(),
            0,
        )
    }

    fn sample_on_line(line: usize, x: f64, t: i64) -> AttentionSample {
        AttentionSample::new(x, line as f64 * 20.0 + 10.0, t)
    }

    fn read_active_unit(engine: &mut ReadingEngine, t: &mut i64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let lines = engine.line_states().len();
        for line in 0..lines {
            *t += 100;
            events.extend(engine.process_sample(sample_on_line(line, 310.0, *t)));
        }
        events
    }

    #[test]
    fn test_new_engine_activates_first_unit() {
        let e = engine(3, 2);
        assert_eq!(e.total_units(), 3);
        assert_eq!(e.active_unit_index(), 0);
        assert_eq!(e.line_states().len(), 2);
        assert_eq!(e.active_line_index(), Some(0));
        assert_eq!(e.line_states()[0].bounds.x, 20.0);
        assert_eq!(e.line_states()[0].bounds.width, 300.0);
        assert_eq!(e.active_unit().reading_started_at, Some(0));
        assert!(e.active_unit().lines.is_some());
    }

    #[test]
    fn test_right_edge_scenario() {
        let mut e = engine(1, 2);
        assert!(e.process_sample(sample_on_line(0, 40.0, 10)).is_empty());
        assert!(e.process_sample(sample_on_line(0, 150.0, 20)).is_empty());
        let events = e.process_sample(sample_on_line(0, 290.0, 30));
        assert_eq!(
            events,
            vec![EngineEvent::LineCompleted {
                unit: 0,
                line: 0,
                rule: CompletionRule::RightEdge
            }]
        );
        assert_eq!(e.active_line_index(), Some(1));
        assert_eq!(e.line_states()[1].started_at, Some(30));
    }

    #[test]
    fn test_sweep_scenario() {
        let mut e = engine(1, 2);
        let xs = [25.0, 80.0, 150.0, 210.0, 260.0];
        let mut last = Vec::new();
        for (i, x) in xs.iter().enumerate() {
            last = e.process_sample(sample_on_line(0, *x, i as i64 * 50));
            if i < 4 {
                assert!(last.is_empty(), "completed early at sample {i}");
            }
        }
        assert_matches!(
            last.as_slice(),
            [EngineEvent::LineCompleted { line: 0, rule: CompletionRule::Sweep, .. }]
        );
    }

    #[test]
    fn test_samples_on_other_lines_are_stray() {
        let mut e = engine(1, 2);
        assert!(e.process_sample(sample_on_line(1, 310.0, 10)).is_empty());
        assert_eq!(e.stray_sample_count(), 1);
        assert_eq!(e.recent_stray_samples().count(), 1);
        assert_eq!(e.active_line_index(), Some(0));
        assert!(!e.line_states()[1].is_complete());
    }

    #[test]
    fn test_unit_completion_and_auto_advance() {
        let mut e = engine(2, 2);
        let mut t = 1_000;
        let events = read_active_unit(&mut e, &mut t);

        assert_eq!(events.len(), 4);
        assert_matches!(events[2], EngineEvent::UnitCompleted { unit: 0, duration: Some(d) } if d == Duration::from_millis(1_200));
        assert_eq!(events[3], EngineEvent::UnitActivated { unit: 1 });
        assert!(e.units()[0].is_completed);
        assert!(e.units()[0].lines.is_none());
        assert_eq!(e.active_unit_index(), 1);
        assert_eq!(e.active_unit().reading_started_at, Some(1_200));
    }

    #[test]
    fn test_without_auto_advance_unit_stays() {
        let mut e = engine(2, 1);
        e.options.auto_advance = false;
        let mut t = 0;
        let events = read_active_unit(&mut e, &mut t);
        assert_eq!(events.len(), 2);
        assert_eq!(e.active_unit_index(), 0);
        assert_eq!(e.active_line_index(), None);
        assert_eq!(e.next_unit(t).unwrap(), Some(EngineEvent::UnitActivated { unit: 1 }));
    }

    #[test]
    fn test_document_completion_fires_once() {
        let fired = Rc::new(Cell::new(0));
        let mut e = engine(2, 1);
        let counter = fired.clone();
        e.on_document_complete(move |stats| {
            assert_eq!(stats.completed_units, 2);
            assert_eq!(stats.completion_percentage, 100);
            counter.set(counter.get() + 1);
        });

        let mut t = 0;
        read_active_unit(&mut e, &mut t);
        assert_eq!(fired.get(), 0);
        let events = read_active_unit(&mut e, &mut t);
        assert_matches!(events.last(), Some(EngineEvent::DocumentCompleted(stats)) if stats.total_units == 2);
        assert_eq!(fired.get(), 1);

        // Redundant re-evaluation and further samples change nothing.
        assert_eq!(e.check_document_completion(t + 10), None);
        assert!(e.process_sample(sample_on_line(0, 310.0, t + 20)).is_empty());
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_completion_is_monotonic_when_revisiting() {
        let mut e = engine(2, 2);
        let mut t = 0;
        read_active_unit(&mut e, &mut t);
        assert_eq!(e.previous_unit(t).unwrap(), Some(EngineEvent::UnitActivated { unit: 0 }));

        assert!(e.active_unit().is_completed);
        assert!(e.line_states().iter().all(|l| l.is_complete()));
        assert_eq!(e.active_line_index(), None);
        assert!(e.process_sample(sample_on_line(0, 30.0, t + 1)).is_empty());
        assert!(e.units()[0].is_completed);
    }

    #[test]
    fn test_forward_navigation_is_locked() {
        let mut e = engine(3, 1);
        assert_matches!(
            e.go_to_unit(2, 0),
            Err(EngineError::UnitLocked { index: 2, available: 0 })
        );
        assert_matches!(
            e.next_unit(0),
            Err(EngineError::UnitLocked { index: 1, available: 0 })
        );
        assert_matches!(e.go_to_unit(7, 0), Err(EngineError::UnitOutOfRange { index: 7, total: 3 }));
        assert_eq!(e.go_to_unit(0, 0).unwrap(), None);
        assert_eq!(e.previous_unit(0).unwrap(), None);
    }

    #[test]
    fn test_navigation_discards_line_state() {
        let mut e = engine(2, 2);
        e.options.auto_advance = false;
        let mut t = 0;
        read_active_unit(&mut e, &mut t);
        e.next_unit(t).unwrap();
        e.process_sample(sample_on_line(0, 310.0, t + 1));
        assert_eq!(e.active_line_index(), Some(1));

        e.previous_unit(t + 2).unwrap();
        e.next_unit(t + 3).unwrap();
        // Back on unit 1 with fresh line state.
        assert_eq!(e.active_line_index(), Some(0));
        assert!(e.line_states().iter().all(|l| !l.is_complete()));
    }

    #[test]
    fn test_restore_matching_record() {
        let mut e = engine(10, 1);
        let progress = ReadingProgress {
            document_key: "doc".to_string(),
            current_unit_index: 4,
            completed_unit_indexes: BTreeSet::from([0, 1, 2, 3]),
            total_units: 10,
            last_updated: timestamp_from_millis(0),
        };
        assert!(e.restore(&progress, 5));
        assert_eq!(e.active_unit_index(), 4);
        for i in 0..4 {
            assert!(e.units()[i].is_completed);
        }
        assert!(!e.units()[4].is_completed);
        assert_eq!(e.furthest_available(), 4);
        assert_eq!(e.progress_snapshot(5).completed_unit_indexes, progress.completed_unit_indexes);
    }

    #[test]
    fn test_restore_rejects_other_pagination() {
        let mut e = engine(9, 1);
        let progress = ReadingProgress {
            document_key: "doc".to_string(),
            current_unit_index: 4,
            completed_unit_indexes: BTreeSet::from([0, 1, 2, 3]),
            total_units: 10,
            last_updated: timestamp_from_millis(0),
        };
        assert!(!e.restore(&progress, 5));
        assert_eq!(e.active_unit_index(), 0);
        assert_eq!(e.completed_units(), 0);
    }

    #[test]
    fn test_restore_rejects_out_of_range_indexes() {
        let mut e = engine(3, 1);
        let progress = ReadingProgress {
            document_key: "doc".to_string(),
            current_unit_index: 1,
            completed_unit_indexes: BTreeSet::from([0, 7]),
            total_units: 3,
            last_updated: timestamp_from_millis(0),
        };
        assert!(!e.restore(&progress, 0));
        assert_eq!(e.completed_units(), 0);
    }

    #[test]
    fn test_restore_of_finished_document_does_not_refire() {
        let fired = Rc::new(Cell::new(false));
        let mut e = engine(2, 1);
        let flag = fired.clone();
        e.on_document_complete(move |_| flag.set(true));
        let progress = ReadingProgress {
            document_key: "doc".to_string(),
            current_unit_index: 1,
            completed_unit_indexes: BTreeSet::from([0, 1]),
            total_units: 2,
            last_updated: timestamp_from_millis(0),
        };
        assert!(e.restore(&progress, 0));
        assert_eq!(e.check_document_completion(0), None);
        assert!(!fired.get());
    }

    #[test]
    fn test_without_geometry_samples_are_ignored() {
        let doc = Document::new("doc", "Doc", "one two three");
        let segmenter = Segmenter::with_words_per_unit(SegmentMode::Viewport, 10);
        let mut e = ReadingEngine::new(&doc, &segmenter, None, font(), EngineOptions::default(), 0);
        assert!(e.line_states().is_empty());
        assert!(e.active_unit().lines.is_none());
        assert!(e.process_sample(AttentionSample::new(10.0, 10.0, 1)).is_empty());
        assert_eq!(e.stray_sample_count(), 1);

        e.set_layout(viewport(), font());
        assert_eq!(e.line_states().len(), 1);
        assert_eq!(e.active_line_index(), Some(0));
    }

    #[test]
    fn test_zero_sized_viewport_skips_mapping() {
        let mut e = engine(1, 2);
        e.set_layout(Viewport::new(0.0, 0.0, 0.0, 0.0), font());
        assert!(e.line_states().is_empty());
        assert_eq!(e.active_line_index(), None);
    }

    #[test]
    fn test_relayout_keeps_progress_when_wrapping_is_stable() {
        let mut e = engine(1, 3);
        e.process_sample(sample_on_line(0, 310.0, 10));
        e.set_layout(Viewport::new(0.0, 50.0, 340.0, 400.0), font());
        assert_eq!(e.active_line_index(), Some(1));
        assert!(e.line_states()[0].is_complete());
        assert_eq!(e.line_states()[1].bounds.y, 70.0);
    }

    #[test]
    fn test_relayout_with_new_wrapping_keeps_read_prefix() {
        let doc = Document::new("doc", "Doc", "aaaa bbbb cccc dddd eeee ffff");
        let segmenter = Segmenter::with_words_per_unit(SegmentMode::Viewport, 10);
        // 60px of text room: "aaaa bbbb" per line.
        let narrow = Viewport::new(0.0, 0.0, 100.0, 400.0);
        let mut e = ReadingEngine::new(&doc, &segmenter, Some(narrow), font(), EngineOptions::default(), 0);
        assert_eq!(e.line_states().len(), 3);
        e.process_sample(AttentionSample::new(74.0, 10.0, 1));
        e.process_sample(AttentionSample::new(74.0, 30.0, 2));
        assert_eq!(e.active_line_index(), Some(2));

        // Wider: two lines; one stays read, the other is next.
        e.set_layout(Viewport::new(0.0, 0.0, 140.0, 400.0), font());
        assert_eq!(e.line_states().len(), 2);
        assert!(e.line_states()[0].is_complete());
        assert_eq!(e.active_line_index(), Some(1));
    }

    #[test]
    fn test_low_confidence_samples_dropped() {
        let mut e = engine(1, 1);
        e.options.min_confidence = 0.5;
        let weak = sample_on_line(0, 310.0, 1).with_confidence(0.2);
        assert!(e.process_sample(weak).is_empty());
        assert!(!e.line_states()[0].is_complete());
        let strong = sample_on_line(0, 310.0, 2).with_confidence(0.9);
        assert!(!e.process_sample(strong).is_empty());
    }

    #[test]
    fn test_snapshots() {
        let mut e = engine(4, 1);
        let mut t = 0;
        read_active_unit(&mut e, &mut t);
        let progress = e.progress_snapshot(65_000);
        assert_eq!(progress.current_unit_index, 1);
        assert_eq!(progress.completed_unit_indexes, BTreeSet::from([0]));
        assert_eq!(progress.total_units, 4);

        let session = e.session_snapshot("s-1", 65_000);
        assert_eq!(session.session_id, "s-1");
        assert_eq!(session.completed_units, 1);
        assert_eq!(session.completion_percentage, 25);
        assert_eq!(session.reading_time_seconds, 65);
        assert_eq!(session.total_words, 4);
    }
}
