use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::geometry::{FontMetrics, Viewport};
use crate::session::ReadingUnit;
use crate::width::estimate_width;

/// Share of the estimated viewport capacity a unit is filled to. Leaves a
/// margin for estimation error.
pub const FILL_RATIO: f64 = 0.9;
/// Lower edge of the preferred size band for rebalanced units.
pub const MIN_UNIT_WORDS: usize = 45;
/// Hard ceiling for rebalanced units.
pub const MAX_UNIT_WORDS: usize = 55;
/// Stand-in for an average word when estimating capacity: five glyphs and a separator.
const AVERAGE_WORD: &str = "xxxxx ";
/// Text of the single unit emitted for an empty document.
pub const PLACEHOLDER_TEXT: &str = " ";

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SegmentMode {
    /// Paginate the whole document into viewport-sized units.
    #[default]
    Viewport,
    /// Keep blank-line separated paragraphs, splitting long ones on sentences.
    Paragraphs,
}

/// How many average words fit in one viewport, or None without usable geometry.
pub fn words_per_viewport(viewport: &Viewport, font: &FontMetrics) -> Option<usize> {
    if !viewport.is_usable() || font.font_size <= 0.0 || font.line_height <= 0.0 {
        return None;
    }
    let word_width = estimate_width(AVERAGE_WORD, font.font_size);
    let words_per_line = (font.available_width(viewport) / word_width).floor();
    let lines = (font.available_height(viewport) / font.line_height).floor();
    let capacity = (words_per_line * lines) as usize;
    (capacity > 0).then_some(capacity)
}

/// Word count at which the viewport-fill pass closes a unit.
pub fn fill_target(capacity: usize) -> usize {
    ((capacity as f64 * FILL_RATIO).ceil() as usize).max(1)
}

/// Splits documents into reading units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    mode: SegmentMode,
    words_per_unit: usize,
}

impl Segmenter {
    pub fn new(mode: SegmentMode, viewport: &Viewport, font: &FontMetrics) -> Self {
        let words_per_unit = match words_per_viewport(viewport, font) {
            Some(capacity) => fill_target(capacity),
            None => {
                log::debug!("no usable viewport for segmentation, falling back to {MAX_UNIT_WORDS} words per unit");
                MAX_UNIT_WORDS
            }
        };
        Self::with_words_per_unit(mode, words_per_unit)
    }

    pub fn with_words_per_unit(mode: SegmentMode, words_per_unit: usize) -> Self {
        Self {
            mode,
            words_per_unit: words_per_unit.max(1),
        }
    }

    pub fn mode(&self) -> SegmentMode {
        self.mode
    }

    pub fn words_per_unit(&self) -> usize {
        self.words_per_unit
    }

    /// Ordered units with ids from 0. Never empty.
    pub fn segment(&self, text: &str) -> Vec<ReadingUnit> {
        let chunks = match self.mode {
            SegmentMode::Viewport => self.fill_viewports(text),
            SegmentMode::Paragraphs => paragraphs(text),
        };

        let mut units: Vec<ReadingUnit> = chunks
            .into_iter()
            .enumerate()
            .map(|(id, text)| ReadingUnit::new(id, text))
            .collect();

        if units.is_empty() {
            units.push(ReadingUnit::new(0, PLACEHOLDER_TEXT.to_string()));
        }
        units
    }

    fn fill_viewports(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        words
            .chunks(self.words_per_unit)
            .map(|chunk| chunk.join(" "))
            .collect()
    }
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let grouped = text.lines().chunk_by(|line| line.trim().is_empty());
    for (blank, lines) in &grouped {
        if blank {
            continue;
        }
        let words: Vec<&str> = lines.flat_map(str::split_whitespace).collect();
        out.extend(rebalance(&words));
    }
    out
}

/// True when the word closes a sentence: a terminator followed by whitespace or end of text.
pub fn ends_sentence(word: &str) -> bool {
    word.ends_with('.') || word.ends_with('。')
}

/// Splits a word run into units of at most [`MAX_UNIT_WORDS`], ending on a
/// sentence whenever one ends within reach.
pub fn rebalance(words: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = words;
    while rest.len() > MAX_UNIT_WORDS {
        let cut = split_point(rest);
        out.push(rest[..cut].join(" "));
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        out.push(rest.join(" "));
    }
    out
}

fn split_point(words: &[&str]) -> usize {
    let window = &words[..MAX_UNIT_WORDS.min(words.len())];

    let mut in_band = None;
    let mut last_boundary = None;
    for (count, _) in window
        .iter()
        .enumerate()
        .map(|(i, w)| (i + 1, w))
        .filter(|(_, w)| ends_sentence(w))
    {
        if count >= MIN_UNIT_WORDS {
            in_band = Some(count);
        }
        last_boundary = Some(count);
    }

    if let Some(count) = in_band {
        return count;
    }
    // Nothing in the band: force the split at the ceiling, backing up to the
    // nearest earlier sentence end when there is one.
    match last_boundary {
        Some(count) => {
            log::trace!("no sentence end in band, backing up to word {count}");
            count
        }
        None => window.len(),
    }
}
