use itertools::Itertools;

use crate::geometry::{FontMetrics, LineBounds, Viewport};
use crate::width::estimate_width;

/// Default horizontal progress past which a line counts as swept.
pub const RIGHT_EDGE_THRESHOLD: f64 = 0.9;

/// Greedy word wrap of `text` into line boxes stacked from the viewport origin.
///
/// Returns no lines when the viewport has no usable area. A word wider than
/// the available width is placed on a line of its own rather than broken.
pub fn map_to_lines(text: &str, viewport: &Viewport, font: &FontMetrics) -> Vec<LineBounds> {
    if !viewport.is_usable() {
        return Vec::new();
    }
    let available = font.available_width(viewport);
    let space = estimate_width(" ", font.font_size);

    let mut spans: Vec<(usize, usize, f64)> = Vec::new();
    let mut current: Option<(usize, usize, f64)> = None;

    for (start, word) in word_offsets(text) {
        let end = start + word.len();
        let word_width = estimate_width(word, font.font_size);
        current = match current {
            Some((line_start, _, line_width)) if line_width + space + word_width <= available => {
                Some((line_start, end, line_width + space + word_width))
            }
            Some(line) => {
                spans.push(line);
                Some((start, end, word_width))
            }
            None => Some((start, end, word_width)),
        };
    }
    spans.extend(current);

    spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end, estimated))| LineBounds {
            index,
            x: viewport.x + font.padding,
            y: viewport.y + index as f64 * font.line_height,
            width: estimated.min(available),
            height: font.line_height,
            text: text[start..end].split_whitespace().join(" "),
            char_range: start..end,
        })
        .collect()
}

/// Byte offset and slice of every whitespace-separated word.
fn word_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_whitespace()
        .map(move |word| (word.as_ptr() as usize - text.as_ptr() as usize, word))
}

/// The line whose box contains the point. Lines never overlap vertically, so
/// at most one matches.
pub fn map_point_to_line(x: f64, y: f64, lines: &[LineBounds]) -> Option<&LineBounds> {
    lines.iter().find(|line| line.contains(x, y))
}

/// Fraction of the line's width left of `x`, clamped to `[0, 1]`.
pub fn horizontal_progress(x: f64, line: &LineBounds) -> f64 {
    if line.width <= 0.0 {
        return 0.0;
    }
    ((x - line.left()) / line.width).clamp(0.0, 1.0)
}

pub fn has_passed_right_edge(x: f64, line: &LineBounds, threshold: f64) -> bool {
    horizontal_progress(x, line) >= threshold
}
