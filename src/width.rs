/// Average glyph width as a fraction of the font size. Approximates a
/// proportional serif face without shaping.
pub const CHAR_WIDTH_FACTOR: f64 = 0.6;

/// Estimated rendered width of `text` in pixels.
///
/// Counts Unicode scalar values, so a CJK glyph and a Latin letter cost the
/// same. The segmenter and the line mapper must both go through this function
/// so that their ideas of "fits on screen" agree.
pub fn estimate_width(text: &str, font_size_px: f64) -> f64 {
    text.chars().count() as f64 * font_size_px * CHAR_WIDTH_FACTOR
}

/// Width of a single estimated glyph box.
pub fn glyph_width(font_size_px: f64) -> f64 {
    font_size_px * CHAR_WIDTH_FACTOR
}
