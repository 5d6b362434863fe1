use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Screen rectangle the reader is looking at, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A viewport with no area (or NaN measurements) cannot host lines.
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Typography the width estimate is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontMetrics {
    pub font_size: f64,
    pub line_height: f64,
    pub padding: f64,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            font_size: 18.0,
            line_height: 28.0,
            padding: 24.0,
        }
    }
}

impl FontMetrics {
    /// Horizontal room left for text once padding is taken on both sides.
    pub fn available_width(&self, viewport: &Viewport) -> f64 {
        (viewport.width - 2.0 * self.padding).max(0.0)
    }

    /// Vertical room left for text once padding is taken top and bottom.
    pub fn available_height(&self, viewport: &Viewport) -> f64 {
        (viewport.height - 2.0 * self.padding).max(0.0)
    }
}

/// Estimated rectangle of one wrapped line of a reading unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LineBounds {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
    /// Byte span of `text` inside the unit's text.
    pub char_range: Range<usize>,
}

impl LineBounds {
    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left() && x <= self.right() && y >= self.top() && y <= self.bottom()
    }
}
