use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::attention::AttentionSample;
use crate::config::SimulatorConfig;
use crate::geometry::{FontMetrics, LineBounds};
use crate::width::glyph_width;

/// Stand-in attention producer: moves left to right along whatever line it
/// is given at a steady reading speed, with seeded jitter. The same seed and
/// call sequence always produce the same samples.
#[derive(Debug)]
pub struct SweepSimulator {
    rng: StdRng,
    config: SimulatorConfig,
    px_per_second: f64,
    /// Line being swept and when the sweep started on it.
    current: Option<(usize, f64, i64)>,
}

impl SweepSimulator {
    pub fn new(config: SimulatorConfig, font: &FontMetrics) -> Self {
        let px_per_second = glyph_width(font.font_size) * config.chars_per_second.max(0.0);
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            px_per_second,
            current: None,
        }
    }

    pub fn sample_interval_ms(&self) -> u64 {
        self.config.sample_interval_ms
    }

    /// Next sample for `line` at `now_ms`. Switching to another line restarts
    /// the sweep at its left edge.
    pub fn next_sample(&mut self, line: &LineBounds, now_ms: i64) -> AttentionSample {
        let started = match self.current {
            Some((index, top, started)) if index == line.index && top == line.y => started,
            _ => {
                self.current = Some((line.index, line.y, now_ms));
                now_ms
            }
        };

        let travelled = (now_ms - started).max(0) as f64 * self.px_per_second / 1000.0;
        let x = (line.left() + travelled + self.jitter()).clamp(line.left(), line.right());
        let y = line.top() + line.height / 2.0 + self.jitter();
        let y = y.clamp(line.top(), line.bottom());
        let confidence = self.rng.gen_range(0.7..=1.0);
        AttentionSample::new(x, y, now_ms).with_confidence(confidence)
    }

    /// Forget the current line, e.g. after navigation.
    pub fn reset(&mut self) {
        self.current = None;
    }

    fn jitter(&mut self) -> f64 {
        let j = self.config.jitter_px.abs();
        if j == 0.0 {
            0.0
        } else {
            self.rng.gen_range(-j..=j)
        }
    }
}
