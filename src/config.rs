use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::completion_policy::CompletionThresholds;
use crate::engine::EngineOptions;
use crate::geometry::FontMetrics;
use crate::persistence::PersistenceConfig;
use crate::segmenter::SegmentMode;

/// Settings for the built-in attention simulator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    pub seed: u64,
    /// Reading speed along a line.
    pub chars_per_second: f64,
    /// Maximum random offset applied to each sample, in pixels.
    pub jitter_px: f64,
    pub sample_interval_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            chars_per_second: 20.0,
            jitter_px: 2.0,
            sample_interval_ms: 50,
        }
    }
}

/// Page size used when segmenting outside a live viewport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl Default for PageSize {
    fn default() -> Self {
        Self {
            width: 720.0,
            height: 560.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub font: FontMetrics,
    pub page: PageSize,
    pub segment_mode: SegmentMode,
    pub auto_advance: bool,
    pub min_confidence: f64,
    pub thresholds: CompletionThresholds,
    pub persistence: PersistenceConfig,
    pub simulator: SimulatorConfig,
    pub tick_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            font: FontMetrics::default(),
            page: PageSize::default(),
            segment_mode: SegmentMode::default(),
            auto_advance: true,
            min_confidence: 0.0,
            thresholds: CompletionThresholds::default(),
            persistence: PersistenceConfig::default(),
            simulator: SimulatorConfig::default(),
            tick_ms: 100,
        }
    }
}

impl Config {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            thresholds: self.thresholds,
            auto_advance: self.auto_advance,
            min_confidence: self.min_confidence,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("lectern_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or unreadable files fall back to defaults; unknown keys are ignored.
    fn load(&self) -> Config {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Config::default(),
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("ignoring malformed config {}: {err}", self.path.display());
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
