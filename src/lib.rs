// Library surface for the reader binary, headless integration tests and reuse.
// Terminal specifics stay in main.rs; ui only knows how to draw an engine.
pub mod app_dirs;
pub mod attention;
pub mod completion_policy;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod line_mapper;
pub mod persistence;
pub mod report;
pub mod runtime;
pub mod segmenter;
pub mod session;
pub mod simulator;
pub mod store;
pub mod ui;
pub mod width;
pub mod writer;

pub use engine::{EngineEvent, EngineOptions, ReadingEngine};
pub use error::{EngineError, StoreError};
pub use session::{Document, ReadingProgress, ReadingSession, ReadingUnit};
