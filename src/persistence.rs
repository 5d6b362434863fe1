use serde::{Deserialize, Serialize};

use crate::engine::{EngineEvent, ReadingEngine};
use crate::store::ProgressStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Quiet period after a unit change before progress is written.
    pub progress_debounce_ms: u64,
    /// Minimum gap between periodic session saves.
    pub session_interval_secs: u64,
    /// Reading time after which a session is worth saving with nothing completed.
    pub min_reading_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            progress_debounce_ms: 2_000,
            session_interval_secs: 60,
            min_reading_secs: 60,
        }
    }
}

/// Decides when progress and session records are written for one viewer lifetime.
///
/// Store failures are logged and swallowed; the next save carries the latest
/// state anyway.
#[derive(Debug)]
pub struct PersistencePolicy<S: ProgressStore> {
    store: S,
    config: PersistenceConfig,
    session_id: String,
    progress_due_at: Option<i64>,
    last_session_save_at: i64,
    last_saved_completed: usize,
    torn_down: bool,
}

impl<S: ProgressStore> PersistencePolicy<S> {
    /// Starts a policy with a fresh session id.
    pub fn new(store: S, config: PersistenceConfig, now_ms: i64) -> Self {
        Self::with_session_id(store, config, uuid::Uuid::new_v4().to_string(), now_ms)
    }

    pub fn with_session_id(store: S, config: PersistenceConfig, session_id: String, now_ms: i64) -> Self {
        Self {
            store,
            config,
            session_id,
            progress_due_at: None,
            last_session_save_at: now_ms,
            last_saved_completed: 0,
            torn_down: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn has_pending_progress(&self) -> bool {
        self.progress_due_at.is_some()
    }

    /// Restores the stored position into a freshly loaded engine. Returns
    /// whether anything was applied.
    pub fn resume(&mut self, engine: &mut ReadingEngine, now_ms: i64) -> bool {
        let stored = match self.store.load_progress(engine.document_key()) {
            Ok(Some(progress)) => progress,
            Ok(None) => return false,
            Err(err) => {
                log::warn!(
                    "could not load progress for '{}', starting fresh: {err}",
                    engine.document_key()
                );
                return false;
            }
        };
        let applied = engine.restore(&stored, now_ms);
        if applied {
            // Units restored as read don't count as read in this session.
            self.last_saved_completed = engine.completed_units();
        }
        applied
    }

    pub fn on_events(&mut self, events: &[EngineEvent], engine: &ReadingEngine, now_ms: i64) {
        for event in events {
            self.on_event(event, engine, now_ms);
        }
    }

    pub fn on_event(&mut self, event: &EngineEvent, engine: &ReadingEngine, now_ms: i64) {
        if self.torn_down {
            return;
        }
        match event {
            EngineEvent::UnitActivated { .. } => self.schedule_progress(now_ms),
            EngineEvent::UnitCompleted { .. } => self.save_session_if_due(engine, now_ms),
            EngineEvent::DocumentCompleted(_) => {
                self.progress_due_at = None;
                self.save_progress(engine, now_ms);
                self.save_session(engine, now_ms);
            }
            EngineEvent::LineCompleted { .. } => {}
        }
    }

    /// Restarts the debounce window for a progress save.
    pub fn schedule_progress(&mut self, now_ms: i64) {
        if self.torn_down {
            return;
        }
        self.progress_due_at = Some(now_ms + self.config.progress_debounce_ms as i64);
    }

    /// Periodic check, driven by the event loop's ticker.
    pub fn tick(&mut self, engine: &ReadingEngine, now_ms: i64) {
        if self.torn_down {
            return;
        }
        if self.progress_due_at.is_some_and(|due| now_ms >= due) {
            self.progress_due_at = None;
            self.save_progress(engine, now_ms);
        }
        self.save_session_if_due(engine, now_ms);
    }

    /// Final flush when the viewer goes away. Later calls are no-ops.
    pub fn teardown(&mut self, engine: &ReadingEngine, now_ms: i64) {
        if self.torn_down {
            return;
        }
        self.progress_due_at = None;
        self.save_progress(engine, now_ms);
        if engine.completed_units() > 0
            || engine.elapsed_seconds(now_ms) >= self.config.min_reading_secs
        {
            self.save_session(engine, now_ms);
        }
        self.torn_down = true;
    }

    fn save_session_if_due(&mut self, engine: &ReadingEngine, now_ms: i64) {
        let completed = engine.completed_units();
        if completed > self.last_saved_completed {
            self.save_session(engine, now_ms);
            return;
        }
        let since_last = now_ms.saturating_sub(self.last_session_save_at);
        let interval = (self.config.session_interval_secs * 1000) as i64;
        let worth_saving =
            completed > 0 || engine.elapsed_seconds(now_ms) >= self.config.min_reading_secs;
        if since_last >= interval && worth_saving {
            self.save_session(engine, now_ms);
        }
    }

    fn save_progress(&mut self, engine: &ReadingEngine, now_ms: i64) {
        let progress = engine.progress_snapshot(now_ms);
        match self.store.save_progress(&progress) {
            Ok(()) => log::debug!(
                "saved progress for '{}' at unit {}",
                progress.document_key,
                progress.current_unit_index
            ),
            Err(err) => log::warn!(
                "failed to save progress for '{}': {err}",
                progress.document_key
            ),
        }
    }

    fn save_session(&mut self, engine: &ReadingEngine, now_ms: i64) {
        let session = engine.session_snapshot(&self.session_id, now_ms);
        match self.store.save_session(&session) {
            Ok(()) => {
                log::debug!(
                    "saved session {} ({} of {} units)",
                    session.session_id,
                    session.completed_units,
                    session.total_units
                );
                self.last_session_save_at = now_ms;
                self.last_saved_completed = session.completed_units;
            }
            Err(err) => log::warn!("failed to save session {}: {err}", session.session_id),
        }
    }
}
