use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind, MouseEventKind};

use crate::attention::AttentionSample;

/// Unified event type consumed by the reader loop
#[derive(Clone, Debug, PartialEq)]
pub enum ReaderEvent {
    Key(KeyEvent),
    /// Pointer position in terminal cells.
    Pointer { column: u16, row: u16 },
    /// An attention sample already in viewport pixels.
    Sample(AttentionSample),
    Resize(u16, u16),
    Tick,
}

/// Source of reader events (keyboard, pointer, samples, resize)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError>;
}

/// Production event source using crossterm. Mouse capture must be enabled
/// on the terminal for pointer events to arrive.
pub struct CrosstermEventSource {
    rx: Receiver<ReaderEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    Some(ReaderEvent::Key(key))
                }
                Ok(CtEvent::Mouse(mouse)) => match mouse.kind {
                    MouseEventKind::Moved | MouseEventKind::Drag(_) => Some(ReaderEvent::Pointer {
                        column: mouse.column,
                        row: mouse.row,
                    }),
                    _ => None,
                },
                Ok(CtEvent::Resize(w, h)) => Some(ReaderEvent::Resize(w, h)),
                Ok(_) => None,
                Err(err) => {
                    log::error!("terminal event stream failed: {err}");
                    break;
                }
            };
            if let Some(ev) = forwarded {
                if tx.send(ev).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-backed event source for tests and scripted sample feeds
pub struct TestEventSource {
    rx: Receiver<ReaderEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<ReaderEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Serializes every input into one stream: callers handle a single event at a time.
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> ReaderEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                ReaderEvent::Tick
            }
        }
    }
}
