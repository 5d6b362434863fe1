use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crate::error::StoreError;
use crate::session::{ReadingProgress, ReadingSession};
use crate::store::{ProgressStore, StoreResult};

enum Command {
    SaveProgress(ReadingProgress),
    SaveSession(ReadingSession),
    LoadProgress(String, Sender<StoreResult<Option<ReadingProgress>>>),
    DeleteProgress(String, Sender<StoreResult<bool>>),
    LoadSessions(Option<String>, Sender<StoreResult<Vec<ReadingSession>>>),
    Flush(Sender<()>),
    Shutdown,
}

/// Runs a store on its own thread so saves never block the reading loop.
///
/// Saves are queued and return at once; a failed save is logged on the
/// worker and otherwise dropped. Loads wait for their answer. Commands are
/// applied in the order they were sent.
pub struct BackgroundWriter {
    sender: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundWriter {
    pub fn spawn<S>(store: S) -> std::io::Result<Self>
    where
        S: ProgressStore + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Command>();
        let worker = thread::Builder::new()
            .name("lectern-store".into())
            .spawn(move || {
                while let Ok(command) = receiver.recv() {
                    match command {
                        Command::SaveProgress(progress) => {
                            if let Err(err) = store.save_progress(&progress) {
                                log::warn!(
                                    "failed to save progress for '{}': {err}",
                                    progress.document_key
                                );
                            }
                        }
                        Command::SaveSession(session) => {
                            if let Err(err) = store.save_session(&session) {
                                log::warn!("failed to save session {}: {err}", session.session_id);
                            }
                        }
                        Command::LoadProgress(key, reply) => {
                            let _ = reply.send(store.load_progress(&key));
                        }
                        Command::DeleteProgress(key, reply) => {
                            let _ = reply.send(store.delete_progress(&key));
                        }
                        Command::LoadSessions(key, reply) => {
                            let _ = reply.send(store.load_sessions(key.as_deref()));
                        }
                        Command::Flush(reply) => {
                            let _ = reply.send(());
                        }
                        Command::Shutdown => break,
                    }
                }
                log::debug!("store worker shutting down");
            })?;

        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn send(&self, command: Command) -> StoreResult<()> {
        self.sender
            .send(command)
            .map_err(|_| StoreError::WorkerUnavailable)
    }

    fn request<T>(&self, build: impl FnOnce(Sender<StoreResult<T>>) -> Command) -> StoreResult<T> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(build(reply_tx))?;
        reply_rx.recv().map_err(|_| StoreError::WorkerUnavailable)?
    }

    /// Blocks until every queued command has been applied.
    pub fn flush(&self) -> StoreResult<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::Flush(reply_tx))?;
        reply_rx.recv().map_err(|_| StoreError::WorkerUnavailable)
    }
}

impl ProgressStore for BackgroundWriter {
    fn save_progress(&self, progress: &ReadingProgress) -> StoreResult<()> {
        self.send(Command::SaveProgress(progress.clone()))
    }

    fn load_progress(&self, document_key: &str) -> StoreResult<Option<ReadingProgress>> {
        self.request(|reply| Command::LoadProgress(document_key.to_string(), reply))
    }

    fn delete_progress(&self, document_key: &str) -> StoreResult<bool> {
        self.request(|reply| Command::DeleteProgress(document_key.to_string(), reply))
    }

    fn save_session(&self, session: &ReadingSession) -> StoreResult<()> {
        self.send(Command::SaveSession(session.clone()))
    }

    fn load_sessions(&self, document_key: Option<&str>) -> StoreResult<Vec<ReadingSession>> {
        self.request(|reply| Command::LoadSessions(document_key.map(str::to_string), reply))
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = guard.take() {
            if self.sender.send(Command::Shutdown).is_err() {
                log::error!("store worker already gone at shutdown");
            }
            if let Err(err) = handle.join() {
                log::error!("failed to join store worker: {err:?}");
            }
        }
    }
}
