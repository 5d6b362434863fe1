use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;

use crate::app_dirs::AppDirs;
use crate::error::StoreError;
use crate::session::{ReadingProgress, ReadingSession};

pub type StoreResult<T> = Result<T, StoreError>;

/// Upsert-by-key persistence for progress and session records. The latest
/// write for a key wins.
pub trait ProgressStore {
    fn save_progress(&self, progress: &ReadingProgress) -> StoreResult<()>;
    fn load_progress(&self, document_key: &str) -> StoreResult<Option<ReadingProgress>>;
    fn delete_progress(&self, document_key: &str) -> StoreResult<bool>;
    fn save_session(&self, session: &ReadingSession) -> StoreResult<()>;
    /// Newest first, optionally limited to one document.
    fn load_sessions(&self, document_key: Option<&str>) -> StoreResult<Vec<ReadingSession>>;
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS reading_progress (
        document_key TEXT PRIMARY KEY,
        current_unit_index INTEGER NOT NULL,
        completed_unit_indexes TEXT NOT NULL,
        total_units INTEGER NOT NULL,
        last_updated TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS reading_sessions (
        session_id TEXT PRIMARY KEY,
        document_key TEXT NOT NULL,
        total_units INTEGER NOT NULL,
        completed_units INTEGER NOT NULL,
        total_words INTEGER NOT NULL,
        reading_time_seconds INTEGER NOT NULL,
        completion_percentage INTEGER NOT NULL,
        captured_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_reading_sessions_document
        ON reading_sessions(document_key);
"#;

/// SQLite-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens the store at the default state location.
    pub fn open_default() -> StoreResult<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| "lectern.db".into());
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            log::warn!("failed to enable WAL mode: {err}");
        }
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

fn to_i64(value: usize, column: &'static str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange {
        column,
        value: i64::MAX,
    })
}

fn to_usize(value: i64, column: &'static str) -> StoreResult<usize> {
    usize::try_from(value).map_err(|_| StoreError::OutOfRange { column, value })
}

fn format_datetime(value: &DateTime<Utc>) -> String {
    // Fixed width so text ordering matches time ordering.
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(value: String, column: &'static str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp { column, value })
}

fn row_to_progress(row: &Row) -> StoreResult<ReadingProgress> {
    let completed: String = row.get("completed_unit_indexes")?;
    let completed_unit_indexes: BTreeSet<usize> = serde_json::from_str(&completed)?;
    Ok(ReadingProgress {
        document_key: row.get("document_key")?,
        current_unit_index: to_usize(row.get("current_unit_index")?, "current_unit_index")?,
        completed_unit_indexes,
        total_units: to_usize(row.get("total_units")?, "total_units")?,
        last_updated: parse_datetime(row.get("last_updated")?, "last_updated")?,
    })
}

fn row_to_session(row: &Row) -> StoreResult<ReadingSession> {
    let percentage: i64 = row.get("completion_percentage")?;
    let reading_time: i64 = row.get("reading_time_seconds")?;
    Ok(ReadingSession {
        session_id: row.get("session_id")?,
        document_key: row.get("document_key")?,
        total_units: to_usize(row.get("total_units")?, "total_units")?,
        completed_units: to_usize(row.get("completed_units")?, "completed_units")?,
        total_words: to_usize(row.get("total_words")?, "total_words")?,
        reading_time_seconds: u64::try_from(reading_time).map_err(|_| StoreError::OutOfRange {
            column: "reading_time_seconds",
            value: reading_time,
        })?,
        completion_percentage: u8::try_from(percentage).map_err(|_| StoreError::OutOfRange {
            column: "completion_percentage",
            value: percentage,
        })?,
        captured_at: parse_datetime(row.get("captured_at")?, "captured_at")?,
    })
}

impl ProgressStore for SqliteStore {
    fn save_progress(&self, progress: &ReadingProgress) -> StoreResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO reading_progress
            (document_key, current_unit_index, completed_unit_indexes, total_units, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(document_key) DO UPDATE SET
                current_unit_index = excluded.current_unit_index,
                completed_unit_indexes = excluded.completed_unit_indexes,
                total_units = excluded.total_units,
                last_updated = excluded.last_updated
            "#,
            params![
                progress.document_key,
                to_i64(progress.current_unit_index, "current_unit_index")?,
                serde_json::to_string(&progress.completed_unit_indexes)?,
                to_i64(progress.total_units, "total_units")?,
                format_datetime(&progress.last_updated),
            ],
        )?;
        Ok(())
    }

    fn load_progress(&self, document_key: &str) -> StoreResult<Option<ReadingProgress>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT document_key, current_unit_index, completed_unit_indexes, total_units, last_updated
            FROM reading_progress
            WHERE document_key = ?1
            "#,
        )?;
        let mut rows = stmt.query(params![document_key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_progress(row)?)),
            None => Ok(None),
        }
    }

    fn delete_progress(&self, document_key: &str) -> StoreResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM reading_progress WHERE document_key = ?1",
            params![document_key],
        )?;
        Ok(deleted > 0)
    }

    fn save_session(&self, session: &ReadingSession) -> StoreResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO reading_sessions
            (session_id, document_key, total_units, completed_units, total_words,
             reading_time_seconds, completion_percentage, captured_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(session_id) DO UPDATE SET
                document_key = excluded.document_key,
                total_units = excluded.total_units,
                completed_units = excluded.completed_units,
                total_words = excluded.total_words,
                reading_time_seconds = excluded.reading_time_seconds,
                completion_percentage = excluded.completion_percentage,
                captured_at = excluded.captured_at
            "#,
            params![
                session.session_id,
                session.document_key,
                to_i64(session.total_units, "total_units")?,
                to_i64(session.completed_units, "completed_units")?,
                to_i64(session.total_words, "total_words")?,
                i64::try_from(session.reading_time_seconds).unwrap_or(i64::MAX),
                i64::from(session.completion_percentage),
                format_datetime(&session.captured_at),
            ],
        )?;
        Ok(())
    }

    fn load_sessions(&self, document_key: Option<&str>) -> StoreResult<Vec<ReadingSession>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT session_id, document_key, total_units, completed_units, total_words,
                   reading_time_seconds, completion_percentage, captured_at
            FROM reading_sessions
            WHERE ?1 IS NULL OR document_key = ?1
            ORDER BY captured_at DESC
            "#,
        )?;
        let mut rows = stmt.query(params![document_key])?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(row_to_session(row)?);
        }
        Ok(sessions)
    }
}

impl SqliteStore {
    /// Number of stored progress rows for a key. Used to check upsert behavior.
    pub fn progress_row_count(&self, document_key: &str) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reading_progress WHERE document_key = ?1",
            params![document_key],
            |row| row.get(0),
        )?;
        to_usize(count, "count")
    }

    pub fn session_row_count(&self, session_id: &str) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reading_sessions WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        to_usize(count, "count")
    }
}

/// In-process store, for tests and for running without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    progress: Mutex<HashMap<String, ReadingProgress>>,
    sessions: Mutex<HashMap<String, ReadingSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_len(&self) -> usize {
        self.progress.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn session_len(&self) -> usize {
        self.sessions.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl ProgressStore for MemoryStore {
    fn save_progress(&self, progress: &ReadingProgress) -> StoreResult<()> {
        let mut map = self.progress.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(progress.document_key.clone(), progress.clone());
        Ok(())
    }

    fn load_progress(&self, document_key: &str) -> StoreResult<Option<ReadingProgress>> {
        let map = self.progress.lock().unwrap_or_else(|p| p.into_inner());
        Ok(map.get(document_key).cloned())
    }

    fn delete_progress(&self, document_key: &str) -> StoreResult<bool> {
        let mut map = self.progress.lock().unwrap_or_else(|p| p.into_inner());
        Ok(map.remove(document_key).is_some())
    }

    fn save_session(&self, session: &ReadingSession) -> StoreResult<()> {
        let mut map = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn load_sessions(&self, document_key: Option<&str>) -> StoreResult<Vec<ReadingSession>> {
        let map = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        let mut sessions: Vec<ReadingSession> = map
            .values()
            .filter(|s| document_key.map_or(true, |key| s.document_key == key))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        Ok(sessions)
    }
}

impl<S: ProgressStore + ?Sized> ProgressStore for Box<S> {
    fn save_progress(&self, progress: &ReadingProgress) -> StoreResult<()> {
        (**self).save_progress(progress)
    }

    fn load_progress(&self, document_key: &str) -> StoreResult<Option<ReadingProgress>> {
        (**self).load_progress(document_key)
    }

    fn delete_progress(&self, document_key: &str) -> StoreResult<bool> {
        (**self).delete_progress(document_key)
    }

    fn save_session(&self, session: &ReadingSession) -> StoreResult<()> {
        (**self).save_session(session)
    }

    fn load_sessions(&self, document_key: Option<&str>) -> StoreResult<Vec<ReadingSession>> {
        (**self).load_sessions(document_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::timestamp_from_millis;
    use tempfile::tempdir;

    fn progress(current: usize, completed: &[usize], at: i64) -> ReadingProgress {
        ReadingProgress {
            document_key: "book.txt".to_string(),
            current_unit_index: current,
            completed_unit_indexes: completed.iter().copied().collect(),
            total_units: 10,
            last_updated: timestamp_from_millis(at),
        }
    }

    fn session(id: &str, completed: usize, secs: u64, at: i64) -> ReadingSession {
        ReadingSession {
            session_id: id.to_string(),
            document_key: "book.txt".to_string(),
            total_units: 10,
            completed_units: completed,
            total_words: 500,
            reading_time_seconds: secs,
            completion_percentage: (completed * 10) as u8,
            captured_at: timestamp_from_millis(at),
        }
    }

    #[test]
    fn test_progress_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let p = progress(4, &[0, 1, 2, 3], 1_700_000_000_000);
        store.save_progress(&p).unwrap();
        assert_eq!(store.load_progress("book.txt").unwrap(), Some(p));
        assert_eq!(store.load_progress("other.txt").unwrap(), None);
    }

    #[test]
    fn test_progress_upsert_keeps_one_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_progress(&progress(1, &[0], 1_000)).unwrap();
        store.save_progress(&progress(2, &[0, 1], 2_000)).unwrap();

        assert_eq!(store.progress_row_count("book.txt").unwrap(), 1);
        let loaded = store.load_progress("book.txt").unwrap().unwrap();
        assert_eq!(loaded.current_unit_index, 2);
        assert_eq!(loaded.completed_unit_indexes.len(), 2);
    }

    #[test]
    fn test_session_upsert_replaces_totals() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 1..=5u64 {
            store
                .save_session(&session("s-1", i as usize, i * 60, i as i64 * 60_000))
                .unwrap();
        }
        assert_eq!(store.session_row_count("s-1").unwrap(), 1);
        let sessions = store.load_sessions(Some("book.txt")).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].completed_units, 5);
        assert_eq!(sessions[0].reading_time_seconds, 300);
    }

    #[test]
    fn test_sessions_newest_first_and_filtered() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_session(&session("old", 1, 10, 1_000)).unwrap();
        store.save_session(&session("new", 2, 20, 9_000)).unwrap();
        let mut other = session("elsewhere", 1, 5, 5_000);
        other.document_key = "other.txt".to_string();
        store.save_session(&other).unwrap();

        let all = store.load_sessions(None).unwrap();
        assert_eq!(
            all.iter().map(|s| s.session_id.as_str()).collect::<Vec<_>>(),
            vec!["new", "elsewhere", "old"]
        );
        assert_eq!(store.load_sessions(Some("book.txt")).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_progress() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_progress(&progress(1, &[0], 1_000)).unwrap();
        assert!(store.delete_progress("book.txt").unwrap());
        assert!(!store.delete_progress("book.txt").unwrap());
        assert_eq!(store.load_progress("book.txt").unwrap(), None);
    }

    #[test]
    fn test_on_disk_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("lectern.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_progress(&progress(3, &[0, 1, 2], 1_000)).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.load_progress("book.txt").unwrap().unwrap();
        assert_eq!(loaded.current_unit_index, 3);
    }

    #[test]
    fn test_corrupt_completed_indexes_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO reading_progress VALUES ('bad', 0, 'nope', 1, '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        assert!(matches!(store.load_progress("bad"), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_memory_store_upserts() {
        let store = MemoryStore::new();
        store.save_progress(&progress(1, &[0], 1_000)).unwrap();
        store.save_progress(&progress(2, &[0, 1], 2_000)).unwrap();
        store.save_session(&session("s", 1, 10, 1_000)).unwrap();
        store.save_session(&session("s", 2, 20, 2_000)).unwrap();

        assert_eq!(store.progress_len(), 1);
        assert_eq!(store.session_len(), 1);
        assert_eq!(store.load_sessions(None).unwrap()[0].completed_units, 2);
        assert_eq!(
            store.load_progress("book.txt").unwrap().unwrap().current_unit_index,
            2
        );
    }
}
