//! Plain-text and CSV renderings for the non-interactive subcommands.

use chrono::Local;
use std::fmt::Write as _;
use std::io;

use crate::session::{ReadingSession, ReadingUnit};

/// Writes sessions as CSV with a header row.
pub fn write_sessions_csv<W: io::Write>(writer: W, sessions: &[ReadingSession]) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for session in sessions {
        out.serialize(session)?;
    }
    out.flush()?;
    Ok(())
}

pub fn format_sessions(sessions: &[ReadingSession]) -> String {
    if sessions.is_empty() {
        return "no reading sessions recorded\n".to_string();
    }
    let mut out = String::new();
    for s in sessions {
        let _ = writeln!(
            out,
            "{}  {:>3}%  {:>3}/{:<3} units  {:>6} words  {:>5}s  {}",
            s.captured_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            s.completion_percentage,
            s.completed_units,
            s.total_units,
            s.total_words,
            s.reading_time_seconds,
            s.document_key
        );
    }
    out
}

pub fn format_units(units: &[ReadingUnit]) -> String {
    let mut out = String::new();
    for unit in units {
        let _ = writeln!(out, "#{} ({} words)", unit.id, unit.word_count);
        let _ = writeln!(out, "{}\n", unit.text.trim());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::timestamp_from_millis;

    fn session(id: &str, completed: usize) -> ReadingSession {
        ReadingSession {
            session_id: id.to_string(),
            document_key: "/books/dune.txt".to_string(),
            total_units: 4,
            completed_units: completed,
            total_words: 200,
            reading_time_seconds: 95,
            completion_percentage: (completed * 25) as u8,
            captured_at: timestamp_from_millis(1_700_000_000_000),
        }
    }

    #[test]
    fn csv_has_header_and_rows() {
        let mut buf = Vec::new();
        write_sessions_csv(&mut buf, &[session("a", 1), session("b", 4)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("session_id,document_key,total_units,completed_units,total_words,reading_time_seconds,completion_percentage,captured_at")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("a,/books/dune.txt,4,1,200,95,25,2023-11-14T22:13:20"));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn table_lists_each_session() {
        let out = format_sessions(&[session("a", 2)]);
        assert!(out.contains(" 50%"));
        assert!(out.contains("2/4"));
        assert!(out.contains("/books/dune.txt"));
        assert_eq!(format_sessions(&[]), "no reading sessions recorded\n");
    }

    #[test]
    fn units_are_numbered() {
        let units = vec![
            ReadingUnit::new(0, "First unit here.".to_string()),
            ReadingUnit::new(1, "Second.".to_string()),
        ];
        let out = format_units(&units);
        assert!(out.starts_with("#0 (3 words)\nFirst unit here.\n\n#1 (1 words)"));
    }
}
