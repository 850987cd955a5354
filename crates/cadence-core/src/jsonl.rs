//! JSONL (JSON Lines) read/write support.
//!
//! Each line in a JSONL file is a complete JSON object representing one
//! record (a task, a push registration, an engagement profile, ...).

use std::io::{self, BufRead, Write};
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// Result alias for JSONL operations.
pub type Result<T> = std::result::Result<T, JsonlError>;

/// Writes records as JSONL to the given writer.
///
/// Each record is written as a single JSON line followed by a newline.
pub fn write_jsonl<W: Write, T: Serialize>(writer: &mut W, records: &[T]) -> Result<()> {
    for (i, record) in records.iter().enumerate() {
        serde_json::to_writer(&mut *writer, record).map_err(|e| JsonlError::Json {
            line: i + 1,
            source: e,
        })?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Returns an iterator that reads records from a JSONL reader.
///
/// Each line is parsed as a JSON object. Empty lines are skipped.
pub fn read_jsonl<T: DeserializeOwned, R: BufRead>(reader: R) -> JsonlIter<T, R> {
    JsonlIter {
        reader,
        line_number: 0,
        _record: PhantomData,
    }
}

/// Iterator over JSONL-encoded records.
pub struct JsonlIter<T, R> {
    reader: R,
    line_number: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned, R: BufRead> Iterator for JsonlIter<T, R> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str::<T>(trimmed).map_err(|e| {
                        JsonlError::Json {
                            line: self.line_number,
                            source: e,
                        }
                    }));
                }
                Err(e) => return Some(Err(JsonlError::Io(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskBuilder};
    use std::io::BufReader;

    #[test]
    fn write_and_read_tasks() {
        let tasks = vec![
            TaskBuilder::new("task-001", "Task 1").build(),
            TaskBuilder::new("task-002", "Task 2").parent("task-001").build(),
        ];

        let mut buf = Vec::new();
        write_jsonl(&mut buf, &tasks).unwrap();

        let reader = BufReader::new(buf.as_slice());
        let read_back: Vec<Task> = read_jsonl(reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].title, "Task 1");
        assert_eq!(read_back[1].parent_task_id.as_deref(), Some("task-001"));
    }

    #[test]
    fn read_skips_empty_lines() {
        let data = b"{\"task_id\":\"a\"}\n\n{\"task_id\":\"b\"}\n";
        let reader = BufReader::new(data.as_slice());
        let results: Vec<Task> = read_jsonl(reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn read_reports_line_number_on_error() {
        let data = b"{\"task_id\":\"a\"}\nnot-json\n";
        let reader = BufReader::new(data.as_slice());
        let results: Vec<Result<Task>> = read_jsonl(reader).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(JsonlError::Json { line, .. }) => assert_eq!(*line, 2),
            other => panic!("expected JSON error, got {:?}", other),
        }
    }
}
