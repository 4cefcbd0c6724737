//! Append-only, human-readable execution log.
//!
//! One block per execution:
//!
//! ```text
//! [2024-05-01T12:00:00Z] $ echo hi
//! hi
//! [exit: 0, duration: 12.50ms]
//!
//! ```

use std::{fmt::Write as _, path::Path};

use chrono::SecondsFormat;
use j0_core::{Execution, StorageError};
use tokio::io::AsyncWriteExt;

/// Create (or truncate) an empty log file.
///
/// # Errors
/// Returns `Persistence` if the file cannot be created.
pub async fn create(path: &Path) -> Result<(), StorageError> {
    tokio::fs::File::create(path)
        .await
        .map(drop)
        .map_err(|e| StorageError::persistence(path, e))
}

/// Append one execution record.
///
/// The file is opened in append mode so earlier records are never
/// truncated; it is re-created if it went missing.
///
/// # Errors
/// Returns `Persistence` if the file cannot be opened or written.
pub async fn append(path: &Path, execution: &Execution) -> Result<(), StorageError> {
    let record = format_record(execution);
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| StorageError::persistence(path, e))?;
    file.write_all(record.as_bytes())
        .await
        .map_err(|e| StorageError::persistence(path, e))?;
    file.flush()
        .await
        .map_err(|e| StorageError::persistence(path, e))
}

/// Read the last `lines` lines of the log; `0` returns everything.
///
/// # Errors
/// Returns `Persistence` if the file cannot be read.
pub async fn tail(path: &Path, lines: usize) -> Result<String, StorageError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::persistence(path, e))?;
    let content = String::from_utf8_lossy(&content);
    Ok(tail_lines(&content, lines).to_string())
}

/// Render one execution block.
#[must_use]
pub fn format_record(execution: &Execution) -> String {
    let mut record = format!(
        "[{}] $ {}\n",
        execution.time.to_rfc3339_opts(SecondsFormat::Secs, true),
        execution.code
    );
    push_line(&mut record, &execution.output);
    if !execution.stderr.is_empty() {
        record.push_str("[stderr] ");
        push_line(&mut record, &execution.stderr);
    }
    let _ = writeln!(
        record,
        "[exit: {}, duration: {:.2}ms]\n",
        execution.exit_code, execution.duration_ms
    );
    record
}

fn push_line(buf: &mut String, text: &str) {
    buf.push_str(text);
    if !text.ends_with('\n') {
        buf.push('\n');
    }
}

/// Slice off the last `lines` lines, keeping a trailing newline.
#[must_use]
pub fn tail_lines(content: &str, lines: usize) -> &str {
    if lines == 0 {
        return content;
    }
    let body = content.strip_suffix('\n').unwrap_or(content);
    match body.rmatch_indices('\n').nth(lines - 1) {
        Some((idx, _)) => &content[idx + 1..],
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use j0_core::JobStatus;
    use uuid::Uuid;

    use super::*;

    fn execution(code: &str, output: &str, stderr: &str) -> Execution {
        Execution {
            id: Uuid::new_v4(),
            code: code.into(),
            output: output.into(),
            stderr: stderr.into(),
            exit_code: i32::from(!stderr.is_empty()),
            status: JobStatus::new(3, "Accepted"),
            time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            duration_ms: 12.5,
        }
    }

    #[test]
    fn test_format_record() {
        let record = format_record(&execution("echo hi", "hi\n", ""));
        assert_eq!(
            record,
            "[2024-05-01T12:00:00Z] $ echo hi\nhi\n[exit: 0, duration: 12.50ms]\n\n"
        );
    }

    #[test]
    fn test_format_record_with_stderr() {
        let record = format_record(&execution("ls /nope", "", "ls: cannot access"));
        assert!(record.contains("\n[stderr] ls: cannot access\n"));
        assert!(record.ends_with("[exit: 1, duration: 12.50ms]\n\n"));
    }

    #[test]
    fn test_tail_lines() {
        let content = "a\nb\nc\n";
        assert_eq!(tail_lines(content, 0), content);
        assert_eq!(tail_lines(content, 1), "c\n");
        assert_eq!(tail_lines(content, 2), "b\nc\n");
        assert_eq!(tail_lines(content, 3), content);
        assert_eq!(tail_lines(content, 10), content);
        assert_eq!(tail_lines("a\nb", 1), "b");
        assert_eq!(tail_lines("", 5), "");
    }

    #[tokio::test]
    async fn test_append_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.log");
        create(&path).await.unwrap();
        assert_eq!(tail(&path, 0).await.unwrap(), "");

        append(&path, &execution("echo 1", "1\n", "")).await.unwrap();
        append(&path, &execution("echo 2", "2\n", "")).await.unwrap();

        let content = tail(&path, 0).await.unwrap();
        let first = content.find("$ echo 1").unwrap();
        let second = content.find("$ echo 2").unwrap();
        assert!(first < second);
        assert_eq!(content.matches("[exit: ").count(), 2);

        let last_block = tail(&path, 4).await.unwrap();
        assert!(last_block.starts_with("[2024-05-01T12:00:00Z] $ echo 2\n"));
    }

    #[tokio::test]
    async fn test_tail_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = tail(&dir.path().join("missing.log"), 0).await.unwrap_err();
        assert!(matches!(err, StorageError::Persistence { .. }));
    }
}
