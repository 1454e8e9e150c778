//! Utility functions for common operations.
//!
//! This module provides shared utilities used across the crate:
//! - Atomic file operations for cache snapshots and configuration
//! - Path expansion for user-supplied paths
//! - Slack timestamp and text helpers

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use tempfile::NamedTempFile;

use crate::error::{Result, ShellError};

/// Atomically write content to a file.
///
/// The content goes to a temporary file in the target's directory, is
/// flushed, and is then renamed over the target. Readers observe either the
/// old file or the new one, never a partial write.
///
/// # Example
///
/// ```rust,no_run
/// use slack_shell::util::atomic_write;
///
/// atomic_write("users.json", b"{}").unwrap();
/// ```
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    let parent = path.parent().ok_or_else(|| ShellError::IoError {
        context: format!("Cannot determine parent directory for: {}", path.display()),
        source: io::Error::new(io::ErrorKind::InvalidInput, "No parent directory"),
    })?;

    if !parent.as_os_str().is_empty() && !parent.exists() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ShellError::io(
                format!("Failed to create directory: {}", parent.display()),
                e,
            )
        })?;
    }

    // Same directory keeps the rename on one filesystem
    let dir = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        ShellError::io(
            format!("Failed to create temporary file in: {}", dir.display()),
            e,
        )
    })?;

    temp_file.write_all(content).map_err(|e| {
        ShellError::io(
            format!("Failed to write to temporary file for: {}", path.display()),
            e,
        )
    })?;

    temp_file.flush().map_err(|e| {
        ShellError::io(
            format!("Failed to flush temporary file for: {}", path.display()),
            e,
        )
    })?;

    temp_file.persist(path).map_err(|e| {
        ShellError::io(
            format!("Failed to atomically write file: {}", path.display()),
            e.error,
        )
    })?;

    Ok(())
}

/// Expand a leading `~` and make the path absolute against the working directory.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = if let Some(rest) = raw.strip_prefix('~') {
        let home = dirs::home_dir().ok_or_else(|| ShellError::ConfigError {
            message: "failed to get home directory".to_string(),
        })?;
        home.join(rest.trim_start_matches('/'))
    } else {
        PathBuf::from(raw)
    };

    if expanded.is_absolute() {
        return Ok(expanded);
    }

    let cwd = std::env::current_dir()
        .map_err(|e| ShellError::io("failed to get current directory", e))?;
    Ok(cwd.join(expanded))
}

/// Truncate text to at most `max_chars` characters, ending with `...` when cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Whole seconds of a Slack timestamp (`"1700000000.123456"`).
///
/// Malformed input yields 0.
pub fn slack_ts_seconds(ts: &str) -> i64 {
    ts.split('.')
        .next()
        .and_then(|secs| secs.parse().ok())
        .unwrap_or(0)
}

/// Local wall-clock time of a Slack timestamp.
pub fn slack_ts_to_local(ts: &str) -> DateTime<Local> {
    Local
        .timestamp_opt(slack_ts_seconds(ts), 0)
        .single()
        .unwrap_or_else(|| DateTime::<Local>::from(std::time::UNIX_EPOCH))
}

/// `HH:MM` rendering of a Slack timestamp in local time.
pub fn format_slack_time(ts: &str) -> String {
    slack_ts_to_local(ts).format("%H:%M").to_string()
}

/// Compare two Slack timestamps numerically.
///
/// Both halves are compared as integers so `"10.5"` sorts after `"9.9"`.
pub fn compare_slack_ts(a: &str, b: &str) -> std::cmp::Ordering {
    fn split(ts: &str) -> (u64, u64) {
        let mut parts = ts.splitn(2, '.');
        let secs = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let micros = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        (secs, micros)
    }
    split(a).cmp(&split(b))
}

/// Mask a secret for display, keeping its prefix (`xoxp-…`).
pub fn redact_token(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    let prefix: String = token.chars().take(5).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_basic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.json");

        atomic_write(&path, b"{\"a\":1}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_atomic_write_overwrites_and_creates_parents() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("T123").join("users.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        // No temp files left behind
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_expand_path_absolute_is_unchanged() {
        let p = expand_path("/etc/slack-shell.toml").unwrap();
        assert_eq!(p, PathBuf::from("/etc/slack-shell.toml"));
    }

    #[test]
    fn test_expand_path_relative_becomes_absolute() {
        let p = expand_path("work.toml").unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("work.toml"));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate_text("日本語のテキスト", 5), "日本...");
    }

    #[test]
    fn test_slack_ts_helpers() {
        assert_eq!(slack_ts_seconds("1700000000.000100"), 1_700_000_000);
        assert_eq!(slack_ts_seconds("garbage"), 0);
        assert_eq!(format_slack_time("1700000000.1").len(), 5);
        assert_eq!(
            compare_slack_ts("10.000001", "9.999999"),
            std::cmp::Ordering::Greater
        );
        assert_eq!(
            compare_slack_ts("100.000002", "100.000010"),
            std::cmp::Ordering::Less
        );
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(redact_token("xoxp-1234-5678"), "xoxp-***");
        assert_eq!(redact_token(""), "");
    }
}
