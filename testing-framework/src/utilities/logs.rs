// File: testing-framework/src/utilities/logs.rs
//
// Node log tails
//
// Node logs can be large and are not guaranteed to be valid UTF-8, so they
// are read as bytes and decoded lossily.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, warn};

/// Last `lines` lines of the file at `path`
pub async fn tail_lines(path: &Path, lines: usize) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read log {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|line| line.to_string()).collect())
}

/// Print the last `lines` lines of every log file
///
/// Files that do not exist yet (a node that never started) are reported and
/// skipped.
pub async fn dump_log_tails(files: &[PathBuf], lines: usize) {
    for file in files {
        match tail_lines(file, lines).await {
            Ok(tail) => {
                error!("==== last {} lines of {} ====", tail.len(), file.display());
                for line in tail {
                    error!("{}", line);
                }
            }
            Err(e) => warn!("{:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tail_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lit.log");
        let body: String = (0..10).map(|i| format!("line {}\n", i)).collect();
        tokio::fs::write(&path, body).await.unwrap();

        assert_eq!(tail_lines(&path, 3).await.unwrap(), vec!["line 7", "line 8", "line 9"]);
        assert_eq!(tail_lines(&path, 500).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_tail_lines_invalid_utf8_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        tokio::fs::write(&path, b"ok\n\xff\xfe\nlast\n").await.unwrap();

        let tail = tail_lines(&path, 2).await.unwrap();
        assert_eq!(tail[1], "last");

        assert!(tail_lines(&dir.path().join("missing.log"), 5).await.is_err());
        dump_log_tails(&[dir.path().join("missing.log")], 5).await;
    }
}
