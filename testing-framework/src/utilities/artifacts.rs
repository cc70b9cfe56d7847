// File: testing-framework/src/utilities/artifacts.rs
//
// Failure Artifact Collection
//
// When a scenario fails the runner records what it knows about the run in a
// JSON file under the workspace's `artifacts/` directory, which survives the
// per-scenario cleanup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Scenario metadata for a failure record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    /// Scenario name
    pub scenario: String,
    /// Function within the scenario
    pub function: String,
    /// Payment nodes the environment was created with
    pub node_count: usize,
    /// When the scenario started (RFC 3339)
    pub started_at: String,
    /// When the failure was recorded (RFC 3339)
    pub failed_at: String,
    /// Scenario duration (milliseconds)
    pub duration_ms: u64,
    /// Error chain of the failure
    pub failure_reason: Option<String>,
}

/// Log entry captured while the scenario failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level (ERROR, WARN, INFO)
    pub level: String,
    /// Log message
    pub message: String,
    /// Timestamp
    pub timestamp: String,
}

/// Complete failure artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureArtifact {
    /// Scenario metadata
    pub metadata: ScenarioMetadata,
    /// Working directory of every node
    pub node_dirs: Vec<PathBuf>,
    /// Node log files at the time of failure
    pub log_files: Vec<PathBuf>,
    /// Notes captured by the runner
    pub logs: Vec<LogEntry>,
}

/// Collector for one scenario's failure record
///
/// # Examples
///
/// ```rust,ignore
/// use lit_testing_framework::utilities::artifacts::ArtifactCollector;
///
/// let mut collector = ArtifactCollector::new("pushclose", "run_test", 2);
/// if let Err(e) = (scenario.run)(&mut env).await {
///     collector.set_failure_reason(format!("{:#}", e));
///     collector.add_node_dirs(env.node_dirs());
///     collector.save(workspace_root.join("artifacts")).await?;
/// }
/// ```
pub struct ArtifactCollector {
    metadata: ScenarioMetadata,
    node_dirs: Vec<PathBuf>,
    log_files: Vec<PathBuf>,
    logs: Vec<LogEntry>,
    start_time: Instant,
}

impl ArtifactCollector {
    /// Start collecting for `scenario:function`
    ///
    /// The start timestamp is taken now.
    pub fn new(scenario: impl Into<String>, function: impl Into<String>, node_count: usize) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            metadata: ScenarioMetadata {
                scenario: scenario.into(),
                function: function.into(),
                node_count,
                started_at: now.clone(),
                failed_at: now,
                duration_ms: 0,
                failure_reason: None,
            },
            node_dirs: Vec::new(),
            log_files: Vec::new(),
            logs: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Set the failure reason
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lit_testing_framework::utilities::artifacts::ArtifactCollector;
    ///
    /// let mut collector = ArtifactCollector::new("fund", "run_test", 2);
    /// collector.set_failure_reason("ChanTotal mismatch on lit0".to_string());
    /// ```
    pub fn set_failure_reason(&mut self, reason: String) {
        self.metadata.failure_reason = Some(reason);
    }

    /// Record node working directories
    pub fn add_node_dirs(&mut self, dirs: impl IntoIterator<Item = PathBuf>) {
        self.node_dirs.extend(dirs);
    }

    /// Record node log files
    pub fn add_log_files(&mut self, files: impl IntoIterator<Item = PathBuf>) {
        self.log_files.extend(files);
    }

    /// Capture a note
    pub fn capture_log(&mut self, level: impl Into<String>, message: impl Into<String>) {
        self.logs.push(LogEntry {
            level: level.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// Save artifact to disk
    ///
    /// The filename is `<scenario>_<function>_<timestamp>.json`.
    ///
    /// # Returns
    ///
    /// Path to the saved artifact file
    pub async fn save(&mut self, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
        self.metadata.duration_ms = self.start_time.elapsed().as_millis() as u64;
        self.metadata.failed_at = chrono::Utc::now().to_rfc3339();

        let artifact = FailureArtifact {
            metadata: self.metadata.clone(),
            node_dirs: self.node_dirs.clone(),
            log_files: self.log_files.clone(),
            logs: self.logs.clone(),
        };

        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)
            .await
            .context("Failed to create artifact directory")?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let filename = format!(
            "{}_{}_{}.json",
            self.metadata.scenario, self.metadata.function, timestamp
        );
        let filepath = output_dir.join(filename);

        let json =
            serde_json::to_string_pretty(&artifact).context("Failed to serialize artifact")?;

        let mut file = fs::File::create(&filepath)
            .await
            .context("Failed to create artifact file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write artifact data")?;
        file.flush()
            .await
            .context("Failed to flush artifact file")?;

        Ok(filepath)
    }

    /// Load an artifact from disk
    pub async fn load(filepath: impl AsRef<Path>) -> Result<FailureArtifact> {
        let content = fs::read_to_string(filepath.as_ref())
            .await
            .context("Failed to read artifact file")?;
        serde_json::from_str(&content).context("Failed to parse artifact JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_artifact_collector_creation() {
        let collector = ArtifactCollector::new("close", "run_test", 2);
        assert_eq!(collector.metadata.scenario, "close");
        assert_eq!(collector.metadata.node_count, 2);
        assert!(collector.metadata.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_artifact() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut collector = ArtifactCollector::new("pushbreak", "reverse", 2);
        collector.set_failure_reason("final balance doesn't match".to_string());
        collector.add_node_dirs(vec![PathBuf::from("/tmp/run/lit0")]);
        collector.add_log_files(vec![PathBuf::from("/tmp/run/lit0/lit.log")]);
        collector.capture_log("ERROR", "Failure: pushbreak:reverse");

        let filepath = collector.save(temp_dir.path().join("artifacts")).await?;
        assert!(filepath.exists());
        let name = filepath.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("pushbreak_reverse_"));

        let loaded = ArtifactCollector::load(&filepath).await?;
        assert_eq!(loaded.metadata.function, "reverse");
        assert_eq!(
            loaded.metadata.failure_reason.as_deref(),
            Some("final balance doesn't match")
        );
        assert_eq!(loaded.node_dirs, vec![PathBuf::from("/tmp/run/lit0")]);
        assert_eq!(loaded.logs.len(), 1);
        Ok(())
    }
}
