// File: testing-framework/src/orchestrator/workspace.rs
//
// Per-node working directories
//
// A run gets one root directory. Each node gets `<root>/<kind><seq>`, with
// the sequence counted per kind across the whole run, so successive
// environments never reuse a directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::error::Result;

/// Allocates node directories under a run root
///
/// The root is a `tempfile` directory and is removed on drop unless
/// `keep()` was called.
#[derive(Debug)]
pub struct WorkspaceAllocator {
    root: PathBuf,
    temp: Mutex<Option<TempDir>>,
    counters: Mutex<HashMap<String, u32>>,
}

impl WorkspaceAllocator {
    /// Create a fresh run root, inside `parent` when given, else the system temp dir
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("lit-itest-");
        let temp = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let root = temp.path().to_path_buf();
        info!("Using tmp dir {}", root.display());

        Ok(Self {
            root,
            temp: Mutex::new(Some(temp)),
            counters: Mutex::new(HashMap::new()),
        })
    }

    /// Run root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create and return the next directory for `kind` (`lit0`, `lit1`, ...)
    pub fn node_dir(&self, kind: &str) -> Result<PathBuf> {
        let seq = {
            let mut counters = self.counters.lock();
            let counter = counters.entry(kind.to_string()).or_insert(0);
            let seq = *counter;
            *counter += 1;
            seq
        };
        let dir = self.root.join(format!("{}{}", kind, seq));
        fs::create_dir_all(&dir)?;
        debug!("Created node dir {}", dir.display());
        Ok(dir)
    }

    /// Directory for artifacts that outlive individual nodes
    pub fn artifacts_dir(&self) -> Result<PathBuf> {
        let dir = self.root.join("artifacts");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove node directories, keeping `artifacts/`
    ///
    /// Sequence numbers are not reset.
    pub fn clean(&self) -> Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.file_name().is_some_and(|n| n == "artifacts") {
                continue;
            }
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        debug!("Cleaned {}", self.root.display());
        Ok(())
    }

    /// Leave the root on disk after drop
    pub fn keep(&self) {
        if let Some(temp) = self.temp.lock().take() {
            let path = temp.into_path();
            info!("Keeping tmp dir {}", path.display());
        }
    }

    /// Whether the root will survive drop
    pub fn is_kept(&self) -> bool {
        self.temp.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_are_numbered_per_kind() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = WorkspaceAllocator::new(Some(parent.path())).unwrap();

        let lit0 = workspace.node_dir("lit").unwrap();
        let lit1 = workspace.node_dir("lit").unwrap();
        let bc0 = workspace.node_dir("bcnode").unwrap();

        assert!(lit0.ends_with("lit0"));
        assert!(lit1.ends_with("lit1"));
        assert!(bc0.ends_with("bcnode0"));
        assert!(lit0.is_dir() && lit1.is_dir() && bc0.is_dir());
        assert!(workspace.root().starts_with(parent.path()));
    }

    #[test]
    fn test_root_removed_on_drop() {
        let workspace = WorkspaceAllocator::new(None).unwrap();
        let root = workspace.root().to_path_buf();
        workspace.node_dir("lit").unwrap();
        drop(workspace);
        assert!(!root.exists());
    }

    #[test]
    fn test_keep_preserves_root() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = WorkspaceAllocator::new(Some(parent.path())).unwrap();
        let root = workspace.root().to_path_buf();
        workspace.keep();
        assert!(workspace.is_kept());
        drop(workspace);
        assert!(root.exists());
    }

    #[test]
    fn test_clean_keeps_artifacts_and_sequence() {
        let workspace = WorkspaceAllocator::new(None).unwrap();
        let lit0 = workspace.node_dir("lit").unwrap();
        std::fs::write(lit0.join("privkey.hex"), "11").unwrap();
        let artifacts = workspace.artifacts_dir().unwrap();

        workspace.clean().unwrap();
        assert!(!lit0.exists());
        assert!(artifacts.is_dir());
        assert!(workspace.node_dir("lit").unwrap().ends_with("lit1"));
    }
}
