//! Scenario manifests
//!
//! Two formats list the scenarios of a run. The text format has one
//! scenario per line:
//!
//! ```text
//! # name     nodes  function
//! receive    1
//! pushbreak  2      forward
//! pushbreak  2      reverse
//! ```
//!
//! The YAML format carries the same fields:
//!
//! ```yaml
//! scenarios:
//!   - name: "pushbreak"
//!     nodes: 2
//!     function: "reverse"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Function run when a manifest line names none
pub const DEFAULT_FUNCTION: &str = "run_test";

/// One scenario of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Scenario name
    pub name: String,
    /// Payment nodes created before the scenario runs
    pub nodes: usize,
    /// Function within the scenario
    #[serde(default = "default_function")]
    pub function: String,
}

fn default_function() -> String {
    DEFAULT_FUNCTION.to_string()
}

#[derive(Debug, Deserialize)]
struct YamlManifest {
    scenarios: Vec<ManifestEntry>,
}

/// Parse the text format
///
/// # Errors
///
/// Returns `HarnessError::Config` naming the 1-based line number when a line
/// has fewer than two or more than three fields, or a node count that is not
/// a number.
pub fn parse_manifest_text(text: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let (name, nodes, function) = match fields.as_slice() {
            [name, nodes] => (*name, *nodes, DEFAULT_FUNCTION),
            [name, nodes, function] => (*name, *nodes, *function),
            _ => {
                return Err(HarnessError::Config(format!(
                    "manifest line {}: expected 'name node_count [function]', got '{}'",
                    number + 1,
                    line
                )))
            }
        };
        let nodes = nodes.parse::<usize>().map_err(|_| {
            HarnessError::Config(format!(
                "manifest line {}: node count '{}' is not a number",
                number + 1,
                nodes
            ))
        })?;

        entries.push(ManifestEntry {
            name: name.to_string(),
            nodes,
            function: function.to_string(),
        });
    }
    Ok(entries)
}

/// Parse the YAML format
pub fn parse_manifest_yaml(text: &str) -> Result<Vec<ManifestEntry>> {
    let manifest: YamlManifest = serde_yaml::from_str(text)
        .map_err(|e| HarnessError::Config(format!("invalid YAML manifest: {}", e)))?;
    Ok(manifest.scenarios)
}

/// Load a manifest, picking the format from the extension (`.yml`/`.yaml`
/// are YAML, anything else is text)
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Config(format!("cannot read manifest {}: {}", path.display(), e))
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yml") | Some("yaml") => parse_manifest_yaml(&text),
        _ => parse_manifest_text(&text),
    }
}
