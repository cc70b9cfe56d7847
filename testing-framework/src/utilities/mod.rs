// File: testing-framework/src/utilities/mod.rs
//
// Testing Utilities
//
// Post-mortem helpers used by the scenario runner when a scenario fails.

/// Failure artifact collection for post-mortem debugging
pub mod artifacts;

/// Node log tails
pub mod logs;

pub use artifacts::{ArtifactCollector, FailureArtifact};
pub use logs::{dump_log_tails, tail_lines};
