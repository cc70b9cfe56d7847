//! Scenario selection and execution
//!
//! A run is a list of scenarios, each a `(name, function)` pair plus the
//! number of payment nodes its environment starts with:
//!
//! ```text
//! # itests.txt
//! receive    1
//! pushclose  2
//! pushbreak  2  reverse
//! ```
//!
//! The manifest is parsed, every pair is resolved against a
//! [`ScenarioRegistry`] and the resulting list is handed to a
//! [`ScenarioRunner`], which builds one fresh environment per scenario.

pub mod library;
pub mod manifest;
pub mod registry;
pub mod runner;

pub use manifest::{load_manifest, parse_manifest_text, parse_manifest_yaml, ManifestEntry};
pub use registry::ScenarioRegistry;
pub use runner::{
    RunReport, RunnerOptions, Scenario, ScenarioFailure, ScenarioFn, ScenarioRunner,
};
