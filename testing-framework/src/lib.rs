//! # Lit Integration Test Harness
//!
//! Drives real `lit` payment nodes against a regtest coin node
//! (`bitcoind` or `litecoind`) and, for contract scenarios, `dlcoracle`
//! instances. Every node is an external process owned by the harness and
//! controlled over RPC.
//!
//! ## Architecture Overview
//!
//! - **orchestrator**: ports, working directories and process supervision
//! - **rpc**: JSON-RPC transports (HTTP for coin nodes, websocket or
//!   one-off HTTP for payment nodes)
//! - **nodes**: typed handles for coin, payment and oracle nodes
//! - **waiters**: bounded polling, the only place the harness sleeps
//! - **environment**: a synced cluster of nodes with `generate_block` as
//!   its ordering barrier
//! - **scenarios**: manifest parsing, the scenario registry, the runner and
//!   the built-in scenario library
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lit_testing_framework::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(HarnessConfig::from_env());
//!     let resources = RunResources::from_config(&config)?;
//!     let factory = LitEnvironmentFactory::new(config.clone(), resources);
//!     let registry = ScenarioRegistry::builtin();
//!
//!     let runner = ScenarioRunner::new(factory, RunnerOptions::from_config(&config));
//!     let report = runner.run(&[registry.select("receive")?]).await?;
//!     std::process::exit(report.exit_code());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Harness configuration (defaults, environment overlay)
pub mod config;

/// Harness error taxonomy
pub mod error;

/// Synced node clusters and the factory the runner uses
pub mod environment;

// Balance invariant checkers (conservation, maturity)
pub mod invariants;

/// Node handles
pub mod nodes;

/// Resource ownership: ports, directories, processes
pub mod orchestrator;

/// JSON-RPC transports
pub mod rpc;

// Assertion helpers over payment node RPCs
pub mod rpc_helpers;

// Scenario manifests, registry, runner and library
pub mod scenarios;

/// Post-mortem helpers
pub mod utilities;

/// Bounded polling
pub mod waiters;

// Convenient re-exports for common usage
pub mod prelude;

pub use environment::TestEnvironment;
pub use error::{HarnessError, Result};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
