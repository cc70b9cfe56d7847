//! Scenario runner
//!
//! Runs each scenario against a fresh environment from an
//! [`EnvironmentFactory`] and tears the environment down whatever the
//! outcome. Scenario errors become named failure records; an environment
//! that cannot be built aborts the whole run, since that points at the
//! harness or the host rather than at the nodes under test.

use std::fmt;

use futures::future::BoxFuture;
use log::{error, info, warn};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::manifest::DEFAULT_FUNCTION;
use crate::config::{defaults, HarnessConfig};
use crate::environment::{EnvironmentFactory, ScenarioEnvironment};
use crate::error::Result;
use crate::utilities::{dump_log_tails, ArtifactCollector};

/// A scenario body
///
/// Scenario code uses `anyhow` so that assertion failures carry context; the
/// runner only needs the error chain.
pub type ScenarioFn<E> = for<'a> fn(&'a mut E) -> BoxFuture<'a, anyhow::Result<()>>;

/// A resolved scenario, ready to run
pub struct Scenario<E> {
    /// Scenario name
    pub name: String,
    /// Function within the scenario
    pub function: String,
    /// Payment nodes created before the scenario runs
    pub node_count: usize,
    /// Scenario body
    pub run: ScenarioFn<E>,
}

impl<E> Scenario<E> {
    /// `name`, or `name:function` for anything but the default function
    pub fn label(&self) -> String {
        if self.function == DEFAULT_FUNCTION {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.function)
        }
    }
}

impl<E> Clone for Scenario<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            function: self.function.clone(),
            node_count: self.node_count,
            run: self.run,
        }
    }
}

impl<E> fmt::Debug for Scenario<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("function", &self.function)
            .field("node_count", &self.node_count)
            .finish()
    }
}

/// A failed scenario and the error chain it failed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioFailure {
    /// Scenario label
    pub scenario: String,
    /// Error chain
    pub error: String,
}

/// Outcome of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Scenarios that passed
    pub ok: usize,
    /// Scenarios that failed, in run order
    pub failed: Vec<ScenarioFailure>,
    /// Ctrl-C stopped the run early
    pub interrupted: bool,
}

impl RunReport {
    /// Every scenario ran and passed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }

    /// Process exit code: 0 when everything passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Labels of the failed scenarios
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.scenario.as_str()).collect()
    }
}

/// What the runner does when a scenario fails
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Print node log tails and write a failure artifact
    pub dump_logs: bool,
    /// Wait for Enter before tearing a failed environment down
    pub debugger: bool,
    /// Lines printed from each node log
    pub log_tail_lines: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            dump_logs: false,
            debugger: false,
            log_tail_lines: defaults::LOG_TAIL_LINES,
        }
    }
}

impl RunnerOptions {
    /// Options from the harness configuration
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            dump_logs: config.dump_logs,
            debugger: config.debugger,
            ..Self::default()
        }
    }
}

/// Runs scenarios one at a time, each in its own environment
pub struct ScenarioRunner<F> {
    factory: F,
    options: RunnerOptions,
}

impl<F: EnvironmentFactory> ScenarioRunner<F> {
    /// Runner creating environments through `factory`
    pub fn new(factory: F, options: RunnerOptions) -> Self {
        Self { factory, options }
    }

    /// The environment factory
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Run `scenarios` in order
    ///
    /// # Errors
    ///
    /// Only environment construction errors are returned; scenario failures
    /// are recorded in the report.
    pub async fn run(&self, scenarios: &[Scenario<F::Env>]) -> Result<RunReport> {
        let mut report = RunReport::default();

        for scenario in scenarios {
            let label = scenario.label();
            info!("Running scenario: {}", label);
            let mut collector =
                ArtifactCollector::new(&scenario.name, &scenario.function, scenario.node_count);

            let mut env = match self.factory.create(scenario.node_count).await {
                Ok(env) => env,
                Err(e) => {
                    error!("Could not set up the environment for {}: {}", label, e);
                    return Err(e);
                }
            };

            let outcome = tokio::select! {
                result = (scenario.run)(&mut env) => Some(result),
                _ = interrupted() => None,
            };

            let passed = match outcome {
                Some(Ok(())) => {
                    info!("Success: {}", label);
                    report.ok += 1;
                    true
                }
                Some(Err(e)) => {
                    let chain = format!("{:#}", e);
                    error!("Failure: {}: {}", label, chain);
                    collector.capture_log("ERROR", format!("Failure: {}: {}", label, chain));
                    collector.set_failure_reason(chain.clone());
                    self.on_failure(&env, collector).await;
                    report.failed.push(ScenarioFailure {
                        scenario: label.clone(),
                        error: chain,
                    });
                    false
                }
                None => {
                    warn!("Interrupted during {}", label);
                    report.interrupted = true;
                    false
                }
            };

            if let Err(e) = env.shutdown().await {
                warn!("Teardown after {} failed: {}", label, e);
            }
            if report.interrupted {
                break;
            }
            if passed {
                if let Err(e) = self.factory.clean_workspace() {
                    warn!("Failed to clean workspace after {}: {}", label, e);
                }
            }
        }

        info!(
            "{} passed, {} failed{}",
            report.ok,
            report.failed.len(),
            if report.interrupted { " (interrupted)" } else { "" }
        );
        for failure in &report.failed {
            error!("  {}: {}", failure.scenario, failure.error);
        }
        Ok(report)
    }

    async fn on_failure(&self, env: &F::Env, mut collector: ArtifactCollector) {
        let root = self.factory.workspace_root();

        if self.options.dump_logs {
            let log_files = env.log_files();
            dump_log_tails(&log_files, self.options.log_tail_lines).await;

            if let Some(root) = &root {
                self.factory.keep_workspace();
                collector.add_node_dirs(env.node_dirs());
                collector.add_log_files(log_files);
                match collector.save(root.join("artifacts")).await {
                    Ok(path) => info!("Failure artifact written to {}", path.display()),
                    Err(e) => warn!("Failed to write failure artifact: {:#}", e),
                }
            }
        }

        if self.options.debugger {
            match &root {
                Some(root) => info!("Nodes are still running under {}", root.display()),
                None => info!("Nodes are still running"),
            }
            info!("Press Enter to tear the environment down");
            let mut line = String::new();
            if let Err(e) = BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
                warn!("Could not read stdin: {}", e);
            }
        }
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
