//! lit-itest - integration test runner for lit payment nodes
//!
//! Spins up a regtest coin node and a set of payment nodes per scenario and
//! runs the scenarios listed in a manifest, or the ones named on the command
//! line.
//!
//! # Usage
//!
//! ```bash
//! # Everything in itests.txt
//! lit-itest
//!
//! # Two scenarios against litecoind, keeping node directories
//! lit-itest --coin litecoin --scenario push --scenario pushbreak:reverse --nocleanup
//!
//! # What can be selected
//! lit-itest --list
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use log::{error, info, LevelFilter};

use lit_testing_framework::config::{HarnessConfig, LitTransport};
use lit_testing_framework::environment::{LitEnvironmentFactory, TestEnvironment};
use lit_testing_framework::nodes::CoinKind;
use lit_testing_framework::orchestrator::RunResources;
use lit_testing_framework::scenarios::{
    load_manifest, RunReport, RunnerOptions, Scenario, ScenarioRegistry, ScenarioRunner,
};

/// Exit code for errors in the harness itself rather than in a scenario
const HARNESS_ERROR: u8 = 2;

/// lit integration test runner
#[derive(Parser, Debug)]
#[command(name = "lit-itest")]
#[command(about = "Run lit integration scenarios against regtest nodes")]
#[command(version)]
struct Cli {
    /// Manifest listing `name node_count [function]` per line (or YAML);
    /// defaults to the itests.txt shipped with the crate
    #[arg(long)]
    tests_file: Option<PathBuf>,

    /// Run only this scenario; may be given more than once
    #[arg(long = "scenario", value_name = "NAME[:FUNC]")]
    scenarios: Vec<String>,

    /// Coin daemon backing the environment
    #[arg(long, default_value = "bitcoin")]
    coin: CoinKind,

    /// Keep every node directory after the run
    #[arg(long)]
    nocleanup: bool,

    /// Print node log tails and write an artifact when a scenario fails
    #[arg(long)]
    dumplogs: bool,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", value_parser = parse_level)]
    loglevel: LevelFilter,

    /// Forward node stdout/stderr to the log
    #[arg(long)]
    show_output: bool,

    /// Pause on failure until Enter is pressed
    #[arg(long)]
    debugger: bool,

    /// Parent directory for the run root
    #[arg(long)]
    tmpdir: Option<PathBuf>,

    /// How to talk to payment nodes
    #[arg(long, value_enum)]
    transport: Option<Transport>,

    /// List the built-in scenarios and exit
    #[arg(long)]
    list: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    /// Persistent websocket
    Websocket,
    /// One HTTP POST per call
    Oneoff,
}

impl From<Transport> for LitTransport {
    fn from(transport: Transport) -> Self {
        match transport {
            Transport::Websocket => LitTransport::WebSocket,
            Transport::Oneoff => LitTransport::OneOff,
        }
    }
}

impl Cli {
    /// Manifest to load when no scenario is named
    fn tests_file(&self) -> PathBuf {
        self.tests_file
            .clone()
            .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("itests.txt"))
    }

    /// Defaults, then the environment, then flags
    fn harness_config(&self) -> HarnessConfig {
        let mut config = HarnessConfig {
            coin: self.coin,
            ..HarnessConfig::default()
        }
        .with_env(|key| std::env::var(key).ok());

        if let Some(dir) = &self.tmpdir {
            config.tmp_root = Some(dir.clone());
        }
        if let Some(transport) = self.transport {
            config.lit_transport = transport.into();
        }
        config.keep_tmp |= self.nocleanup;
        config.show_output |= self.show_output;
        config.dump_logs = self.dumplogs;
        config.debugger = self.debugger;
        config
    }
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("unknown log level '{}'", value))
}

fn init_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_micros()
        .init();
}

fn select_scenarios(
    cli: &Cli,
    registry: &ScenarioRegistry<TestEnvironment>,
) -> anyhow::Result<Vec<Scenario<TestEnvironment>>> {
    if !cli.scenarios.is_empty() {
        return cli
            .scenarios
            .iter()
            .map(|selector| registry.select(selector).map_err(anyhow::Error::from))
            .collect();
    }
    let tests_file = cli.tests_file();
    let entries = load_manifest(&tests_file)?;
    info!(
        "Loaded {} scenario(s) from {}",
        entries.len(),
        tests_file.display()
    );
    Ok(registry.resolve(&entries)?)
}

async fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let registry = ScenarioRegistry::builtin();
    let scenarios = select_scenarios(&cli, &registry)?;

    let config = cli.harness_config();
    config.validate()?;
    let resources = RunResources::from_config(&config)?;
    info!("Run root: {}", resources.workspace.root().display());

    let options = RunnerOptions::from_config(&config);
    let factory = LitEnvironmentFactory::new(Arc::new(config), resources);
    let runner = ScenarioRunner::new(factory, options);
    Ok(runner.run(&scenarios).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.loglevel);

    if cli.list {
        for scenario in ScenarioRegistry::builtin().all() {
            println!("{} {} {}", scenario.name, scenario.node_count, scenario.function);
        }
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            error!("Failed: {}", report.failed_names().join(", "));
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Harness error: {:#}", e);
            ExitCode::from(HARNESS_ERROR)
        }
    }
}
