//! Headless buildflow runner.
//!
//! Plays the construction AI against the sandbox host without a game.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in opening scenario
//! cargo run -p buildflow_headless -- run
//!
//! # Run a scenario file with a fixed seed and save the report
//! cargo run -p buildflow_headless -- run -s scenarios/opening.ron --seed 42 -o run.json
//!
//! # Sweep many seeds in parallel
//! cargo run -p buildflow_headless -- batch --count 256 --output results/batch.json
//!
//! # Check that a seed replays identically
//! cargo run -p buildflow_headless -- verify --seed 7 --runs 5
//! ```
//!
//! Reports (stdout): pretty JSON
//! Logs (stderr): set `RUST_LOG` or pass `-v`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use buildflow_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::HeadlessRunner,
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "buildflow_headless")]
#[command(about = "Headless sandbox runner for the buildflow construction AI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one scenario
    Run {
        /// Scenario file to load (defaults to the built-in opening)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Tie-break seed override
        #[arg(long)]
        seed: Option<u64>,

        /// Frame count override
        #[arg(short, long)]
        frames: Option<u32>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Play one scenario under many seeds
    Batch {
        /// Scenario file to load (defaults to the built-in opening)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of runs
        #[arg(short, long, default_value = "16")]
        count: u32,

        /// Maximum parallel runs (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Starting seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Frame count override
        #[arg(short, long)]
        frames: Option<u32>,

        /// Write results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify determinism by running the same seed several times
    Verify {
        /// Scenario file to load (defaults to the built-in opening)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of runs
        #[arg(short, long, default_value = "3")]
        runs: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            frames,
            output,
        } => cmd_run(scenario.as_deref(), seed, frames, output.as_deref()),
        Commands::Batch {
            scenario,
            count,
            parallel,
            seed,
            frames,
            output,
        } => {
            let mut config = BatchConfig::new(count)
                .with_seed(seed)
                .with_parallel(parallel);
            if let Some(frames) = frames {
                config = config.with_frames(frames);
            }
            cmd_batch(scenario.as_deref(), config, output.as_deref())
        }
        Commands::Verify {
            scenario,
            seed,
            runs,
        } => cmd_verify(scenario.as_deref(), seed, runs),
    }
}

fn load_scenario(path: Option<&Path>) -> Option<Scenario> {
    let Some(path) = path else {
        return Some(Scenario::opening());
    };
    match Scenario::load(path) {
        Ok(scenario) => {
            tracing::info!("Loaded scenario '{}' from {}", scenario.name, path.display());
            Some(scenario)
        }
        Err(e) => {
            tracing::error!("Failed to load scenario: {}", e);
            None
        }
    }
}

fn emit(json: &str, output: Option<&Path>) -> ExitCode {
    match output {
        Some(path) => match std::fs::write(path, json) {
            Ok(()) => {
                tracing::info!("Wrote {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("Failed to write {}: {}", path.display(), e);
                ExitCode::FAILURE
            }
        },
        None => {
            println!("{json}");
            ExitCode::SUCCESS
        }
    }
}

fn cmd_run(
    scenario: Option<&Path>,
    seed: Option<u64>,
    frames: Option<u32>,
    output: Option<&Path>,
) -> ExitCode {
    let Some(scenario) = load_scenario(scenario) else {
        return ExitCode::FAILURE;
    };
    let mut runner = HeadlessRunner::new(scenario);
    if let Some(seed) = seed {
        runner = runner.with_seed(seed);
    }
    if let Some(frames) = frames {
        runner = runner.with_frames(frames);
    }

    let report = runner.run();
    for error in &report.errors {
        tracing::warn!("{}", error);
    }
    match report.to_json() {
        Ok(json) => emit(&json, output),
        Err(e) => {
            tracing::error!("Failed to serialize report: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_batch(scenario: Option<&Path>, config: BatchConfig, output: Option<&Path>) -> ExitCode {
    let Some(scenario) = load_scenario(scenario) else {
        return ExitCode::FAILURE;
    };
    let results = run_batch(&scenario, config);

    eprintln!("Runs:           {}", results.summary.runs);
    eprintln!(
        "Goals met:      {:.1}%",
        results.summary.goals_met_rate * 100.0
    );
    eprintln!("Mean units:     {:.1}", results.summary.mean_units);
    eprintln!("Mean errors:    {:.2}", results.summary.mean_errors);
    eprintln!("Distinct mixes: {}", results.summary.distinct_outcomes);

    if let Some(path) = output {
        return match results.save(path) {
            Ok(()) => {
                tracing::info!("Saved batch results to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("Failed to save results: {}", e);
                ExitCode::FAILURE
            }
        };
    }
    match serde_json::to_string_pretty(&results) {
        Ok(json) => emit(&json, None),
        Err(e) => {
            tracing::error!("Failed to serialize results: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_verify(scenario: Option<&Path>, seed: u64, runs: u32) -> ExitCode {
    let Some(scenario) = load_scenario(scenario) else {
        return ExitCode::FAILURE;
    };
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario.name,
        seed,
        runs
    );

    if verify_determinism(&scenario, seed, runs) {
        eprintln!("PASS: All {runs} runs produced identical reports");
        ExitCode::SUCCESS
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        ExitCode::FAILURE
    }
}
