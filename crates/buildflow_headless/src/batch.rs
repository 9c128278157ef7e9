//! Batch runner for seed sweeps.
//!
//! Plays one scenario under many tie-break seeds in parallel using rayon
//! and summarizes how often the workflow reaches its goals.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::runner::{HeadlessRunner, RunReport};
use crate::scenario::Scenario;

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of runs
    pub runs: u32,
    /// First seed; run `i` uses `seed_start + i`
    pub seed_start: u64,
    /// Maximum parallel runs (0 = use rayon default)
    pub parallel: u32,
    /// Frame override for every run
    pub frames: Option<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            runs: 16,
            seed_start: 0,
            parallel: 0,
            frames: None,
        }
    }
}

impl BatchConfig {
    /// Create config for a number of runs
    #[must_use]
    pub fn new(runs: u32) -> Self {
        Self {
            runs,
            ..Default::default()
        }
    }

    /// Set seed start
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set parallelism
    #[must_use]
    pub fn with_parallel(mut self, parallel: u32) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set frames per run
    #[must_use]
    pub fn with_frames(mut self, frames: u32) -> Self {
        self.frames = Some(frames);
        self
    }
}

/// Aggregate over a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Runs played
    pub runs: usize,
    /// Fraction of runs where every goal was met
    pub goals_met_rate: f64,
    /// Mean finished units per run
    pub mean_units: f64,
    /// Mean engine errors per run
    pub mean_errors: f64,
    /// Number of distinct final unit mixes
    pub distinct_outcomes: usize,
}

impl BatchSummary {
    /// Summarize finished runs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_runs(runs: &[RunReport]) -> Self {
        let count = runs.len();
        let mean = |total: usize| {
            if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            }
        };
        let met = runs.iter().filter(|r| r.goals_met()).count();
        let outcomes: BTreeSet<_> = runs.iter().map(|r| &r.units).collect();
        Self {
            runs: count,
            goals_met_rate: mean(met),
            mean_units: mean(runs.iter().map(RunReport::units_finished).sum()),
            mean_errors: mean(runs.iter().map(|r| r.errors.len()).sum()),
            distinct_outcomes: outcomes.len(),
        }
    }
}

/// Results from a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Scenario played
    pub scenario: String,
    /// Configuration used
    pub config: BatchConfig,
    /// Individual run reports, in seed order
    pub runs: Vec<RunReport>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

fn play(scenario: &Scenario, config: &BatchConfig) -> Vec<RunReport> {
    (0..config.runs)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(u64::from(i));
            let mut runner = HeadlessRunner::new(scenario.clone()).with_seed(seed);
            if let Some(frames) = config.frames {
                runner = runner.with_frames(frames);
            }
            runner.run()
        })
        .collect()
}

/// Run a batch of seeds against one scenario
#[must_use]
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    info!(
        "Starting batch run: {} runs of '{}'",
        config.runs, scenario.name
    );

    let pool = (config.parallel > 0)
        .then(|| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.parallel as usize)
                .build()
                .ok()
        })
        .flatten();
    let runs = match pool {
        Some(pool) => pool.install(|| play(scenario, &config)),
        None => play(scenario, &config),
    };

    let summary = BatchSummary::from_runs(&runs);
    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        "Batch complete: {} runs in {:.1}s, goals met in {:.0}%",
        runs.len(),
        duration_seconds,
        summary.goals_met_rate * 100.0
    );

    BatchResults {
        scenario: scenario.name.clone(),
        config,
        runs,
        summary,
        duration_seconds,
    }
}

/// Whether repeated runs of one seed produce identical reports
#[must_use]
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> bool {
    let runner = HeadlessRunner::new(scenario.clone()).with_seed(seed);
    let first = runner.run();
    (1..runs).all(|_| runner.run() == first)
}
