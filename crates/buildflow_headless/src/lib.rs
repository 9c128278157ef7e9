//! Headless sandbox runner for the buildflow construction AI.
//!
//! This crate plays the decision engine against a deterministic sandbox
//! host instead of a live game. It is used for:
//!
//! - **Regression testing**: a scenario and seed always produce the same report
//! - **Tuning**: batch sweeps over seeds show how reliably goals are met
//! - **Debugging**: scripted operator chat exercises `dumpworkflow`
//!
//! # Example
//!
//! ```bash
//! # Play the built-in opening and print the report
//! cargo run -p buildflow_headless -- run
//!
//! # Sweep 64 seeds of a scenario file
//! cargo run -p buildflow_headless -- batch --scenario scenarios/opening.ron --count 64
//! ```
//!
//! Reports go to stdout as JSON; logs go to stderr.

pub mod batch;
pub mod runner;
pub mod sandbox;
pub mod scenario;

pub use batch::{run_batch, BatchConfig, BatchResults, BatchSummary};
pub use runner::{run_scenario, HeadlessRunner, RunReport};
pub use sandbox::{SandboxHost, SandboxStats};
pub use scenario::{Scenario, ScenarioError};
