//! Headless scenario runner.
//!
//! Drives an [`Engine`] against a [`SandboxHost`] frame by frame: host
//! events first, then any scripted chat for the frame, then the tick.

use std::collections::BTreeMap;

use buildflow_core::diagnostics::GoalStatus;
use buildflow_core::dispatch::{DispatchReport, Engine, HostEvent};
use buildflow_core::host::{ResourceOracle, ResourceSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sandbox::{SandboxHost, SandboxStats};
use crate::scenario::Scenario;

/// Outcome of one headless run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Tie-break seed used.
    pub seed: u64,
    /// Frames simulated.
    pub frames: u32,
    /// Events handled by the engine, ticks included.
    pub events: usize,
    /// Errors the engine reported, in order.
    pub errors: Vec<String>,
    /// Finished units by type at the end of the run.
    pub units: BTreeMap<String, usize>,
    /// Goal progress at the end of the run.
    pub goals: Vec<GoalStatus>,
    /// Open orders at the end of the run.
    pub open_orders: usize,
    /// Final stockpiles.
    pub resources: ResourceSnapshot,
    /// Sandbox counters.
    pub stats: SandboxStats,
    /// Lines the AI sent to chat.
    pub chat: Vec<String>,
}

impl RunReport {
    /// Whether every goal reached its quantity with finished units.
    #[must_use]
    pub fn goals_met(&self) -> bool {
        self.goals.iter().all(|goal| goal.existing >= goal.desired)
    }

    /// Finished units of all types.
    #[must_use]
    pub fn units_finished(&self) -> usize {
        self.units.values().sum()
    }

    /// Pretty JSON form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs one scenario to completion.
#[derive(Debug, Clone)]
pub struct HeadlessRunner {
    scenario: Scenario,
}

impl HeadlessRunner {
    /// Create a runner for a scenario.
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }

    /// Override the workflow's tie-break seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.scenario.workflow.seed = seed;
        self
    }

    /// Override the number of frames.
    #[must_use]
    pub fn with_frames(mut self, frames: u32) -> Self {
        self.scenario.frames = frames;
        self
    }

    /// Scenario this runner plays.
    #[must_use]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Play every frame and report the outcome.
    #[must_use]
    pub fn run(&self) -> RunReport {
        let scenario = &self.scenario;
        info!(
            scenario = %scenario.name,
            seed = scenario.workflow.seed,
            frames = scenario.frames,
            "Starting headless run"
        );

        let engine = Engine::new(scenario.workflow.clone(), SandboxHost::new(scenario));
        let mut errors: Vec<String> = engine.activate().iter().map(ToString::to_string).collect();
        let mut events = 0;
        let mut record = |report: DispatchReport| {
            events += report.processed;
            errors.extend(report.errors.iter().map(ToString::to_string));
        };

        for frame in 1..=scenario.frames {
            for event in engine.with_host(SandboxHost::advance) {
                record(engine.dispatch(event));
            }
            for message in scenario.messages.iter().filter(|m| m.frame == frame) {
                debug!(frame, text = %message.text, "Delivering scripted chat");
                record(engine.dispatch(HostEvent::ChatMessage {
                    text: message.text.clone(),
                    player: message.player,
                }));
            }
            record(engine.dispatch(HostEvent::Tick));
        }

        let snapshot = engine.snapshot();
        let host = engine.into_host();
        let report = RunReport {
            scenario: scenario.name.clone(),
            seed: scenario.workflow.seed,
            frames: scenario.frames,
            events,
            errors,
            units: host.unit_counts(),
            goals: snapshot.goals,
            open_orders: snapshot.orders.len(),
            resources: host.resources(),
            stats: host.stats().clone(),
            chat: host.texts().to_vec(),
        };
        info!(
            units = report.units_finished(),
            errors = report.errors.len(),
            goals_met = report.goals_met(),
            "Headless run complete"
        );
        report
    }
}

/// Run a scenario with its own seed and frame count.
#[must_use]
pub fn run_scenario(scenario: &Scenario) -> RunReport {
    HeadlessRunner::new(scenario.clone()).run()
}
