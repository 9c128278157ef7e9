//! Operator diagnostics: workflow dumps and chat commands.
//!
//! Nothing here feeds back into decisions.

use serde::{Deserialize, Serialize};

use crate::issuer::CommandRecord;
use crate::registry::ConstructionOrder;
use crate::scheduler::TaskScheduler;
use crate::units::UnitId;

/// Chat prefix that addresses the AI.
pub const CHAT_PREFIX: &str = ".csai";

/// Progress of one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalStatus {
    /// Goal priority.
    pub priority: f64,
    /// Goal type.
    pub unit_type: String,
    /// Units of the type that exist.
    pub existing: usize,
    /// Orders counted toward the goal.
    pub in_flight: usize,
    /// Desired quantity.
    pub desired: usize,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    /// Goals in configuration order.
    pub goals: Vec<GoalStatus>,
    /// Open orders in registration order.
    pub orders: Vec<ConstructionOrder>,
    /// Builders with a task in progress.
    pub active: Vec<UnitId>,
    /// `(assisting, assisted)` pairs.
    pub assisting: Vec<(UnitId, UnitId)>,
    /// Last command per unit.
    pub last_commands: Vec<(UnitId, CommandRecord)>,
}

impl DiagnosticReport {
    /// Capture the scheduler's current state.
    #[must_use]
    pub fn capture(scheduler: &TaskScheduler) -> Self {
        let roster = scheduler.roster();
        Self {
            goals: scheduler
                .goals()
                .iter()
                .map(|goal| GoalStatus {
                    priority: goal.priority,
                    unit_type: goal.unit_type.clone(),
                    existing: roster.count_of(&goal.unit_type),
                    in_flight: goal.in_flight.len(),
                    desired: goal.quantity,
                })
                .collect(),
            orders: scheduler.registry().orders().cloned().collect(),
            active: scheduler.active_constructors().collect(),
            assisting: scheduler
                .assisting()
                .iter()
                .map(|(unit, target)| (*unit, *target))
                .collect(),
            last_commands: scheduler
                .issuer()
                .records()
                .map(|(unit, record)| (*unit, record.clone()))
                .collect(),
        }
    }

    /// Render as operator-readable lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec!["Workflow:".to_string()];
        for goal in &self.goals {
            lines.push(format!(
                "goal priority: {} unit: {} quantity: {}({}) / {}",
                goal.priority, goal.unit_type, goal.existing, goal.in_flight, goal.desired
            ));
        }
        lines.push(format!("Orders: {}", self.orders.len()));
        for order in &self.orders {
            lines.push(format!(
                "order {} {:?} constructor: {} target: {} at {} spawned: {}",
                order.handle,
                order.state,
                order.constructor,
                order.target_type,
                order.expected_position,
                order
                    .spawned_unit
                    .map_or_else(|| "-".to_string(), |unit| unit.to_string())
            ));
        }
        for (unit, target) in &self.assisting {
            lines.push(format!("assist {unit} -> {target}"));
        }
        lines
    }
}

/// Operator command received over chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Dump goals and orders.
    DumpWorkflow,
    /// List commands.
    Help,
}

impl ConsoleCommand {
    /// Parse a chat line addressed to `team`.
    ///
    /// Accepts `.csai <cmd>`, `.csai* <cmd>` and `.csai<team> <cmd>`. Returns
    /// `None` for lines addressed elsewhere; unknown commands yield `Help`.
    #[must_use]
    pub fn parse(text: &str, team: u32) -> Option<Self> {
        let lowered = text.trim().to_ascii_lowercase();
        let rest = lowered.strip_prefix(CHAT_PREFIX)?;
        let (address, command) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if !(address.is_empty() || address == "*" || address == team.to_string()) {
            return None;
        }
        match command.split_whitespace().next() {
            Some("dumpworkflow") => Some(Self::DumpWorkflow),
            _ => Some(Self::Help),
        }
    }

    /// Reply listing the available commands.
    #[must_use]
    pub fn help_text(team: u32) -> String {
        format!(
            "commands available: help, dumpworkflow. Example: {CHAT_PREFIX}{team} dumpworkflow"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addressing() {
        assert_eq!(
            ConsoleCommand::parse(".csai dumpworkflow", 1),
            Some(ConsoleCommand::DumpWorkflow)
        );
        assert_eq!(
            ConsoleCommand::parse(".CSAI* DumpWorkflow", 1),
            Some(ConsoleCommand::DumpWorkflow)
        );
        assert_eq!(
            ConsoleCommand::parse(".csai1 dumpworkflow", 1),
            Some(ConsoleCommand::DumpWorkflow)
        );
        assert_eq!(ConsoleCommand::parse(".csai2 dumpworkflow", 1), None);
        assert_eq!(ConsoleCommand::parse("gg", 1), None);
    }

    #[test]
    fn test_unknown_command_is_help() {
        assert_eq!(ConsoleCommand::parse(".csai dance", 0), Some(ConsoleCommand::Help));
        assert_eq!(ConsoleCommand::parse(".csai", 0), Some(ConsoleCommand::Help));
    }

    #[test]
    fn test_help_text_names_team() {
        assert!(ConsoleCommand::help_text(3).contains(".csai3 dumpworkflow"));
    }
}
