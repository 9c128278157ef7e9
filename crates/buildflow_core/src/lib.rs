//! # Buildflow Core
//!
//! Construction decision engine for an RTS game AI.
//!
//! Given unit-lifecycle notifications from a game host, the engine decides
//! what each idle construction unit builds next, matches newly created units
//! back to the order that requested them, and keeps goal progress in step.
//!
//! This crate contains **only** decision logic:
//! - No rendering
//! - No engine IO (everything goes through the [`host`] traits)
//! - No system randomness (tie-breaks use a seeded RNG)
//!
//! ## Crate Structure
//!
//! - [`registry`] - Construction orders and spawn matching
//! - [`scheduler`] - Idle-unit goal selection and fallback chain
//! - [`issuer`] - Intent to host command translation
//! - [`dispatch`] - Re-entrancy-safe event entry point
//! - [`goals`] - Production goals and workflow configuration
//! - [`host`] - The engine seam
//! - [`diagnostics`] - Operator dumps and chat commands

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod command;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod goals;
pub mod host;
pub mod issuer;
pub mod math;
pub mod registry;
pub mod scheduler;
pub mod units;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::command::Command;
    pub use crate::diagnostics::{ConsoleCommand, DiagnosticReport};
    pub use crate::dispatch::{DispatchReport, Engine, HostEvent};
    pub use crate::error::{AiError, ConfigError, GatewayError, Result};
    pub use crate::goals::{GoalBook, GoalId, GoalSpec, WorkflowConfig};
    pub use crate::host::{
        BuildTree, CommandGateway, Host, ResourceOracle, ResourceSnapshot, SiteFinder,
    };
    pub use crate::issuer::{CommandRecord, OrderIssuer};
    pub use crate::math::{Fixed, Vec3Fixed};
    pub use crate::registry::{
        ConstructionOrder, MatchPolicy, OrderEvent, OrderHandle, OrderNotification, OrderOwner,
        OrderRegistry, OrderState,
    };
    pub use crate::scheduler::{Decision, TaskScheduler};
    pub use crate::units::{UnitDef, UnitId, UnitRoster};
}
