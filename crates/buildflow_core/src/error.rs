//! Error types for the decision engine.

use thiserror::Error;

use crate::command::Command;
use crate::units::UnitId;

/// Result type alias using [`AiError`].
pub type Result<T> = std::result::Result<T, AiError>;

/// Failure reported by the host when it refuses a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The host refused the order.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// The host does not know the unit.
    #[error("unit {0} not found")]
    UnitNotFound(UnitId),
}

/// Failure while loading or validating a [`crate::goals::WorkflowConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Workflow config not found: {0}")]
    FileNotFound(String),

    /// Failed to read file.
    #[error("Failed to read workflow config: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse RON.
    #[error("Failed to parse workflow config: {0}")]
    ParseError(#[from] ron::error::SpannedError),

    /// Parsed but semantically invalid.
    #[error("Invalid workflow config: {0}")]
    Invalid(String),
}

/// Top-level error type for the decision engine.
#[derive(Debug, Error)]
pub enum AiError {
    /// The host refused an order; the decision for this cycle is abandoned.
    #[error("host rejected `{command}` for unit {unit}: {source}")]
    Gateway {
        /// Acting unit.
        unit: UnitId,
        /// The command that was refused.
        command: Command,
        /// Host-reported cause.
        #[source]
        source: GatewayError,
    },

    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AiError {
    /// Whether this error came from the host refusing an order.
    #[must_use]
    pub fn is_gateway_rejection(&self) -> bool {
        matches!(self, Self::Gateway { .. })
    }
}
