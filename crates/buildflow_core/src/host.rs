//! The narrow interface to the game engine.
//!
//! The decision engine never talks to the engine directly. Everything it
//! needs is expressed as one of four traits, so that a live engine binding,
//! the headless sandbox and test fakes are interchangeable:
//!
//! - [`CommandGateway`] - order submission and per-unit queries
//! - [`ResourceOracle`] - affordability and current resource levels
//! - [`BuildTree`] - build-tree legality
//! - [`SiteFinder`] - placement, metal spots and reclaimable features
//!
//! All calls are expected to be synchronous and fast. Implementations may
//! re-enter [`crate::dispatch::Engine::dispatch`] from inside any of them.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::GatewayError;
use crate::math::{Fixed, Vec3Fixed};
use crate::units::{UnitDef, UnitId};

/// Order submission and unit queries.
pub trait CommandGateway {
    /// Submit one primitive order.
    ///
    /// # Errors
    /// Returns an error if the host refuses the order.
    fn give_order(&mut self, unit: UnitId, command: &Command) -> Result<(), GatewayError>;

    /// Current position of a friendly unit.
    fn unit_position(&self, unit: UnitId) -> Option<Vec3Fixed>;

    /// Whether the unit has queued work.
    fn unit_is_busy(&self, unit: UnitId) -> bool;

    /// Current simulation frame.
    fn current_frame(&self) -> u32;

    /// Definition of a unit type by name.
    fn unit_def(&self, type_name: &str) -> Option<UnitDef>;

    /// Every friendly unit currently deployed, with its type name.
    ///
    /// Used once on activation to pick up units that existed before the AI
    /// was attached.
    fn friendly_units(&self) -> Vec<(UnitId, String)>;

    /// Send an operator-visible text line.
    fn send_text(&mut self, _text: &str) {}
}

/// Snapshot of the team's resource stockpiles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Current metal.
    pub metal: f64,
    /// Metal storage capacity.
    pub metal_storage: f64,
    /// Current energy.
    pub energy: f64,
    /// Energy storage capacity.
    pub energy_storage: f64,
}

impl ResourceSnapshot {
    /// Fraction of storage below which a reserve counts as low.
    pub const LOW_RESERVE_DIVISOR: f64 = 5.0;

    /// Energy reserve is below one-fifth of storage.
    #[must_use]
    pub fn energy_low(&self) -> bool {
        self.energy < self.energy_storage / Self::LOW_RESERVE_DIVISOR
    }

    /// Metal reserve is below one-fifth of storage.
    #[must_use]
    pub fn metal_low(&self) -> bool {
        self.metal < self.metal_storage / Self::LOW_RESERVE_DIVISOR
    }
}

/// Resource feasibility predicates.
pub trait ResourceOracle {
    /// Whether the metal economy can currently support building `def`.
    fn can_afford_metal(&self, def: &UnitDef) -> bool;

    /// Whether the energy economy can currently support building `def`.
    fn can_afford_energy(&self, def: &UnitDef) -> bool;

    /// Current stockpiles.
    fn resources(&self) -> ResourceSnapshot;
}

/// Build-tree legality.
pub trait BuildTree {
    /// Whether units of `builder_type` can construct `target_type`.
    fn can_build(&self, builder_type: &str, target_type: &str) -> bool;
}

/// Map queries used for placement.
pub trait SiteFinder {
    /// Closest legal placement for `unit_type` within `radius` of `near`.
    fn find_build_site(&self, unit_type: &str, near: Vec3Fixed, radius: Fixed)
        -> Option<Vec3Fixed>;

    /// Nearest metal deposit to `pos`.
    fn nearest_metal_spot(&self, pos: Vec3Fixed) -> Vec3Fixed;

    /// Nearest reclaimable wreck or feature worth sending `unit` to.
    fn find_reclaimable(&self, pos: Vec3Fixed, unit: UnitId) -> Option<Vec3Fixed>;
}

/// Everything the scheduler needs from the engine.
pub trait Host: CommandGateway + ResourceOracle + BuildTree + SiteFinder {}

impl<T> Host for T where T: CommandGateway + ResourceOracle + BuildTree + SiteFinder {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_reserve_thresholds() {
        let snapshot = ResourceSnapshot {
            metal: 199.0,
            metal_storage: 1000.0,
            energy: 200.0,
            energy_storage: 1000.0,
        };
        assert!(snapshot.metal_low());
        assert!(!snapshot.energy_low());
    }

    #[test]
    fn test_empty_storage_is_never_low() {
        let snapshot = ResourceSnapshot::default();
        assert!(!snapshot.metal_low());
        assert!(!snapshot.energy_low());
    }
}
