//! Primitive orders submitted to the host.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{Fixed, Vec3Fixed};
use crate::units::UnitId;

/// A single primitive order for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Construct a unit. Mobile builders place it at `position`; factories
    /// produce it in place and take no position.
    Build {
        /// Type name of the unit to build.
        unit_type: String,
        /// Placement, if the builder is mobile.
        position: Option<Vec3Fixed>,
    },
    /// Move to a position.
    MoveTo(Vec3Fixed),
    /// Guard another unit; for constructors this assists its construction.
    Guard(UnitId),
    /// Attack a specific unit.
    Attack(UnitId),
    /// Reclaim features within `radius` of `position`.
    Reclaim {
        /// Centre of the reclaim area.
        position: Vec3Fixed,
        /// Reclaim radius in world units.
        #[serde(with = "crate::math::fixed_serde")]
        radius: Fixed,
    },
    /// Stop all actions.
    Stop,
    /// Self-destruct.
    SelfDestruct,
}

impl Command {
    /// Build order for a mobile builder.
    #[must_use]
    pub fn build_at(unit_type: impl Into<String>, position: Vec3Fixed) -> Self {
        Self::Build {
            unit_type: unit_type.into(),
            position: Some(position),
        }
    }

    /// Build order for a factory.
    #[must_use]
    pub fn build_in_place(unit_type: impl Into<String>) -> Self {
        Self::Build {
            unit_type: unit_type.into(),
            position: None,
        }
    }

    /// The type being built, if this is a build order.
    #[must_use]
    pub fn build_type(&self) -> Option<&str> {
        match self {
            Self::Build { unit_type, .. } => Some(unit_type),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build {
                unit_type,
                position: Some(pos),
            } => write!(f, "build {unit_type} at {pos}"),
            Self::Build {
                unit_type,
                position: None,
            } => write!(f, "build {unit_type}"),
            Self::MoveTo(pos) => write!(f, "move to {pos}"),
            Self::Guard(target) => write!(f, "guard {target}"),
            Self::Attack(target) => write!(f, "attack {target}"),
            Self::Reclaim { position, radius } => write!(f, "reclaim at {position} r{radius}"),
            Self::Stop => write!(f, "stop"),
            Self::SelfDestruct => write!(f, "self-destruct"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_descriptions() {
        assert_eq!(
            Command::build_at("armsolar", Vec3Fixed::from_ints(10, 0, 20)).to_string(),
            "build armsolar at (10, 0, 20)"
        );
        assert_eq!(Command::build_in_place("armcv").to_string(), "build armcv");
        assert_eq!(Command::Guard(UnitId(4)).to_string(), "guard 4");
    }

    #[test]
    fn test_reclaim_serializes_radius_bits() {
        let command = Command::Reclaim {
            position: Vec3Fixed::from_ints(5, 0, 5),
            radius: Fixed::from_num(300),
        };
        let text = ron::to_string(&command).unwrap();
        assert!(text.contains(&(300_i64 << 32).to_string()));
        let back: Command = ron::from_str(&text).unwrap();
        assert_eq!(back, command);
    }

    #[test]
    fn test_build_type() {
        assert_eq!(Command::build_in_place("armcv").build_type(), Some("armcv"));
        assert_eq!(Command::Stop.build_type(), None);
    }
}
