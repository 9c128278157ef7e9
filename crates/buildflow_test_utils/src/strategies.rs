//! Proptest strategies for registry and scheduler inputs.

use buildflow_core::math::{Fixed, Vec3Fixed};
use buildflow_core::units::UnitId;
use proptest::prelude::*;

/// Type names drawn by the strategies.
pub const TYPE_NAMES: [&str; 3] = ["armmex", "armsolar", "armvp"];

/// One registry mutation.
#[derive(Debug, Clone)]
pub enum RegistryOp {
    /// `register_order`.
    Register {
        /// Builder.
        constructor: UnitId,
        /// Ordered type.
        target: &'static str,
        /// Expected position.
        position: Vec3Fixed,
    },
    /// `signal_constructor_idle`.
    Idle {
        /// Builder.
        constructor: UnitId,
    },
    /// `on_unit_created`.
    Created {
        /// New unit.
        unit: UnitId,
        /// Its type.
        unit_type: &'static str,
        /// Spawn position.
        position: Vec3Fixed,
    },
    /// `on_unit_finished`.
    Finished {
        /// Finished unit.
        unit: UnitId,
        /// Its type.
        unit_type: &'static str,
    },
    /// `on_unit_destroyed`.
    Destroyed {
        /// Dead unit.
        unit: UnitId,
    },
}

/// Generate a fixed-point coordinate.
///
/// Range: -4000 to 4000, so that many positions fall inside the match
/// radius of each other.
pub fn arb_coordinate() -> impl Strategy<Value = Fixed> {
    (-4000i32..4000i32).prop_map(Fixed::from_num)
}

/// Generate a ground-level position.
pub fn arb_position() -> impl Strategy<Value = Vec3Fixed> {
    (arb_coordinate(), arb_coordinate()).prop_map(|(x, z)| Vec3Fixed::new(x, Fixed::ZERO, z))
}

/// Generate a builder id (1-6).
pub fn arb_constructor() -> impl Strategy<Value = UnitId> {
    (1u32..=6).prop_map(UnitId)
}

/// Generate a spawned unit id (100-111).
pub fn arb_spawned() -> impl Strategy<Value = UnitId> {
    (100u32..112).prop_map(UnitId)
}

/// Generate one of [`TYPE_NAMES`].
pub fn arb_type_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(TYPE_NAMES.to_vec())
}

/// Generate any registry mutation.
pub fn arb_registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        3 => (arb_constructor(), arb_type_name(), arb_position()).prop_map(
            |(constructor, target, position)| RegistryOp::Register {
                constructor,
                target,
                position,
            }
        ),
        1 => arb_constructor().prop_map(|constructor| RegistryOp::Idle { constructor }),
        2 => (arb_spawned(), arb_type_name(), arb_position()).prop_map(
            |(unit, unit_type, position)| RegistryOp::Created {
                unit,
                unit_type,
                position,
            }
        ),
        1 => (arb_spawned(), arb_type_name())
            .prop_map(|(unit, unit_type)| RegistryOp::Finished { unit, unit_type }),
        1 => prop_oneof![arb_constructor(), arb_spawned()]
            .prop_map(|unit| RegistryOp::Destroyed { unit }),
    ]
}

/// Generate a sequence of registry mutations.
pub fn arb_registry_ops(max_len: usize) -> impl Strategy<Value = Vec<RegistryOp>> {
    proptest::collection::vec(arb_registry_op(), 0..max_len)
}
