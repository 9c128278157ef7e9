//! Test fixtures and helpers.
//!
//! A small Arm-faction catalog and build tree, plus configurations
//! for consistent testing.

use buildflow_core::goals::{GoalSpec, WorkflowConfig};
use buildflow_core::host::ResourceSnapshot;
use buildflow_core::math::{Fixed, Vec3Fixed};
use buildflow_core::units::UnitDef;

use crate::fake_host::FakeHost;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Ground-level position from whole world units.
#[must_use]
pub fn pos(x: i32, z: i32) -> Vec3Fixed {
    Vec3Fixed::from_ints(x, 0, z)
}

/// Unit types used across tests.
#[must_use]
pub fn arm_catalog() -> Vec<UnitDef> {
    vec![
        UnitDef::mobile_builder("armcom", "Commander"),
        UnitDef::mobile_builder("armcv", "Construction Vehicle"),
        UnitDef::mobile_builder("armck", "Construction Kbot"),
        UnitDef::factory("armvp", "Vehicle Plant"),
        UnitDef::structure("armmex", "Metal Extractor"),
        UnitDef::structure("armsolar", "Solar Collector"),
        UnitDef::new("armstump", "Stumpy"),
    ]
}

/// Fake host with [`arm_catalog`] and its build tree.
///
/// Mobile builders build `armmex`, `armsolar` and `armvp`; the vehicle
/// plant builds `armcv` and `armstump`.
#[must_use]
pub fn arm_host() -> FakeHost {
    let mut host = FakeHost::new();
    for def in arm_catalog() {
        host.add_def(def);
    }
    let structures = ["armmex", "armsolar", "armvp"];
    host.with_build_options("armcom", &structures)
        .with_build_options("armcv", &structures)
        .with_build_options("armck", &structures)
        .with_build_options("armvp", &["armcv", "armstump"])
}

/// Two goals: `armmex` x4 at priority 2, `armsolar` x4 at priority 1.
#[must_use]
pub fn mex_solar_config() -> WorkflowConfig {
    WorkflowConfig {
        name: "MexSolar".to_string(),
        goals: vec![
            GoalSpec::new(2.0, "armmex", 4),
            GoalSpec::new(1.0, "armsolar", 4),
        ],
        ..WorkflowConfig::default()
    }
}

/// Reserves with energy below one-fifth of storage.
#[must_use]
pub fn low_energy() -> ResourceSnapshot {
    ResourceSnapshot {
        metal: 800.0,
        metal_storage: 1000.0,
        energy: 100.0,
        energy_storage: 1000.0,
    }
}

/// Reserves with metal below one-fifth of storage.
#[must_use]
pub fn low_metal() -> ResourceSnapshot {
    ResourceSnapshot {
        metal: 50.0,
        metal_storage: 1000.0,
        energy: 800.0,
        energy_storage: 1000.0,
    }
}
