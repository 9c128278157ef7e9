//! Scenario loading and configuration.
//!
//! Scenarios define the sandbox world for headless runs: the unit catalog
//! and build tree, starting units, economy, metal spots, reclaimable
//! features and the workflow configuration the AI plays with.

use std::collections::HashSet;
use std::path::Path;

use buildflow_core::error::ConfigError;
use buildflow_core::goals::{GoalSpec, WorkflowConfig};
use buildflow_core::units::{normalize_type_name, UnitDef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Embedded workflow configuration is invalid.
    #[error("Invalid scenario workflow: {0}")]
    Workflow(#[from] ConfigError),
    /// References a type missing from the catalog, or similar.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// What a catalog type can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// Mobile constructor.
    Builder,
    /// Static constructor.
    Factory,
    /// Static non-builder.
    Structure,
    /// Mobile non-builder.
    Mobile,
}

/// One buildable type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Internal type name.
    pub name: String,
    /// Display name.
    pub human_name: String,
    /// Capabilities.
    pub kind: UnitKind,
    /// Metal paid when construction starts.
    #[serde(default)]
    pub metal_cost: f64,
    /// Energy paid when construction starts.
    #[serde(default)]
    pub energy_cost: f64,
    /// Frames of work for a single builder.
    #[serde(default)]
    pub build_frames: u32,
    /// Metal produced per frame once finished.
    #[serde(default)]
    pub metal_income: f64,
    /// Energy produced per frame once finished.
    #[serde(default)]
    pub energy_income: f64,
}

impl CatalogEntry {
    /// Create an entry with no cost and no income.
    #[must_use]
    pub fn new(name: impl Into<String>, human_name: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            name: name.into(),
            human_name: human_name.into(),
            kind,
            metal_cost: 0.0,
            energy_cost: 0.0,
            build_frames: 0,
            metal_income: 0.0,
            energy_income: 0.0,
        }
    }

    /// Set costs and build time.
    #[must_use]
    pub fn costing(mut self, metal: f64, energy: f64, build_frames: u32) -> Self {
        self.metal_cost = metal;
        self.energy_cost = energy;
        self.build_frames = build_frames;
        self
    }

    /// Set per-frame income.
    #[must_use]
    pub fn producing(mut self, metal: f64, energy: f64) -> Self {
        self.metal_income = metal;
        self.energy_income = energy;
        self
    }

    /// Host-facing definition.
    #[must_use]
    pub fn def(&self) -> UnitDef {
        match self.kind {
            UnitKind::Builder => UnitDef::mobile_builder(&*self.name, &*self.human_name),
            UnitKind::Factory => UnitDef::factory(&*self.name, &*self.human_name),
            UnitKind::Structure => UnitDef::structure(&*self.name, &*self.human_name),
            UnitKind::Mobile => UnitDef::new(&*self.name, &*self.human_name),
        }
    }

    /// Whether the type occupies a build site.
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self.kind, UnitKind::Factory | UnitKind::Structure)
    }
}

/// Types one builder type can construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Builder type.
    pub builder: String,
    /// Constructible types.
    pub targets: Vec<String>,
}

impl BuildOptions {
    /// Create build options.
    #[must_use]
    pub fn new(builder: &str, targets: &[&str]) -> Self {
        Self {
            builder: builder.to_string(),
            targets: targets.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

/// A starting unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit type.
    pub unit_type: String,
    /// World position (x, z).
    pub position: (i32, i32),
}

impl UnitPlacement {
    /// Create a placement.
    #[must_use]
    pub fn new(unit_type: impl Into<String>, x: i32, z: i32) -> Self {
        Self {
            unit_type: unit_type.into(),
            position: (x, z),
        }
    }
}

/// A wreck or feature worth reclaiming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// World position (x, z).
    pub position: (i32, i32),
    /// Metal recovered.
    pub metal: f64,
}

/// Starting stockpiles and base income.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomySetup {
    /// Starting metal.
    pub metal: f64,
    /// Metal storage.
    pub metal_storage: f64,
    /// Starting energy.
    pub energy: f64,
    /// Energy storage.
    pub energy_storage: f64,
    /// Metal per frame before any producer.
    pub base_metal_income: f64,
    /// Energy per frame before any producer.
    pub base_energy_income: f64,
}

impl Default for EconomySetup {
    fn default() -> Self {
        Self {
            metal: 1000.0,
            metal_storage: 1000.0,
            energy: 1000.0,
            energy_storage: 1000.0,
            base_metal_income: 0.0,
            base_energy_income: 0.0,
        }
    }
}

/// A chat line delivered at a given frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedMessage {
    /// Frame to deliver on.
    pub frame: u32,
    /// Sending player.
    #[serde(default)]
    pub player: u32,
    /// Message text.
    pub text: String,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Frames to simulate.
    pub frames: u32,
    /// Buildable types.
    pub catalog: Vec<CatalogEntry>,
    /// Build tree.
    pub build_tree: Vec<BuildOptions>,
    /// Units present at frame 0.
    pub units: Vec<UnitPlacement>,
    /// Economy.
    pub economy: EconomySetup,
    /// Metal deposits (x, z).
    pub metal_spots: Vec<(i32, i32)>,
    /// Reclaimable features.
    pub features: Vec<Feature>,
    /// Grid spacing between structures.
    pub site_spacing: i32,
    /// How far builders look for features to reclaim.
    pub reclaim_search_radius: i32,
    /// Frames a reclaim order takes.
    pub reclaim_frames: u32,
    /// Command kinds the sandbox refuses (`build`, `guard`, `reclaim`, ...).
    pub rejected_commands: Vec<String>,
    /// Scripted operator chat.
    pub messages: Vec<ScriptedMessage>,
    /// AI configuration.
    pub workflow: WorkflowConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::opening()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check that every referenced type is in the catalog.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.workflow.validate()?;

        let mut names = HashSet::new();
        for entry in &self.catalog {
            if !names.insert(normalize_type_name(&entry.name)) {
                return Err(ScenarioError::Invalid(format!(
                    "duplicate catalog entry {}",
                    entry.name
                )));
            }
        }
        let known = |name: &str| names.contains(&normalize_type_name(name));

        for unit in &self.units {
            if !known(unit.unit_type.as_str()) {
                return Err(ScenarioError::Invalid(format!(
                    "starting unit of unknown type {}",
                    unit.unit_type
                )));
            }
        }
        for options in &self.build_tree {
            let unknown = std::iter::once(&options.builder)
                .chain(&options.targets)
                .find(|name| !known(name.as_str()));
            if let Some(name) = unknown {
                return Err(ScenarioError::Invalid(format!(
                    "build tree names unknown type {name}"
                )));
            }
        }
        if self.site_spacing <= 0 {
            return Err(ScenarioError::Invalid("site_spacing must be positive".into()));
        }
        Ok(())
    }

    /// A single commander on a small map with four metal spots.
    #[must_use]
    pub fn opening() -> Self {
        Self {
            name: "Opening".to_string(),
            description: "Commander start with a vehicle plant tech path".to_string(),
            frames: 9000,
            catalog: arm_catalog(),
            build_tree: vec![
                BuildOptions::new("armcom", &["armmex", "armsolar", "armvp"]),
                BuildOptions::new("armcv", &["armmex", "armsolar", "armvp"]),
                BuildOptions::new("armvp", &["armcv", "armstump"]),
            ],
            units: vec![UnitPlacement::new("armcom", 1000, 1000)],
            economy: EconomySetup::default(),
            metal_spots: vec![(1200, 1000), (800, 1100), (1100, 700), (1500, 1400)],
            features: vec![Feature {
                position: (1300, 900),
                metal: 250.0,
            }],
            site_spacing: 64,
            reclaim_search_radius: 1000,
            reclaim_frames: 90,
            rejected_commands: Vec::new(),
            messages: Vec::new(),
            workflow: WorkflowConfig {
                name: "Opening".to_string(),
                goals: vec![
                    GoalSpec::new(2.0, "armmex", 4),
                    GoalSpec::new(1.5, "armvp", 1),
                    GoalSpec::new(1.2, "armcv", 2),
                    GoalSpec::new(1.0, "armsolar", 4),
                    GoalSpec::new(0.5, "armstump", 6),
                ],
                ..WorkflowConfig::default()
            },
        }
    }
}

fn arm_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("armcom", "Commander", UnitKind::Builder).producing(0.07, 0.7),
        CatalogEntry::new("armcv", "Construction Vehicle", UnitKind::Builder)
            .costing(130.0, 800.0, 900),
        CatalogEntry::new("armvp", "Vehicle Plant", UnitKind::Factory)
            .costing(600.0, 900.0, 1800),
        CatalogEntry::new("armmex", "Metal Extractor", UnitKind::Structure)
            .costing(50.0, 500.0, 300)
            .producing(0.06, 0.0),
        CatalogEntry::new("armsolar", "Solar Collector", UnitKind::Structure)
            .costing(150.0, 0.0, 600)
            .producing(0.0, 0.7),
        CatalogEntry::new("armstump", "Stumpy", UnitKind::Mobile).costing(100.0, 700.0, 500),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_is_valid() {
        let scenario = Scenario::opening();
        assert!(scenario.validate().is_ok());
        assert_eq!(scenario.units.len(), 1);
        assert_eq!(scenario.metal_spots.len(), 4);
    }

    #[test]
    fn test_parse_partial_ron() {
        let ron = r#"
            Scenario(
                name: "Tiny",
                frames: 100,
                units: [(unit_type: "armcom", position: (0, 0))],
                workflow: (goals: [(priority: 1.0, unit_type: "armsolar", quantity: 2)]),
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "Tiny");
        assert_eq!(scenario.frames, 100);
        assert_eq!(scenario.catalog.len(), 6);
        assert_eq!(scenario.workflow.goals.len(), 1);
    }

    #[test]
    fn test_unknown_unit_type_rejected() {
        let ron = r#"Scenario(units: [(unit_type: "corcom", position: (0, 0))])"#;
        assert!(matches!(
            Scenario::from_ron_str(ron),
            Err(ScenarioError::Invalid(_))
        ));
    }

    #[test]
    fn test_bad_workflow_rejected() {
        let ron = r#"Scenario(workflow: (idle_check_interval: 0))"#;
        assert!(matches!(
            Scenario::from_ron_str(ron),
            Err(ScenarioError::Workflow(_))
        ));
    }

    #[test]
    fn test_catalog_defs() {
        let scenario = Scenario::opening();
        let factory = scenario.catalog.iter().find(|e| e.name == "armvp").unwrap();
        let def = factory.def();
        assert!(def.can_build);
        assert!(!def.is_mobile);
        assert!(factory.is_static());
    }
}
