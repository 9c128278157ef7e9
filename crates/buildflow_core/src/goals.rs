//! Standing production goals and the workflow configuration that defines them.
//!
//! Goals are data-driven. A [`WorkflowConfig`] is usually loaded from a RON
//! file:
//!
//! ```ron
//! (
//!     name: "Opening",
//!     goals: [
//!         (priority: 2.0, unit_type: "armmex", quantity: 4),
//!         (priority: 1.0, unit_type: "armsolar", quantity: 4),
//!     ],
//!     energy_unit_types: ["armsolar"],
//!     metal_unit_types: ["armmex"],
//! )
//! ```
//!
//! Every field has a default, so a file only needs to state what differs.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::registry::{MatchPolicy, OrderHandle, DEFAULT_MATCH_RADIUS};
use crate::units::normalize_type_name;

/// Index of a goal in its [`GoalBook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GoalId(pub usize);

/// A standing production target.
#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    /// Position in the book.
    pub id: GoalId,
    /// Higher is preferred.
    pub priority: f64,
    /// Type to produce (normalized).
    pub unit_type: String,
    /// How many should exist.
    pub quantity: usize,
    /// Orders currently counted toward the goal.
    pub in_flight: BTreeSet<OrderHandle>,
}

impl Goal {
    /// Whether more units are wanted, given how many already exist.
    ///
    /// Soft: a late completion notice can leave the sum one over for a cycle.
    #[must_use]
    pub fn wants_more(&self, existing: usize) -> bool {
        self.in_flight.len() + existing < self.quantity
    }
}

/// All goals, in configuration order. Goals live for the whole session.
#[derive(Debug, Clone, Default)]
pub struct GoalBook {
    goals: Vec<Goal>,
}

impl GoalBook {
    /// Build the book from configured specs.
    #[must_use]
    pub fn from_specs(specs: &[GoalSpec]) -> Self {
        let mut book = Self::default();
        for spec in specs {
            book.add(spec.priority, &spec.unit_type, spec.quantity as usize);
        }
        book
    }

    /// Append a goal.
    pub fn add(&mut self, priority: f64, unit_type: &str, quantity: usize) -> GoalId {
        let id = GoalId(self.goals.len());
        self.goals.push(Goal {
            id,
            priority,
            unit_type: normalize_type_name(unit_type),
            quantity,
            in_flight: BTreeSet::new(),
        });
        id
    }

    /// Look up a goal.
    #[must_use]
    pub fn get(&self, id: GoalId) -> Option<&Goal> {
        self.goals.get(id.0)
    }

    /// Count an order toward a goal.
    pub fn attach(&mut self, id: GoalId, handle: OrderHandle) {
        if let Some(goal) = self.goals.get_mut(id.0) {
            goal.in_flight.insert(handle);
        }
    }

    /// Stop counting an order. Returns whether any goal held it.
    pub fn release(&mut self, id: GoalId, handle: OrderHandle) -> bool {
        self.goals
            .get_mut(id.0)
            .is_some_and(|goal| goal.in_flight.remove(&handle))
    }

    /// Goals in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter()
    }

    /// Number of goals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.goals.len()
    }

    /// Whether there are no goals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

/// One configured goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSpec {
    /// Higher is preferred.
    pub priority: f64,
    /// Type to produce.
    pub unit_type: String,
    /// How many should exist.
    pub quantity: u32,
}

impl GoalSpec {
    /// Create a goal spec.
    #[must_use]
    pub fn new(priority: f64, unit_type: impl Into<String>, quantity: u32) -> Self {
        Self {
            priority,
            unit_type: unit_type.into(),
            quantity,
        }
    }
}

/// What to do when the team has no way to build constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Types that count as a low-tier mobile constructor.
    pub level1_constructor_types: Vec<String>,
    /// Type to build when none exists.
    pub constructor_type: String,
    /// The starting commander; while it lives no bootstrap is needed.
    pub commander_type: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            level1_constructor_types: vec!["armcv".to_string(), "armck".to_string()],
            constructor_type: "armcv".to_string(),
            commander_type: "armcom".to_string(),
        }
    }
}

/// Complete decision-engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Configuration name, for logs.
    pub name: String,
    /// Team number this AI plays; addresses operator chat commands.
    pub team: u32,
    /// Seed for tie-breaking between equal-priority goals.
    pub seed: u64,
    /// Standing production goals.
    pub goals: Vec<GoalSpec>,
    /// Energy producers, most preferred first.
    pub energy_unit_types: Vec<String>,
    /// Metal extractors, most preferred first.
    pub metal_unit_types: Vec<String>,
    /// Bootstrap rule.
    pub bootstrap: BootstrapConfig,
    /// Spawn match radius in world units.
    pub match_radius: i32,
    /// Spawn match policy.
    pub match_policy: MatchPolicy,
    /// Frames between idle sweeps.
    pub idle_check_interval: u32,
    /// Build-site search radius around a mobile builder.
    pub build_search_radius: i32,
    /// Build-site search radius around a metal spot.
    pub metal_site_radius: i32,
    /// Reclaim order radius.
    pub reclaim_radius: i32,
    /// Whether operator chat commands are honoured.
    pub debug_commands: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            team: 0,
            seed: 0,
            goals: vec![
                GoalSpec::new(2.0, "armmex", 4),
                GoalSpec::new(1.5, "armvp", 1),
                GoalSpec::new(1.2, "armcv", 2),
                GoalSpec::new(1.0, "armsolar", 4),
                GoalSpec::new(0.5, "armstump", 20),
            ],
            energy_unit_types: vec!["armsolar".to_string()],
            metal_unit_types: vec!["armmex".to_string()],
            bootstrap: BootstrapConfig::default(),
            match_radius: DEFAULT_MATCH_RADIUS,
            match_policy: MatchPolicy::default(),
            idle_check_interval: 30,
            build_search_radius: 1400,
            metal_site_radius: 100,
            reclaim_radius: 100,
            debug_commands: false,
        }
    }
}

impl WorkflowConfig {
    /// Load a configuration from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: WorkflowConfig = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot act on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for goal in &self.goals {
            let name = normalize_type_name(&goal.unit_type);
            if name.is_empty() {
                return Err(ConfigError::Invalid("goal with empty unit type".into()));
            }
            if !goal.priority.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "goal {name} has non-finite priority"
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate goal {name}")));
            }
        }
        if self.match_radius <= 0 {
            return Err(ConfigError::Invalid("match_radius must be positive".into()));
        }
        if self.idle_check_interval == 0 {
            return Err(ConfigError::Invalid(
                "idle_check_interval must be at least one frame".into(),
            ));
        }
        Ok(())
    }

    /// Whether `type_name` is one of the metal extractor types.
    #[must_use]
    pub fn is_metal_unit(&self, type_name: &str) -> bool {
        let name = normalize_type_name(type_name);
        self.metal_unit_types
            .iter()
            .any(|t| normalize_type_name(t) == name)
    }
}
