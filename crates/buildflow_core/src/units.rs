//! Unit identities, definitions and the roster of deployed friendly units.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Host-assigned identifier of a deployed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl UnitId {
    /// Create a new unit ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static properties of a unit type, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDef {
    /// Internal type name (e.g. `armsolar`).
    pub name: String,
    /// Display name.
    pub human_name: String,
    /// Whether units of this type can construct other units.
    pub can_build: bool,
    /// Whether the type moves. Static builders are factories.
    pub is_mobile: bool,
}

impl UnitDef {
    /// Create a definition for a unit that cannot build.
    #[must_use]
    pub fn new(name: impl Into<String>, human_name: impl Into<String>) -> Self {
        Self {
            name: normalize_type_name(&name.into()),
            human_name: human_name.into(),
            can_build: false,
            is_mobile: true,
        }
    }

    /// Mobile constructor (commander, construction vehicle).
    #[must_use]
    pub fn mobile_builder(name: impl Into<String>, human_name: impl Into<String>) -> Self {
        Self {
            can_build: true,
            is_mobile: true,
            ..Self::new(name, human_name)
        }
    }

    /// Static constructor (factory).
    #[must_use]
    pub fn factory(name: impl Into<String>, human_name: impl Into<String>) -> Self {
        Self {
            can_build: true,
            is_mobile: false,
            ..Self::new(name, human_name)
        }
    }

    /// Static non-builder (extractor, generator, defence).
    #[must_use]
    pub fn structure(name: impl Into<String>, human_name: impl Into<String>) -> Self {
        Self {
            is_mobile: false,
            ..Self::new(name, human_name)
        }
    }
}

/// Lower-cases a type name so host and configuration spellings agree.
#[must_use]
pub fn normalize_type_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// All deployed friendly units known to the AI.
///
/// Iteration is always in ascending [`UnitId`] order so that sweeps and
/// nearest-unit searches are reproducible.
#[derive(Debug, Clone, Default)]
pub struct UnitRoster {
    units: BTreeMap<UnitId, UnitDef>,
    counts: HashMap<String, usize>,
}

impl UnitRoster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployed unit. Re-inserting an id replaces its definition.
    pub fn insert(&mut self, id: UnitId, def: UnitDef) {
        if let Some(previous) = self.units.insert(id, def.clone()) {
            self.decrement(&previous.name);
        }
        *self.counts.entry(def.name).or_insert(0) += 1;
    }

    /// Forget a unit, returning its definition if it was known.
    pub fn remove(&mut self, id: UnitId) -> Option<UnitDef> {
        let def = self.units.remove(&id)?;
        self.decrement(&def.name);
        Some(def)
    }

    fn decrement(&mut self, name: &str) {
        if let Some(count) = self.counts.get_mut(name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.counts.remove(name);
            }
        }
    }

    /// Definition of a deployed unit.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&UnitDef> {
        self.units.get(&id)
    }

    /// Whether the unit is known.
    #[must_use]
    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// Number of deployed units of a type.
    #[must_use]
    pub fn count_of(&self, type_name: &str) -> usize {
        self.counts
            .get(&normalize_type_name(type_name))
            .copied()
            .unwrap_or(0)
    }

    /// Whether any unit of the given type is deployed.
    #[must_use]
    pub fn has_type(&self, type_name: &str) -> bool {
        self.count_of(type_name) > 0
    }

    /// Ids of every construction-capable unit, ascending.
    #[must_use]
    pub fn constructors(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|(_, def)| def.can_build)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of deployed units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_follow_insert_and_remove() {
        let mut roster = UnitRoster::new();
        roster.insert(UnitId(1), UnitDef::structure("armsolar", "Solar"));
        roster.insert(UnitId(2), UnitDef::structure("armsolar", "Solar"));
        assert_eq!(roster.count_of("armsolar"), 2);

        roster.remove(UnitId(1));
        assert_eq!(roster.count_of("armsolar"), 1);
        assert!(roster.remove(UnitId(1)).is_none());
        assert_eq!(roster.count_of("armsolar"), 1);
    }

    #[test]
    fn test_type_names_are_case_insensitive() {
        let mut roster = UnitRoster::new();
        roster.insert(UnitId(7), UnitDef::factory("ARMLAB", "Kbot Lab"));
        assert!(roster.has_type("armlab"));
        assert!(roster.has_type("ArmLab"));
    }

    #[test]
    fn test_reinsert_moves_count() {
        let mut roster = UnitRoster::new();
        roster.insert(UnitId(3), UnitDef::structure("armmex", "Mex"));
        roster.insert(UnitId(3), UnitDef::structure("armsolar", "Solar"));
        assert_eq!(roster.count_of("armmex"), 0);
        assert_eq!(roster.count_of("armsolar"), 1);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_constructors_sorted_and_filtered() {
        let mut roster = UnitRoster::new();
        roster.insert(UnitId(9), UnitDef::mobile_builder("armcv", "Construction Vehicle"));
        roster.insert(UnitId(2), UnitDef::factory("armvp", "Vehicle Plant"));
        roster.insert(UnitId(5), UnitDef::structure("armsolar", "Solar"));
        assert_eq!(roster.constructors(), vec![UnitId(2), UnitId(9)]);
    }
}
