//! Scripted host for tests.
//!
//! [`FakeHost`] implements every host trait from in-memory tables. Tests
//! arrange units, the build tree and resource state, drive the scheduler,
//! then inspect [`FakeHost::orders`].
//!
//! Defaults are permissive: every type is affordable, every build-site
//! search succeeds at the search origin, and reserves are full.

use std::collections::{BTreeMap, HashMap, HashSet};

use buildflow_core::command::Command;
use buildflow_core::error::GatewayError;
use buildflow_core::host::{
    BuildTree, CommandGateway, ResourceOracle, ResourceSnapshot, SiteFinder,
};
use buildflow_core::math::{Fixed, Vec3Fixed};
use buildflow_core::units::{normalize_type_name, UnitDef, UnitId};

/// Callback run on every submitted order, before it is accepted.
pub type OrderHook = Box<dyn FnMut(UnitId, &Command)>;

#[derive(Debug, Clone)]
struct FakeUnit {
    type_name: String,
    position: Vec3Fixed,
    busy: bool,
}

/// In-memory host binding.
pub struct FakeHost {
    /// Value returned by `current_frame`.
    pub frame: u32,
    /// Value returned by `resources`.
    pub resources: ResourceSnapshot,
    defs: HashMap<String, UnitDef>,
    units: BTreeMap<UnitId, FakeUnit>,
    build_options: HashMap<String, HashSet<String>>,
    no_metal: HashSet<String>,
    no_energy: HashSet<String>,
    blocked_sites: HashSet<String>,
    metal_spots: Vec<Vec3Fixed>,
    reclaimables: Vec<Vec3Fixed>,
    rejection: Option<String>,
    orders: Vec<(UnitId, Command)>,
    texts: Vec<String>,
    hook: Option<OrderHook>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// Empty host with full reserves.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frame: 0,
            resources: ResourceSnapshot {
                metal: 1000.0,
                metal_storage: 1000.0,
                energy: 1000.0,
                energy_storage: 1000.0,
            },
            defs: HashMap::new(),
            units: BTreeMap::new(),
            build_options: HashMap::new(),
            no_metal: HashSet::new(),
            no_energy: HashSet::new(),
            blocked_sites: HashSet::new(),
            metal_spots: Vec::new(),
            reclaimables: Vec::new(),
            rejection: None,
            orders: Vec::new(),
            texts: Vec::new(),
            hook: None,
        }
    }

    /// Register a unit type.
    #[must_use]
    pub fn with_def(mut self, def: UnitDef) -> Self {
        self.add_def(def);
        self
    }

    /// Register a unit type in place.
    pub fn add_def(&mut self, def: UnitDef) {
        self.defs.insert(def.name.clone(), def);
    }

    /// Allow `builder` to construct each of `targets`.
    #[must_use]
    pub fn with_build_options(mut self, builder: &str, targets: &[&str]) -> Self {
        let entry = self
            .build_options
            .entry(normalize_type_name(builder))
            .or_default();
        entry.extend(targets.iter().map(|t| normalize_type_name(t)));
        self
    }

    /// Place a unit on the map. It also shows up in `friendly_units`.
    pub fn spawn(&mut self, unit: UnitId, type_name: &str, position: Vec3Fixed) {
        self.units.insert(
            unit,
            FakeUnit {
                type_name: normalize_type_name(type_name),
                position,
                busy: false,
            },
        );
    }

    /// Remove a unit from the map.
    pub fn despawn(&mut self, unit: UnitId) {
        self.units.remove(&unit);
    }

    /// Move a unit.
    pub fn set_position(&mut self, unit: UnitId, position: Vec3Fixed) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.position = position;
        }
    }

    /// Set the busy flag reported for a unit.
    pub fn set_busy(&mut self, unit: UnitId, busy: bool) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.busy = busy;
        }
    }

    /// Make the metal predicate fail for a type.
    pub fn deny_metal(&mut self, type_name: &str) {
        self.no_metal.insert(normalize_type_name(type_name));
    }

    /// Make the energy predicate fail for a type.
    pub fn deny_energy(&mut self, type_name: &str) {
        self.no_energy.insert(normalize_type_name(type_name));
    }

    /// Make both predicates pass again for a type.
    pub fn allow(&mut self, type_name: &str) {
        let name = normalize_type_name(type_name);
        self.no_metal.remove(&name);
        self.no_energy.remove(&name);
    }

    /// Make every build-site search for a type fail.
    pub fn block_sites(&mut self, type_name: &str) {
        self.blocked_sites.insert(normalize_type_name(type_name));
    }

    /// Add a metal deposit.
    pub fn add_metal_spot(&mut self, position: Vec3Fixed) {
        self.metal_spots.push(position);
    }

    /// Add a reclaimable feature.
    pub fn add_reclaimable(&mut self, position: Vec3Fixed) {
        self.reclaimables.push(position);
    }

    /// Refuse every order from now on.
    pub fn reject_orders(&mut self, reason: impl Into<String>) {
        self.rejection = Some(reason.into());
    }

    /// Accept orders again.
    pub fn accept_orders(&mut self) {
        self.rejection = None;
    }

    /// Run `hook` on every submitted order.
    pub fn set_order_hook(&mut self, hook: impl FnMut(UnitId, &Command) + 'static) {
        self.hook = Some(Box::new(hook));
    }

    /// Accepted orders in submission order.
    #[must_use]
    pub fn orders(&self) -> &[(UnitId, Command)] {
        &self.orders
    }

    /// Accepted orders for one unit.
    #[must_use]
    pub fn orders_for(&self, unit: UnitId) -> Vec<&Command> {
        self.orders
            .iter()
            .filter(|(u, _)| *u == unit)
            .map(|(_, c)| c)
            .collect()
    }

    /// Drain the accepted-order log.
    pub fn take_orders(&mut self) -> Vec<(UnitId, Command)> {
        std::mem::take(&mut self.orders)
    }

    /// Lines passed to `send_text`.
    #[must_use]
    pub fn texts(&self) -> &[String] {
        &self.texts
    }
}

impl CommandGateway for FakeHost {
    fn give_order(&mut self, unit: UnitId, command: &Command) -> Result<(), GatewayError> {
        if let Some(hook) = self.hook.as_mut() {
            hook(unit, command);
        }
        if let Some(reason) = &self.rejection {
            return Err(GatewayError::Rejected(reason.clone()));
        }
        let Some(u) = self.units.get_mut(&unit) else {
            return Err(GatewayError::UnitNotFound(unit));
        };
        u.busy = !matches!(command, Command::Stop);
        tracing::trace!(%unit, %command, "fake host accepted order");
        self.orders.push((unit, command.clone()));
        Ok(())
    }

    fn unit_position(&self, unit: UnitId) -> Option<Vec3Fixed> {
        self.units.get(&unit).map(|u| u.position)
    }

    fn unit_is_busy(&self, unit: UnitId) -> bool {
        self.units.get(&unit).is_some_and(|u| u.busy)
    }

    fn current_frame(&self) -> u32 {
        self.frame
    }

    fn unit_def(&self, type_name: &str) -> Option<UnitDef> {
        self.defs.get(&normalize_type_name(type_name)).cloned()
    }

    fn friendly_units(&self) -> Vec<(UnitId, String)> {
        self.units
            .iter()
            .map(|(id, u)| (*id, u.type_name.clone()))
            .collect()
    }

    fn send_text(&mut self, text: &str) {
        self.texts.push(text.to_string());
    }
}

impl ResourceOracle for FakeHost {
    fn can_afford_metal(&self, def: &UnitDef) -> bool {
        !self.no_metal.contains(&def.name)
    }

    fn can_afford_energy(&self, def: &UnitDef) -> bool {
        !self.no_energy.contains(&def.name)
    }

    fn resources(&self) -> ResourceSnapshot {
        self.resources
    }
}

impl BuildTree for FakeHost {
    fn can_build(&self, builder_type: &str, target_type: &str) -> bool {
        self.build_options
            .get(&normalize_type_name(builder_type))
            .is_some_and(|targets| targets.contains(&normalize_type_name(target_type)))
    }
}

impl SiteFinder for FakeHost {
    fn find_build_site(
        &self,
        unit_type: &str,
        near: Vec3Fixed,
        _radius: Fixed,
    ) -> Option<Vec3Fixed> {
        if self.blocked_sites.contains(&normalize_type_name(unit_type)) {
            None
        } else {
            Some(near)
        }
    }

    fn nearest_metal_spot(&self, pos: Vec3Fixed) -> Vec3Fixed {
        self.metal_spots
            .iter()
            .copied()
            .min_by_key(|spot| spot.distance_squared(pos))
            .unwrap_or(pos)
    }

    fn find_reclaimable(&self, pos: Vec3Fixed, _unit: UnitId) -> Option<Vec3Fixed> {
        self.reclaimables
            .iter()
            .copied()
            .min_by_key(|feature| feature.distance_squared(pos))
    }
}
