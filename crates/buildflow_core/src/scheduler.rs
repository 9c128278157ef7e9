//! Idle-unit task scheduler.
//!
//! Decides what an idle constructor does next. A constructor is in one of
//! three derived states, none of which is stored as an enum:
//!
//! - **idle-unassigned** - not in the active set and not assisting
//! - **active-building** - has an open order in the [`OrderRegistry`]
//! - **assisting** - recorded in the assist map as guarding another builder
//!
//! # Decision order
//!
//! 1. Non-builders are ignored.
//! 2. The unit leaves the active set and its open order is cancelled.
//! 3. Among goals the unit can build that still want units, all goals tied at
//!    the highest priority become candidates.
//! 4. Candidates that pass both the metal and energy predicates are possible;
//!    the others record which resource blocked them.
//! 5. One possible goal is picked at random (seeded) and built.
//! 6. Otherwise the fallback chain runs: bootstrap constructor, energy
//!    producer, reclaim or metal extractor, and finally assisting the
//!    nearest active builder.
//!
//! A periodic sweep re-runs the decision for every constructor the host
//! reports as not busy, or that is not in the active set, to recover from
//! missed idle events.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};
use crate::goals::{GoalBook, GoalId, WorkflowConfig};
use crate::host::Host;
use crate::issuer::OrderIssuer;
use crate::math::{Fixed, Vec3Fixed};
use crate::registry::{OrderEvent, OrderHandle, OrderNotification, OrderOwner, OrderRegistry};
use crate::units::{UnitDef, UnitId, UnitRoster};

/// What the scheduler did with an idle unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Not a known construction-capable unit.
    Ignored,
    /// Started building toward a goal.
    Goal {
        /// The goal served.
        goal: GoalId,
        /// Type ordered.
        unit_type: String,
        /// Registry handle.
        order: OrderHandle,
    },
    /// No constructor exists: building one.
    Bootstrap {
        /// Type ordered.
        unit_type: String,
        /// Registry handle.
        order: OrderHandle,
    },
    /// Energy was short: building a producer.
    Energy {
        /// Type ordered.
        unit_type: String,
        /// Registry handle.
        order: OrderHandle,
    },
    /// Metal was short: reclaiming a nearby feature.
    Reclaim {
        /// Where.
        position: Vec3Fixed,
    },
    /// Metal was short: building an extractor.
    Metal {
        /// Type ordered.
        unit_type: String,
        /// Registry handle.
        order: OrderHandle,
    },
    /// Guarding the nearest active builder.
    Assist {
        /// Builder being assisted.
        target: UnitId,
    },
    /// Already guarding the nearest active builder; no command sent.
    AlreadyAssisting {
        /// Builder being assisted.
        target: UnitId,
    },
    /// The chosen goal had no legal placement this cycle.
    NoBuildSite {
        /// Type that could not be placed.
        unit_type: String,
    },
    /// Nothing applicable; the unit stays idle.
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackKind {
    Bootstrap,
    Energy,
    Metal,
}

impl FallbackKind {
    fn decision(self, unit_type: String, order: OrderHandle) -> Decision {
        match self {
            Self::Bootstrap => Decision::Bootstrap { unit_type, order },
            Self::Energy => Decision::Energy { unit_type, order },
            Self::Metal => Decision::Metal { unit_type, order },
        }
    }
}

/// Owns goals, orders, the unit roster and assist bookkeeping.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    config: WorkflowConfig,
    goals: GoalBook,
    registry: OrderRegistry,
    issuer: OrderIssuer,
    roster: UnitRoster,
    active: BTreeSet<UnitId>,
    /// Assisting unit -> unit it guards.
    assisting: BTreeMap<UnitId, UnitId>,
    rng: ChaCha8Rng,
    last_idle_sweep: Option<u32>,
}

impl TaskScheduler {
    /// Create a scheduler from a validated configuration.
    #[must_use]
    pub fn new(config: WorkflowConfig) -> Self {
        let registry =
            OrderRegistry::new(Fixed::from_num(config.match_radius), config.match_policy);
        Self {
            goals: GoalBook::from_specs(&config.goals),
            registry,
            issuer: OrderIssuer::new(),
            roster: UnitRoster::new(),
            active: BTreeSet::new(),
            assisting: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            last_idle_sweep: None,
            config,
        }
    }

    /// Pick up units that already exist and put idle builders to work.
    pub fn activate<H: Host + ?Sized>(&mut self, host: &mut H) -> Vec<AiError> {
        let existing = host.friendly_units();
        tracing::info!(
            config = %self.config.name,
            units = existing.len(),
            goals = self.goals.len(),
            "workflow activated"
        );
        for (unit, type_name) in existing {
            self.track_unit(host, unit, &type_name);
        }
        self.last_idle_sweep = Some(host.current_frame());
        self.idle_sweep(host)
    }

    /// A unit appeared. Adds it to the roster and attributes it to orders.
    pub fn on_unit_created<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        unit: UnitId,
        unit_type: &str,
    ) {
        self.track_unit(host, unit, unit_type);
        let spawn = host.unit_position(unit);
        let notifications = self.registry.on_unit_created(unit, unit_type, spawn);
        self.route(notifications);
    }

    /// A unit completed. Retires its order and gives the new unit a task.
    pub fn on_unit_finished<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        unit: UnitId,
        unit_type: &str,
    ) -> Result<Decision> {
        if !self.roster.contains(unit) {
            tracing::debug!(%unit, "finished unit was never seen created");
            self.track_unit(host, unit, unit_type);
        }
        let notifications = self.registry.on_unit_finished(unit, unit_type);
        self.route(notifications);
        self.on_unit_idle(host, unit)
    }

    /// A unit died.
    pub fn on_unit_destroyed(&mut self, unit: UnitId, attacker: Option<UnitId>) {
        if self.roster.remove(unit).is_none() {
            tracing::debug!(%unit, "destroyed unit was not in the roster");
        }
        tracing::debug!(%unit, ?attacker, "unit destroyed");
        self.active.remove(&unit);
        self.assisting.remove(&unit);
        self.assisting.retain(|_, target| *target != unit);
        self.issuer.forget(unit);
        let notifications = self.registry.on_unit_destroyed(unit);
        self.route(notifications);
    }

    /// Frame tick. Runs the idle sweep once the check interval has passed.
    pub fn on_tick<H: Host + ?Sized>(&mut self, host: &mut H) -> Vec<AiError> {
        let frame = host.current_frame();
        let interval = self.config.idle_check_interval;
        let due = self
            .last_idle_sweep
            .map_or(true, |last| frame.saturating_sub(last) > interval);
        if !due {
            return Vec::new();
        }
        self.last_idle_sweep = Some(frame);
        self.idle_sweep(host)
    }

    /// Re-run the idle decision for every constructor that is not busy or not
    /// known to be building.
    pub fn idle_sweep<H: Host + ?Sized>(&mut self, host: &mut H) -> Vec<AiError> {
        tracing::debug!(frame = host.current_frame(), "idle sweep");
        let mut errors = Vec::new();
        for unit in self.roster.constructors() {
            let busy = host.unit_is_busy(unit);
            if !busy && self.assisting.remove(&unit).is_some() {
                tracing::debug!(%unit, "assisting unit went quiet; dropping assist");
            }
            if busy && self.active.contains(&unit) {
                continue;
            }
            if let Err(err) = self.on_unit_idle(host, unit) {
                errors.push(err);
            }
        }
        errors
    }

    /// Decide what an idle unit does next.
    ///
    /// # Errors
    /// Returns [`AiError::Gateway`] if the host refuses the chosen command.
    /// The unit is then left idle for the next sweep.
    pub fn on_unit_idle<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        unit: UnitId,
    ) -> Result<Decision> {
        let Some(def) = self.roster.get(unit).cloned() else {
            tracing::debug!(%unit, "idle event for unknown unit");
            return Ok(Decision::Ignored);
        };
        if !def.can_build {
            return Ok(Decision::Ignored);
        }
        tracing::debug!(%unit, unit_type = %def.name, "unit idle");

        self.active.remove(&unit);
        if let Some(notification) = self.registry.signal_constructor_idle(unit) {
            self.route(vec![notification]);
        }

        let mut possible = Vec::new();
        let mut metal_needed = false;
        let mut energy_needed = false;
        for id in self.top_priority_goals(host, &def) {
            let Some(goal) = self.goals.get(id) else {
                continue;
            };
            let Some(target) = host.unit_def(&goal.unit_type) else {
                tracing::warn!(unit_type = %goal.unit_type, "goal type unknown to host");
                continue;
            };
            if !host.can_afford_metal(&target) {
                tracing::debug!(unit_type = %goal.unit_type, "needs metal");
                metal_needed = true;
            } else if !host.can_afford_energy(&target) {
                tracing::debug!(unit_type = %goal.unit_type, "needs energy");
                energy_needed = true;
            } else {
                possible.push(id);
            }
        }

        if possible.is_empty() {
            return self.fall_back(host, unit, &def, metal_needed, energy_needed);
        }

        let chosen = possible[self.rng.gen_range(0..possible.len())];
        self.build_for_goal(host, unit, &def, chosen)
    }

    fn top_priority_goals<H: Host + ?Sized>(&self, host: &H, def: &UnitDef) -> Vec<GoalId> {
        let mut best: Option<f64> = None;
        let mut candidates = Vec::new();
        for goal in self.goals.iter() {
            if !goal.wants_more(self.roster.count_of(&goal.unit_type)) {
                continue;
            }
            if !host.can_build(&def.name, &goal.unit_type) {
                continue;
            }
            match best.map(|current| goal.priority.total_cmp(&current)) {
                None | Some(Ordering::Greater) => {
                    best = Some(goal.priority);
                    candidates.clear();
                    candidates.push(goal.id);
                }
                Some(Ordering::Equal) => candidates.push(goal.id),
                Some(Ordering::Less) => {}
            }
        }
        candidates
    }

    fn build_for_goal<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        unit: UnitId,
        def: &UnitDef,
        id: GoalId,
    ) -> Result<Decision> {
        let Some(unit_type) = self.goals.get(id).map(|goal| goal.unit_type.clone()) else {
            return Ok(Decision::Nothing);
        };
        let is_metal = self.config.is_metal_unit(&unit_type);
        let Some(position) = self.placement(host, unit, def, &unit_type, is_metal) else {
            tracing::info!(%unit, %unit_type, "no build site for goal");
            return Ok(Decision::NoBuildSite { unit_type });
        };

        let owner = OrderOwner::Goal(id);
        let order = self.commit_build(host, unit, def, &unit_type, position, owner)?;
        self.goals.attach(id, order);
        tracing::info!(%unit, %unit_type, %order, "building for goal");
        Ok(Decision::Goal {
            goal: id,
            unit_type,
            order,
        })
    }

    fn fall_back<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        unit: UnitId,
        def: &UnitDef,
        metal_needed: bool,
        energy_needed: bool,
    ) -> Result<Decision> {
        let bootstrap = &self.config.bootstrap;
        let has_constructor = bootstrap
            .level1_constructor_types
            .iter()
            .any(|t| self.roster.has_type(t));
        if !has_constructor && !self.roster.has_type(&bootstrap.commander_type) {
            let types = vec![bootstrap.constructor_type.clone()];
            let built =
                self.try_fallback_build(host, unit, def, &types, FallbackKind::Bootstrap)?;
            if let Some(decision) = built {
                return Ok(decision);
            }
        }

        let resources = host.resources();
        if energy_needed || resources.energy_low() {
            let types = self.config.energy_unit_types.clone();
            let built =
                self.try_fallback_build(host, unit, def, &types, FallbackKind::Energy)?;
            if let Some(decision) = built {
                return Ok(decision);
            }
        }

        if metal_needed || resources.metal_low() {
            let wreck = host
                .unit_position(unit)
                .and_then(|pos| host.find_reclaimable(pos, unit));
            if let Some(position) = wreck {
                let radius = Fixed::from_num(self.config.reclaim_radius);
                self.issuer.reclaim(host, unit, position, radius)?;
                self.active.insert(unit);
                self.clear_assist(unit);
                tracing::info!(%unit, %position, "reclaiming");
                return Ok(Decision::Reclaim { position });
            }
            let types = self.config.metal_unit_types.clone();
            let built =
                self.try_fallback_build(host, unit, def, &types, FallbackKind::Metal)?;
            if let Some(decision) = built {
                return Ok(decision);
            }
        }

        self.offer_assistance(host, unit)
    }

    fn try_fallback_build<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        unit: UnitId,
        def: &UnitDef,
        types: &[String],
        kind: FallbackKind,
    ) -> Result<Option<Decision>> {
        for unit_type in types {
            if !host.can_build(&def.name, unit_type) {
                continue;
            }
            let Some(position) =
                self.placement(host, unit, def, unit_type, kind == FallbackKind::Metal)
            else {
                tracing::debug!(%unit, %unit_type, "no build site for fallback");
                continue;
            };
            let owner = OrderOwner::Fallback;
            let order = self.commit_build(host, unit, def, unit_type, position, owner)?;
            tracing::info!(%unit, %unit_type, ?kind, "fallback build");
            return Ok(Some(kind.decision(unit_type.clone(), order)));
        }
        Ok(None)
    }

    fn offer_assistance<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        unit: UnitId,
    ) -> Result<Decision> {
        let Some(origin) = host.unit_position(unit) else {
            self.clear_assist(unit);
            return Ok(Decision::Nothing);
        };

        let nearest = self
            .active
            .iter()
            .filter(|candidate| **candidate != unit)
            .filter_map(|candidate| {
                host.unit_position(*candidate)
                    .map(|pos| (*candidate, origin.distance_squared(pos)))
            })
            .min_by_key(|(_, dist_sq)| *dist_sq)
            .map(|(candidate, _)| candidate);

        let Some(target) = nearest else {
            tracing::debug!(%unit, "no active builder to assist");
            self.clear_assist(unit);
            return Ok(Decision::Nothing);
        };

        if self.assisting.get(&unit) == Some(&target) {
            return Ok(Decision::AlreadyAssisting { target });
        }
        self.issuer.guard(host, unit, target)?;
        self.assisting.insert(unit, target);
        tracing::info!(%unit, %target, "assisting");
        Ok(Decision::Assist { target })
    }

    /// Build position: factories build in place, mobile builders search for
    /// a site near themselves (or near the closest metal spot).
    fn placement<H: Host + ?Sized>(
        &self,
        host: &H,
        unit: UnitId,
        def: &UnitDef,
        unit_type: &str,
        on_metal: bool,
    ) -> Option<Vec3Fixed> {
        let here = host.unit_position(unit)?;
        if !def.is_mobile {
            return Some(here);
        }
        if on_metal {
            let spot = host.nearest_metal_spot(here);
            let radius = Fixed::from_num(self.config.metal_site_radius);
            return Some(host.find_build_site(unit_type, spot, radius).unwrap_or(spot));
        }
        let radius = Fixed::from_num(self.config.build_search_radius);
        host.find_build_site(unit_type, here, radius)
    }

    fn commit_build<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        unit: UnitId,
        def: &UnitDef,
        unit_type: &str,
        position: Vec3Fixed,
        owner: OrderOwner,
    ) -> Result<OrderHandle> {
        if def.is_mobile {
            self.issuer.build_unit_at(host, unit, unit_type, position)?;
        } else {
            self.issuer.build_unit(host, unit, unit_type)?;
        }
        let registered = self.registry.register_order(owner, unit, unit_type, position);
        if let Some(notification) = registered.superseded {
            self.route(vec![notification]);
        }
        self.active.insert(unit);
        self.clear_assist(unit);
        Ok(registered.handle)
    }

    fn clear_assist(&mut self, unit: UnitId) {
        if let Some(target) = self.assisting.remove(&unit) {
            tracing::debug!(%unit, %target, "assist cleared");
        }
    }

    fn track_unit<H: Host + ?Sized>(&mut self, host: &H, unit: UnitId, type_name: &str) {
        let def = host.unit_def(type_name).unwrap_or_else(|| {
            tracing::warn!(%unit, type_name, "host has no definition; tracking as non-builder");
            UnitDef::new(type_name, type_name)
        });
        self.roster.insert(unit, def);
    }

    /// Deliver registry notifications to order owners.
    fn route(&mut self, notifications: Vec<OrderNotification>) {
        for notification in notifications {
            let handle = notification.order.handle;
            if let OrderEvent::UnitCreated { unit, .. } = &notification.event {
                tracing::debug!(%handle, %unit, "order matched");
            }
            let OrderOwner::Goal(goal) = notification.order.owner else {
                continue;
            };
            if notification.is_terminal() && !self.goals.release(goal, handle) {
                tracing::debug!(%handle, "order already released from its goal");
            }
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Goals.
    #[must_use]
    pub fn goals(&self) -> &GoalBook {
        &self.goals
    }

    /// Order registry.
    #[must_use]
    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    /// Last-command records.
    #[must_use]
    pub fn issuer(&self) -> &OrderIssuer {
        &self.issuer
    }

    /// Known units.
    #[must_use]
    pub fn roster(&self) -> &UnitRoster {
        &self.roster
    }

    /// Whether the unit has a build task in progress.
    #[must_use]
    pub fn is_active(&self, unit: UnitId) -> bool {
        self.active.contains(&unit)
    }

    /// Active builders, ascending.
    pub fn active_constructors(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.active.iter().copied()
    }

    /// The builder `unit` is assisting.
    #[must_use]
    pub fn assist_target(&self, unit: UnitId) -> Option<UnitId> {
        self.assisting.get(&unit).copied()
    }

    /// Assisting unit -> assisted unit.
    #[must_use]
    pub fn assisting(&self) -> &BTreeMap<UnitId, UnitId> {
        &self.assisting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::error::GatewayError;
    use crate::goals::GoalSpec;
    use crate::host::{BuildTree, CommandGateway, ResourceOracle, ResourceSnapshot, SiteFinder};

    /// One factory at the origin that can build `armcv`.
    #[derive(Default)]
    struct LoneFactory {
        frame: u32,
        sent: Vec<(UnitId, Command)>,
    }

    impl CommandGateway for LoneFactory {
        fn give_order(
            &mut self,
            unit: UnitId,
            command: &Command,
        ) -> std::result::Result<(), GatewayError> {
            self.sent.push((unit, command.clone()));
            Ok(())
        }

        fn unit_position(&self, _unit: UnitId) -> Option<Vec3Fixed> {
            Some(Vec3Fixed::ZERO)
        }

        fn unit_is_busy(&self, _unit: UnitId) -> bool {
            false
        }

        fn current_frame(&self) -> u32 {
            self.frame
        }

        fn unit_def(&self, type_name: &str) -> Option<UnitDef> {
            match type_name {
                "armvp" => Some(UnitDef::factory("armvp", "Vehicle Plant")),
                "armcv" => Some(UnitDef::mobile_builder("armcv", "Construction Vehicle")),
                _ => None,
            }
        }

        fn friendly_units(&self) -> Vec<(UnitId, String)> {
            vec![(UnitId(1), "armvp".to_string())]
        }
    }

    impl ResourceOracle for LoneFactory {
        fn can_afford_metal(&self, _def: &UnitDef) -> bool {
            true
        }

        fn can_afford_energy(&self, _def: &UnitDef) -> bool {
            true
        }

        fn resources(&self) -> ResourceSnapshot {
            ResourceSnapshot {
                metal: 1000.0,
                metal_storage: 1000.0,
                energy: 1000.0,
                energy_storage: 1000.0,
            }
        }
    }

    impl BuildTree for LoneFactory {
        fn can_build(&self, builder_type: &str, target_type: &str) -> bool {
            builder_type == "armvp" && target_type == "armcv"
        }
    }

    impl SiteFinder for LoneFactory {
        fn find_build_site(&self, _: &str, near: Vec3Fixed, _: Fixed) -> Option<Vec3Fixed> {
            Some(near)
        }

        fn nearest_metal_spot(&self, pos: Vec3Fixed) -> Vec3Fixed {
            pos
        }

        fn find_reclaimable(&self, _pos: Vec3Fixed, _unit: UnitId) -> Option<Vec3Fixed> {
            None
        }
    }

    fn scheduler() -> TaskScheduler {
        TaskScheduler::new(WorkflowConfig {
            goals: vec![GoalSpec::new(1.0, "armcv", 2)],
            ..WorkflowConfig::default()
        })
    }

    #[test]
    fn test_activate_puts_factory_to_work() {
        let mut host = LoneFactory::default();
        let mut scheduler = scheduler();

        assert!(scheduler.activate(&mut host).is_empty());

        assert_eq!(host.sent, vec![(UnitId(1), Command::build_in_place("armcv"))]);
        assert!(scheduler.is_active(UnitId(1)));
        assert_eq!(scheduler.goals().get(GoalId(0)).unwrap().in_flight.len(), 1);
    }

    #[test]
    fn test_tick_waits_for_interval() {
        let mut host = LoneFactory::default();
        let mut scheduler = scheduler();
        scheduler.activate(&mut host);
        let sent = host.sent.len();

        host.frame = 30;
        scheduler.on_tick(&mut host);
        assert_eq!(host.sent.len(), sent);

        host.frame = 31;
        scheduler.on_tick(&mut host);
        assert_eq!(host.sent.len(), sent + 1);
    }

    #[test]
    fn test_unknown_unit_idle_is_ignored() {
        let mut host = LoneFactory::default();
        let mut scheduler = scheduler();

        let decision = scheduler.on_unit_idle(&mut host, UnitId(9)).unwrap();

        assert_eq!(decision, Decision::Ignored);
        assert!(host.sent.is_empty());
    }
}
