//! Deterministic sandbox host.
//!
//! [`SandboxHost`] stands in for the game engine. It accepts orders from the
//! decision engine, advances construction one frame at a time and reports
//! the resulting lifecycle events back as [`HostEvent`]s:
//!
//! - a build order waits until its cost can be paid, then creates the new
//!   unit (`UnitCreated`) and works on it every frame
//! - each guarding builder adds one frame of work per frame
//! - a finished project emits `UnitFinished` and its builder goes idle
//! - reclaim orders take a fixed number of frames and return feature metal
//!
//! Nothing here is random, so a scenario and seed always replay
//! identically.

use std::collections::{BTreeMap, HashMap, HashSet};

use buildflow_core::command::Command;
use buildflow_core::dispatch::HostEvent;
use buildflow_core::error::GatewayError;
use buildflow_core::host::{
    BuildTree, CommandGateway, ResourceOracle, ResourceSnapshot, SiteFinder,
};
use buildflow_core::math::{Fixed, Vec3Fixed};
use buildflow_core::units::{normalize_type_name, UnitDef, UnitId};
use serde::{Deserialize, Serialize};

use crate::scenario::{CatalogEntry, Scenario};

/// Upper bound on rings walked by the build-site search.
const MAX_SEARCH_RINGS: i32 = 32;

/// Counters collected over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxStats {
    /// Accepted orders by kind.
    pub orders: BTreeMap<String, u32>,
    /// Refused orders.
    pub rejected_orders: u32,
    /// Projects started by type.
    pub started: BTreeMap<String, u32>,
    /// Projects finished by type.
    pub finished: BTreeMap<String, u32>,
    /// Metal recovered from features.
    pub metal_reclaimed: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Task {
    Idle,
    Starting {
        unit_type: String,
        position: Vec3Fixed,
    },
    Building {
        project: UnitId,
    },
    Guarding(UnitId),
    Reclaiming {
        position: Vec3Fixed,
        radius: Fixed,
        remaining: u32,
    },
}

#[derive(Debug, Clone)]
struct SandboxUnit {
    unit_type: String,
    position: Vec3Fixed,
    /// Frames of work left; zero once finished.
    remaining_work: u32,
    task: Task,
}

impl SandboxUnit {
    fn is_finished(&self) -> bool {
        self.remaining_work == 0
    }
}

#[derive(Debug, Clone)]
struct FeatureState {
    position: Vec3Fixed,
    metal: f64,
}

/// Short name of a command, as used in `rejected_commands`.
#[must_use]
pub fn command_kind(command: &Command) -> &'static str {
    match command {
        Command::Build { .. } => "build",
        Command::MoveTo(_) => "move",
        Command::Guard(_) => "guard",
        Command::Attack(_) => "attack",
        Command::Reclaim { .. } => "reclaim",
        Command::Stop => "stop",
        Command::SelfDestruct => "self_destruct",
    }
}

fn ground(x: i32, z: i32) -> Vec3Fixed {
    Vec3Fixed::from_ints(x, 0, z)
}

/// Simulated engine built from a [`Scenario`].
#[derive(Debug, Clone)]
pub struct SandboxHost {
    frame: u32,
    catalog: HashMap<String, CatalogEntry>,
    build_tree: HashMap<String, HashSet<String>>,
    units: BTreeMap<UnitId, SandboxUnit>,
    next_id: u32,
    resources: ResourceSnapshot,
    base_income: (f64, f64),
    metal_spots: Vec<Vec3Fixed>,
    features: Vec<FeatureState>,
    site_spacing: Fixed,
    reclaim_search_radius: Fixed,
    reclaim_frames: u32,
    rejected: HashSet<String>,
    pending: Vec<HostEvent>,
    texts: Vec<String>,
    stats: SandboxStats,
}

impl SandboxHost {
    /// Build the world described by `scenario`. Starting units are complete.
    #[must_use]
    pub fn new(scenario: &Scenario) -> Self {
        let catalog = scenario
            .catalog
            .iter()
            .map(|entry| (normalize_type_name(&entry.name), entry.clone()))
            .collect();

        let mut build_tree: HashMap<String, HashSet<String>> = HashMap::new();
        for options in &scenario.build_tree {
            build_tree
                .entry(normalize_type_name(&options.builder))
                .or_default()
                .extend(options.targets.iter().map(|t| normalize_type_name(t)));
        }

        let mut units = BTreeMap::new();
        let mut next_id = 1;
        for placement in &scenario.units {
            let (x, z) = placement.position;
            units.insert(
                UnitId(next_id),
                SandboxUnit {
                    unit_type: normalize_type_name(&placement.unit_type),
                    position: ground(x, z),
                    remaining_work: 0,
                    task: Task::Idle,
                },
            );
            next_id += 1;
        }

        let economy = &scenario.economy;
        Self {
            frame: 0,
            catalog,
            build_tree,
            units,
            next_id,
            resources: ResourceSnapshot {
                metal: economy.metal,
                metal_storage: economy.metal_storage,
                energy: economy.energy,
                energy_storage: economy.energy_storage,
            },
            base_income: (economy.base_metal_income, economy.base_energy_income),
            metal_spots: scenario
                .metal_spots
                .iter()
                .map(|&(x, z)| ground(x, z))
                .collect(),
            features: scenario
                .features
                .iter()
                .map(|f| FeatureState {
                    position: ground(f.position.0, f.position.1),
                    metal: f.metal,
                })
                .collect(),
            site_spacing: Fixed::from_num(scenario.site_spacing),
            reclaim_search_radius: Fixed::from_num(scenario.reclaim_search_radius),
            reclaim_frames: scenario.reclaim_frames.max(1),
            rejected: scenario
                .rejected_commands
                .iter()
                .map(|kind| kind.trim().to_ascii_lowercase())
                .collect(),
            pending: Vec::new(),
            texts: Vec::new(),
            stats: SandboxStats::default(),
        }
    }

    /// Advance one frame and return the events it produced, oldest first.
    pub fn advance(&mut self) -> Vec<HostEvent> {
        self.frame += 1;
        self.collect_income();

        let mut events = std::mem::take(&mut self.pending);
        let ids: Vec<UnitId> = self.units.keys().copied().collect();
        for id in ids {
            self.step_unit(id, &mut events);
        }
        events
    }

    fn collect_income(&mut self) {
        let (mut metal, mut energy) = self.base_income;
        for unit in self.units.values().filter(|u| u.is_finished()) {
            if let Some(entry) = self.catalog.get(&unit.unit_type) {
                metal += entry.metal_income;
                energy += entry.energy_income;
            }
        }
        let r = &mut self.resources;
        r.metal = (r.metal + metal).min(r.metal_storage);
        r.energy = (r.energy + energy).min(r.energy_storage);
    }

    fn step_unit(&mut self, id: UnitId, events: &mut Vec<HostEvent>) {
        let Some(task) = self
            .units
            .get(&id)
            .filter(|u| u.is_finished())
            .map(|u| u.task.clone())
        else {
            return;
        };
        match task {
            Task::Idle => {}
            Task::Starting {
                unit_type,
                position,
            } => self.try_start(id, &unit_type, position, events),
            Task::Building { project } => self.work_on(id, project, events),
            Task::Guarding(target) => {
                if !self.units.contains_key(&target) {
                    self.go_idle(id, events);
                }
            }
            Task::Reclaiming {
                position,
                radius,
                remaining,
            } => {
                if remaining > 1 {
                    self.set_task(
                        id,
                        Task::Reclaiming {
                            position,
                            radius,
                            remaining: remaining - 1,
                        },
                    );
                } else {
                    self.finish_reclaim(position, radius);
                    self.go_idle(id, events);
                }
            }
        }
    }

    fn try_start(
        &mut self,
        builder: UnitId,
        unit_type: &str,
        position: Vec3Fixed,
        events: &mut Vec<HostEvent>,
    ) {
        let Some(entry) = self.catalog.get(unit_type).cloned() else {
            self.go_idle(builder, events);
            return;
        };
        if self.resources.metal < entry.metal_cost || self.resources.energy < entry.energy_cost {
            return;
        }
        self.resources.metal -= entry.metal_cost;
        self.resources.energy -= entry.energy_cost;

        let project = UnitId(self.next_id);
        self.next_id += 1;
        self.units.insert(
            project,
            SandboxUnit {
                unit_type: unit_type.to_string(),
                position,
                remaining_work: entry.build_frames.max(1),
                task: Task::Idle,
            },
        );
        self.set_task(builder, Task::Building { project });
        *self.stats.started.entry(unit_type.to_string()).or_default() += 1;
        tracing::debug!(frame = self.frame, %builder, %project, unit_type, "construction started");
        events.push(HostEvent::UnitCreated {
            unit: project,
            unit_type: unit_type.to_string(),
        });
    }

    fn work_on(&mut self, builder: UnitId, project: UnitId, events: &mut Vec<HostEvent>) {
        let helpers = self
            .units
            .values()
            .filter(|u| u.is_finished() && u.task == Task::Guarding(builder))
            .count();
        let work = u32::try_from(helpers).unwrap_or(u32::MAX).saturating_add(1);

        let Some(target) = self.units.get_mut(&project) else {
            self.go_idle(builder, events);
            return;
        };
        target.remaining_work = target.remaining_work.saturating_sub(work);
        if target.remaining_work > 0 {
            return;
        }
        // Orders given while under construction are dropped on completion.
        target.task = Task::Idle;
        let unit_type = target.unit_type.clone();
        *self.stats.finished.entry(unit_type.clone()).or_default() += 1;
        tracing::debug!(
            frame = self.frame,
            %builder,
            %project,
            %unit_type,
            "construction finished"
        );
        events.push(HostEvent::UnitFinished {
            unit: project,
            unit_type,
        });
        self.go_idle(builder, events);
    }

    fn finish_reclaim(&mut self, position: Vec3Fixed, radius: Fixed) {
        let mut gained = 0.0;
        self.features.retain(|feature| {
            if feature.position.within(position, radius) {
                gained += feature.metal;
                false
            } else {
                true
            }
        });
        let r = &mut self.resources;
        r.metal = (r.metal + gained).min(r.metal_storage);
        self.stats.metal_reclaimed += gained;
    }

    fn set_task(&mut self, id: UnitId, task: Task) {
        if let Some(unit) = self.units.get_mut(&id) {
            unit.task = task;
        }
    }

    fn go_idle(&mut self, id: UnitId, events: &mut Vec<HostEvent>) {
        self.set_task(id, Task::Idle);
        events.push(HostEvent::UnitIdle { unit: id });
    }

    fn site_is_free(&self, candidate: Vec3Fixed) -> bool {
        let spacing = self.site_spacing;
        let occupied = self.units.values().any(|unit| {
            let is_static = self
                .catalog
                .get(&unit.unit_type)
                .is_some_and(CatalogEntry::is_static);
            let reserved = matches!(
                &unit.task,
                Task::Starting { position, .. } if position.within(candidate, spacing)
            );
            reserved || (is_static && unit.position.within(candidate, spacing))
        });
        !occupied
    }

    /// Current frame number.
    #[must_use]
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> &SandboxStats {
        &self.stats
    }

    /// Lines the AI sent with `send_text`.
    #[must_use]
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Finished units by type.
    #[must_use]
    pub fn unit_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for unit in self.units.values().filter(|u| u.is_finished()) {
            *counts.entry(unit.unit_type.clone()).or_default() += 1;
        }
        counts
    }
}

impl CommandGateway for SandboxHost {
    fn give_order(&mut self, unit: UnitId, command: &Command) -> Result<(), GatewayError> {
        let kind = command_kind(command);
        if self.rejected.contains(kind) {
            self.stats.rejected_orders += 1;
            return Err(GatewayError::Rejected(format!("{kind} orders are disabled")));
        }
        let Some(actor) = self.units.get(&unit) else {
            self.stats.rejected_orders += 1;
            return Err(GatewayError::UnitNotFound(unit));
        };
        let builder_type = actor.unit_type.clone();
        let here = actor.position;

        let task = match command {
            Command::Build {
                unit_type,
                position,
            } => {
                let unit_type = normalize_type_name(unit_type);
                if !self.can_build(&builder_type, &unit_type) {
                    self.stats.rejected_orders += 1;
                    return Err(GatewayError::Rejected(format!(
                        "{builder_type} cannot build {unit_type}"
                    )));
                }
                let exit = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, self.site_spacing);
                Task::Starting {
                    unit_type,
                    position: position.unwrap_or(here + exit),
                }
            }
            Command::Guard(target) => {
                if !self.units.contains_key(target) {
                    self.stats.rejected_orders += 1;
                    return Err(GatewayError::UnitNotFound(*target));
                }
                Task::Guarding(*target)
            }
            Command::Reclaim { position, radius } => Task::Reclaiming {
                position: *position,
                radius: *radius,
                remaining: self.reclaim_frames,
            },
            Command::MoveTo(position) => {
                if let Some(actor) = self.units.get_mut(&unit) {
                    actor.position = *position;
                }
                self.pending.push(HostEvent::UnitIdle { unit });
                Task::Idle
            }
            Command::Attack(_) | Command::Stop => {
                self.pending.push(HostEvent::UnitIdle { unit });
                Task::Idle
            }
            Command::SelfDestruct => {
                self.units.remove(&unit);
                self.pending.push(HostEvent::UnitDestroyed {
                    unit,
                    attacker: None,
                });
                *self.stats.orders.entry(kind.to_string()).or_default() += 1;
                return Ok(());
            }
        };
        self.set_task(unit, task);
        *self.stats.orders.entry(kind.to_string()).or_default() += 1;
        Ok(())
    }

    fn unit_position(&self, unit: UnitId) -> Option<Vec3Fixed> {
        self.units.get(&unit).map(|u| u.position)
    }

    fn unit_is_busy(&self, unit: UnitId) -> bool {
        self.units
            .get(&unit)
            .is_some_and(|u| !u.is_finished() || u.task != Task::Idle)
    }

    fn current_frame(&self) -> u32 {
        self.frame
    }

    fn unit_def(&self, type_name: &str) -> Option<UnitDef> {
        self.catalog
            .get(&normalize_type_name(type_name))
            .map(CatalogEntry::def)
    }

    fn friendly_units(&self) -> Vec<(UnitId, String)> {
        self.units
            .iter()
            .filter(|(_, u)| u.is_finished())
            .map(|(id, u)| (*id, u.unit_type.clone()))
            .collect()
    }

    fn send_text(&mut self, text: &str) {
        self.texts.push(text.to_string());
    }
}

impl ResourceOracle for SandboxHost {
    fn can_afford_metal(&self, def: &UnitDef) -> bool {
        self.catalog
            .get(&def.name)
            .is_some_and(|entry| entry.metal_cost <= self.resources.metal)
    }

    fn can_afford_energy(&self, def: &UnitDef) -> bool {
        self.catalog
            .get(&def.name)
            .is_some_and(|entry| entry.energy_cost <= self.resources.energy)
    }

    fn resources(&self) -> ResourceSnapshot {
        self.resources
    }
}

impl BuildTree for SandboxHost {
    fn can_build(&self, builder_type: &str, target_type: &str) -> bool {
        self.build_tree
            .get(&normalize_type_name(builder_type))
            .is_some_and(|targets| targets.contains(&normalize_type_name(target_type)))
    }
}

impl SiteFinder for SandboxHost {
    fn find_build_site(
        &self,
        unit_type: &str,
        near: Vec3Fixed,
        radius: Fixed,
    ) -> Option<Vec3Fixed> {
        let is_static = self
            .catalog
            .get(&normalize_type_name(unit_type))
            .is_some_and(CatalogEntry::is_static);
        if !is_static {
            return Some(near);
        }

        let spacing = self.site_spacing;
        let rings = radius
            .checked_div(spacing)
            .map_or(0, |r| r.to_num::<i32>())
            .clamp(0, MAX_SEARCH_RINGS);
        for ring in 0..=rings {
            for dx in -ring..=ring {
                for dz in -ring..=ring {
                    if dx.abs().max(dz.abs()) != ring {
                        continue;
                    }
                    let offset = Vec3Fixed::new(
                        spacing.saturating_mul(Fixed::from_num(dx)),
                        Fixed::ZERO,
                        spacing.saturating_mul(Fixed::from_num(dz)),
                    );
                    let candidate = near + offset;
                    if candidate.distance_squared(near) > radius.saturating_mul(radius) {
                        continue;
                    }
                    if self.site_is_free(candidate) {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    fn nearest_metal_spot(&self, pos: Vec3Fixed) -> Vec3Fixed {
        let spots = || self.metal_spots.iter().copied();
        spots()
            .filter(|spot| self.site_is_free(*spot))
            .min_by_key(|spot| spot.distance_squared(pos))
            .or_else(|| spots().min_by_key(|spot| spot.distance_squared(pos)))
            .unwrap_or(pos)
    }

    fn find_reclaimable(&self, pos: Vec3Fixed, _unit: UnitId) -> Option<Vec3Fixed> {
        self.features
            .iter()
            .filter(|feature| feature.metal > 0.0)
            .map(|feature| feature.position)
            .filter(|position| position.within(pos, self.reclaim_search_radius))
            .min_by_key(|position| position.distance_squared(pos))
    }
}
