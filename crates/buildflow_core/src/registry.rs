//! Order registry: in-flight construction orders and spawn matching.
//!
//! The host does not say which builder produced a new unit. The registry
//! keeps every outstanding [`ConstructionOrder`] and attributes a created
//! unit to the pending order(s) whose target type matches and whose expected
//! position lies within the match radius of the actual spawn point.
//!
//! # Matching ambiguity
//!
//! The constructor is not part of the match test. Two pending orders of the
//! same type placed near each other can both match one spawn. Under the
//! default [`MatchPolicy::AllWithinRange`] every qualifying order is
//! matched; [`MatchPolicy::FirstWithinRange`] keeps only the oldest. Either
//! way a multi-match is logged at info level.
//!
//! # Notifications
//!
//! Mutations return [`OrderNotification`]s instead of calling back into the
//! owner. Finished and lost orders are removed from the registry before the
//! notification is returned, so the notification carries the final snapshot.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::goals::GoalId;
use crate::math::{Fixed, Vec3Fixed};
use crate::units::{normalize_type_name, UnitId};

/// Distance, in world units, under which a spawn satisfies an order.
pub const DEFAULT_MATCH_RADIUS: i32 = 500;

/// Opaque identifier of a registered order. Increases with registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderHandle(pub u64);

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Command issued, nothing spawned yet.
    Pending,
    /// A created unit has been attributed to the order.
    Matched,
    /// The spawned unit completed.
    Finished,
    /// Superseded, cancelled, or destroyed before completion.
    Lost,
}

/// Who asked for an order, and therefore who is told about its progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderOwner {
    /// A standing production goal.
    Goal(GoalId),
    /// An ad-hoc economy or bootstrap build chosen by the fallback chain.
    Fallback,
}

/// A single outstanding construction commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructionOrder {
    /// Registry handle.
    pub handle: OrderHandle,
    /// Requester.
    pub owner: OrderOwner,
    /// Unit doing the building.
    pub constructor: UnitId,
    /// Type being built (normalized).
    pub target_type: String,
    /// Where the result is expected to appear.
    pub expected_position: Vec3Fixed,
    /// Unit attributed to this order, once matched.
    pub spawned_unit: Option<UnitId>,
    /// Lifecycle state.
    pub state: OrderState,
}

impl ConstructionOrder {
    /// Pending or matched.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, OrderState::Pending | OrderState::Matched)
    }
}

/// What happened to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    /// A created unit was attributed to the order.
    UnitCreated {
        /// The new unit.
        unit: UnitId,
        /// Its type.
        unit_type: String,
    },
    /// The spawned unit finished construction.
    UnitFinished {
        /// The finished unit.
        unit: UnitId,
        /// Its type.
        unit_type: String,
    },
    /// The spawned unit, or the constructor of a pending order, died.
    UnitDestroyed {
        /// The destroyed unit.
        unit: UnitId,
    },
    /// Replaced by a newer order from the same constructor, or the
    /// constructor went idle.
    Superseded,
}

/// Notification routed to an order's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotification {
    /// The order after the transition.
    pub order: ConstructionOrder,
    /// The transition.
    pub event: OrderEvent,
}

impl OrderNotification {
    /// Whether the order left the registry with this notification.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.order.is_open()
    }
}

/// How many pending orders a single spawn may satisfy.
///
/// Attribution is stated two ways that disagree when orders overlap: a spawn
/// satisfies "every pending order of its type within range", yet the match
/// is also meant to be first-match-wins. Neither reading is settled, so both
/// are kept and the registry defaults to
/// [`MatchPolicy::AllWithinRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPolicy {
    /// Every pending order within range is matched. Follows the "every such
    /// order" reading, and reproduces double attribution of one spawn.
    #[default]
    AllWithinRange,
    /// Only the oldest pending order within range is matched. Follows the
    /// first-match-wins reading.
    FirstWithinRange,
}

/// Result of [`OrderRegistry::register_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    /// Handle of the new order.
    pub handle: OrderHandle,
    /// The constructor's previous order, now lost.
    pub superseded: Option<OrderNotification>,
}

/// All in-flight construction orders.
#[derive(Debug, Clone)]
pub struct OrderRegistry {
    orders: BTreeMap<OrderHandle, ConstructionOrder>,
    by_constructor: HashMap<UnitId, OrderHandle>,
    next_handle: u64,
    match_radius: Fixed,
    policy: MatchPolicy,
}

impl Default for OrderRegistry {
    fn default() -> Self {
        Self::new(Fixed::from_num(DEFAULT_MATCH_RADIUS), MatchPolicy::default())
    }
}

impl OrderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(match_radius: Fixed, policy: MatchPolicy) -> Self {
        Self {
            orders: BTreeMap::new(),
            by_constructor: HashMap::new(),
            next_handle: 1,
            match_radius,
            policy,
        }
    }

    /// Register a new pending order, superseding the constructor's previous one.
    ///
    /// Has no engine side effects.
    pub fn register_order(
        &mut self,
        owner: OrderOwner,
        constructor: UnitId,
        target_type: &str,
        expected_position: Vec3Fixed,
    ) -> Registered {
        let superseded = self.signal_constructor_idle(constructor);

        let handle = OrderHandle(self.next_handle);
        self.next_handle += 1;
        let order = ConstructionOrder {
            handle,
            owner,
            constructor,
            target_type: normalize_type_name(target_type),
            expected_position,
            spawned_unit: None,
            state: OrderState::Pending,
        };
        tracing::debug!(%handle, %constructor, target = %order.target_type, "order registered");
        self.orders.insert(handle, order);
        self.by_constructor.insert(constructor, handle);

        Registered { handle, superseded }
    }

    /// Cancel the constructor's current order without a replacement.
    pub fn signal_constructor_idle(&mut self, constructor: UnitId) -> Option<OrderNotification> {
        let handle = self.by_constructor.remove(&constructor)?;
        let Some(mut order) = self.orders.remove(&handle) else {
            tracing::warn!(%handle, %constructor, "constructor index pointed at a missing order");
            return None;
        };
        order.state = OrderState::Lost;
        tracing::debug!(%handle, %constructor, "order superseded");
        Some(OrderNotification {
            order,
            event: OrderEvent::Superseded,
        })
    }

    /// Attribute a newly created unit to matching pending orders.
    ///
    /// `spawn_position` is the host-reported position of the new unit; with
    /// no position nothing can match.
    pub fn on_unit_created(
        &mut self,
        unit: UnitId,
        unit_type: &str,
        spawn_position: Option<Vec3Fixed>,
    ) -> Vec<OrderNotification> {
        let Some(spawn) = spawn_position else {
            tracing::debug!(%unit, "created unit has no position; nothing matched");
            return Vec::new();
        };
        let unit_type = normalize_type_name(unit_type);

        let mut notifications = Vec::new();
        for order in self.orders.values_mut() {
            if order.state != OrderState::Pending || order.target_type != unit_type {
                continue;
            }
            if !order.expected_position.within(spawn, self.match_radius) {
                continue;
            }
            order.state = OrderState::Matched;
            order.spawned_unit = Some(unit);
            notifications.push(OrderNotification {
                order: order.clone(),
                event: OrderEvent::UnitCreated {
                    unit,
                    unit_type: unit_type.clone(),
                },
            });
            if self.policy == MatchPolicy::FirstWithinRange {
                break;
            }
        }

        if notifications.len() > 1 {
            tracing::info!(
                %unit,
                unit_type = %unit_type,
                matches = notifications.len(),
                "one spawn matched several pending orders"
            );
        }
        notifications
    }

    /// Complete every order whose spawned unit just finished.
    pub fn on_unit_finished(&mut self, unit: UnitId, unit_type: &str) -> Vec<OrderNotification> {
        let unit_type = normalize_type_name(unit_type);
        let handles: Vec<OrderHandle> = self
            .orders
            .values()
            .filter(|order| order.spawned_unit == Some(unit))
            .map(|order| order.handle)
            .collect();

        if handles.is_empty() {
            tracing::debug!(%unit, "finished unit has no order");
        }

        handles
            .into_iter()
            .filter_map(|handle| self.retire(handle, OrderState::Finished))
            .map(|order| OrderNotification {
                order,
                event: OrderEvent::UnitFinished {
                    unit,
                    unit_type: unit_type.clone(),
                },
            })
            .collect()
    }

    /// Lose every order whose spawned unit died, and every pending order
    /// whose constructor died.
    pub fn on_unit_destroyed(&mut self, unit: UnitId) -> Vec<OrderNotification> {
        let handles: Vec<OrderHandle> = self
            .orders
            .values()
            .filter(|order| {
                order.spawned_unit == Some(unit)
                    || (order.state == OrderState::Pending && order.constructor == unit)
            })
            .map(|order| order.handle)
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| self.retire(handle, OrderState::Lost))
            .map(|order| OrderNotification {
                order,
                event: OrderEvent::UnitDestroyed { unit },
            })
            .collect()
    }

    fn retire(&mut self, handle: OrderHandle, state: OrderState) -> Option<ConstructionOrder> {
        let mut order = self.orders.remove(&handle)?;
        if self.by_constructor.get(&order.constructor) == Some(&handle) {
            self.by_constructor.remove(&order.constructor);
        }
        order.state = state;
        tracing::debug!(%handle, ?state, "order retired");
        Some(order)
    }

    /// Look up an order.
    #[must_use]
    pub fn get(&self, handle: OrderHandle) -> Option<&ConstructionOrder> {
        self.orders.get(&handle)
    }

    /// The constructor's open order, if any.
    #[must_use]
    pub fn order_for_constructor(&self, constructor: UnitId) -> Option<&ConstructionOrder> {
        self.by_constructor
            .get(&constructor)
            .and_then(|handle| self.orders.get(handle))
    }

    /// Every open order built by `constructor`.
    #[must_use]
    pub fn open_orders_for(&self, constructor: UnitId) -> Vec<&ConstructionOrder> {
        self.orders
            .values()
            .filter(|order| order.constructor == constructor && order.is_open())
            .collect()
    }

    /// All orders in registration order.
    pub fn orders(&self) -> impl Iterator<Item = &ConstructionOrder> {
        self.orders.values()
    }

    /// Number of open orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether no order is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILDER: UnitId = UnitId(1);

    fn goal_owner() -> OrderOwner {
        OrderOwner::Goal(GoalId(0))
    }

    fn registered(registry: &mut OrderRegistry, constructor: UnitId, x: i32) -> OrderHandle {
        registry
            .register_order(goal_owner(), constructor, "T", Vec3Fixed::from_ints(x, 0, 1000))
            .handle
    }

    #[test]
    fn test_spawn_within_radius_matches() {
        let mut registry = OrderRegistry::default();
        let handle = registered(&mut registry, BUILDER, 1000);

        let notes =
            registry.on_unit_created(UnitId(7), "T", Some(Vec3Fixed::from_ints(1100, 0, 1000)));

        assert_eq!(notes.len(), 1);
        let order = registry.get(handle).unwrap();
        assert_eq!(order.state, OrderState::Matched);
        assert_eq!(order.spawned_unit, Some(UnitId(7)));
    }

    #[test]
    fn test_spawn_outside_radius_stays_pending() {
        let mut registry = OrderRegistry::default();
        let handle = registered(&mut registry, BUILDER, 1000);

        let notes =
            registry.on_unit_created(UnitId(7), "T", Some(Vec3Fixed::from_ints(1800, 0, 1000)));

        assert!(notes.is_empty());
        let order = registry.get(handle).unwrap();
        assert_eq!(order.state, OrderState::Pending);
        assert_eq!(order.spawned_unit, None);
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let mut registry = OrderRegistry::default();
        registered(&mut registry, BUILDER, 1000);
        let notes =
            registry.on_unit_created(UnitId(7), "U", Some(Vec3Fixed::from_ints(1000, 0, 1000)));
        assert!(notes.is_empty());
    }

    #[test]
    fn test_missing_spawn_position_never_matches() {
        let mut registry = OrderRegistry::default();
        registered(&mut registry, BUILDER, 1000);
        assert!(registry.on_unit_created(UnitId(7), "T", None).is_empty());
    }

    #[test]
    fn test_all_within_range_matches_every_nearby_order() {
        let mut registry = OrderRegistry::default();
        let a = registered(&mut registry, UnitId(1), 1000);
        let b = registered(&mut registry, UnitId(2), 1050);

        let notes =
            registry.on_unit_created(UnitId(7), "T", Some(Vec3Fixed::from_ints(1020, 0, 1000)));

        assert_eq!(notes.len(), 2);
        assert_eq!(registry.get(a).unwrap().spawned_unit, Some(UnitId(7)));
        assert_eq!(registry.get(b).unwrap().spawned_unit, Some(UnitId(7)));
    }

    #[test]
    fn test_first_within_range_matches_oldest_only() {
        let radius = Fixed::from_num(DEFAULT_MATCH_RADIUS);
        let mut registry = OrderRegistry::new(radius, MatchPolicy::FirstWithinRange);
        let a = registered(&mut registry, UnitId(1), 1000);
        let b = registered(&mut registry, UnitId(2), 1050);

        let notes =
            registry.on_unit_created(UnitId(7), "T", Some(Vec3Fixed::from_ints(1020, 0, 1000)));

        assert_eq!(notes.len(), 1);
        assert_eq!(registry.get(a).unwrap().state, OrderState::Matched);
        assert_eq!(registry.get(b).unwrap().state, OrderState::Pending);
    }

    #[test]
    fn test_register_supersedes_previous_order() {
        let mut registry = OrderRegistry::default();
        let first = registered(&mut registry, BUILDER, 1000);
        let second = registry.register_order(goal_owner(), BUILDER, "U", Vec3Fixed::ZERO);

        let lost = second.superseded.unwrap();
        assert_eq!(lost.order.handle, first);
        assert_eq!(lost.order.state, OrderState::Lost);
        assert_eq!(lost.event, OrderEvent::Superseded);
        assert!(registry.get(first).is_none());
        assert_eq!(registry.open_orders_for(BUILDER).len(), 1);
    }

    #[test]
    fn test_idle_signal_clears_constructor() {
        let mut registry = OrderRegistry::default();
        registered(&mut registry, BUILDER, 1000);
        assert!(registry.signal_constructor_idle(BUILDER).is_some());
        assert!(registry.order_for_constructor(BUILDER).is_none());
        assert!(registry.open_orders_for(BUILDER).is_empty());
        assert!(registry.signal_constructor_idle(BUILDER).is_none());
    }

    #[test]
    fn test_finished_removes_matched_order() {
        let mut registry = OrderRegistry::default();
        let handle = registered(&mut registry, BUILDER, 1000);
        registry.on_unit_created(UnitId(7), "T", Some(Vec3Fixed::from_ints(1000, 0, 1000)));

        let notes = registry.on_unit_finished(UnitId(7), "T");

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].order.state, OrderState::Finished);
        assert!(notes[0].is_terminal());
        assert!(registry.get(handle).is_none());
        assert!(registry.order_for_constructor(BUILDER).is_none());
    }

    #[test]
    fn test_finished_twice_is_a_noop() {
        let mut registry = OrderRegistry::default();
        registered(&mut registry, BUILDER, 1000);
        registry.on_unit_created(UnitId(7), "T", Some(Vec3Fixed::from_ints(1000, 0, 1000)));
        registry.on_unit_finished(UnitId(7), "T");
        assert!(registry.on_unit_finished(UnitId(7), "T").is_empty());
    }

    #[test]
    fn test_constructor_death_loses_pending_order() {
        let mut registry = OrderRegistry::default();
        let handle = registered(&mut registry, BUILDER, 1000);

        let notes = registry.on_unit_destroyed(BUILDER);

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].order.handle, handle);
        assert_eq!(notes[0].order.state, OrderState::Lost);
        assert_eq!(notes[0].event, OrderEvent::UnitDestroyed { unit: BUILDER });
        assert!(registry.is_empty());
    }

    #[test]
    fn test_constructor_death_keeps_matched_order() {
        let mut registry = OrderRegistry::default();
        let handle = registered(&mut registry, BUILDER, 1000);
        registry.on_unit_created(UnitId(7), "T", Some(Vec3Fixed::from_ints(1000, 0, 1000)));

        assert!(registry.on_unit_destroyed(BUILDER).is_empty());
        assert_eq!(registry.get(handle).unwrap().state, OrderState::Matched);
    }

    #[test]
    fn test_spawned_unit_death_loses_order() {
        let mut registry = OrderRegistry::default();
        registered(&mut registry, BUILDER, 1000);
        registry.on_unit_created(UnitId(7), "T", Some(Vec3Fixed::from_ints(1000, 0, 1000)));

        let notes = registry.on_unit_destroyed(UnitId(7));

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].order.state, OrderState::Lost);
        assert!(registry.order_for_constructor(BUILDER).is_none());
    }
}
