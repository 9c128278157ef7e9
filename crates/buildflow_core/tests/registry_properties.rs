//! Property-based tests for order bookkeeping.
//!
//! Random sequences of registry mutations must never break the
//! one-open-order-per-constructor rule, and goal counts must move by exactly
//! one per completed unit.

use buildflow_core::prelude::*;
use buildflow_test_utils::fixtures::{arm_host, pos};
use buildflow_test_utils::proptest::prelude::*;
use buildflow_test_utils::strategies::{arb_constructor, arb_registry_ops, RegistryOp};

fn apply(registry: &mut OrderRegistry, op: &RegistryOp) -> Vec<OrderNotification> {
    match op {
        RegistryOp::Register {
            constructor,
            target,
            position,
        } => registry
            .register_order(OrderOwner::Fallback, *constructor, target, *position)
            .superseded
            .into_iter()
            .collect(),
        RegistryOp::Idle { constructor } => {
            registry.signal_constructor_idle(*constructor).into_iter().collect()
        }
        RegistryOp::Created {
            unit,
            unit_type,
            position,
        } => registry.on_unit_created(*unit, unit_type, Some(*position)),
        RegistryOp::Finished { unit, unit_type } => registry.on_unit_finished(*unit, unit_type),
        RegistryOp::Destroyed { unit } => registry.on_unit_destroyed(*unit),
    }
}

proptest! {
    /// No operation sequence leaves two open orders for one constructor.
    #[test]
    fn prop_at_most_one_open_order_per_constructor(ops in arb_registry_ops(40)) {
        let mut registry = OrderRegistry::default();
        for op in &ops {
            apply(&mut registry, op);
            for id in 1..=6 {
                prop_assert!(registry.open_orders_for(UnitId(id)).len() <= 1);
            }
        }
    }

    /// Going idle always clears the constructor's orders.
    #[test]
    fn prop_idle_clears_orders(
        ops in arb_registry_ops(40),
        constructor in arb_constructor(),
    ) {
        let mut registry = OrderRegistry::default();
        for op in &ops {
            apply(&mut registry, op);
        }

        registry.signal_constructor_idle(constructor);

        prop_assert!(registry.order_for_constructor(constructor).is_none());
        prop_assert!(registry.open_orders_for(constructor).is_empty());
    }

    /// Every notification that retires an order reports a closed state, and
    /// retired orders are gone from the registry.
    #[test]
    fn prop_terminal_notifications_leave_registry(ops in arb_registry_ops(40)) {
        let mut registry = OrderRegistry::default();
        for op in &ops {
            for note in apply(&mut registry, op) {
                if note.is_terminal() {
                    prop_assert!(registry.get(note.order.handle).is_none());
                } else {
                    prop_assert_eq!(note.order.state, OrderState::Matched);
                }
            }
        }
    }

    /// With orders spaced beyond the match radius, finishing one spawned unit
    /// lowers the goal's in-flight count by exactly one.
    #[test]
    fn prop_finished_decrements_in_flight_by_one(
        builders in 1usize..5,
        spacing in 600i32..2000,
        offset in 0i32..99,
        pick in 0usize..5,
    ) {
        let pick = pick % builders;
        let mut host = arm_host();
        let mut scheduler = TaskScheduler::new(WorkflowConfig {
            goals: vec![GoalSpec::new(1.0, "armsolar", 10)],
            ..WorkflowConfig::default()
        });
        let ids: Vec<UnitId> = (0..builders).map(|i| UnitId(i as u32 + 1)).collect();
        for (i, id) in ids.iter().enumerate() {
            host.spawn(*id, "armcv", pos(i as i32 * spacing, 0));
            scheduler.on_unit_created(&mut host, *id, "armcv");
            let decision = scheduler.on_unit_idle(&mut host, *id).unwrap();
            prop_assert!(matches!(decision, Decision::Goal { .. }), "{decision:?}");
        }
        let in_flight = |s: &TaskScheduler| s.goals().get(GoalId(0)).unwrap().in_flight.len();
        prop_assert_eq!(in_flight(&scheduler), builders);

        let solar = UnitId(100);
        host.spawn(solar, "armsolar", pos(pick as i32 * spacing + offset, 0));
        scheduler.on_unit_created(&mut host, solar, "armsolar");
        scheduler.on_unit_finished(&mut host, solar, "armsolar").unwrap();

        prop_assert_eq!(in_flight(&scheduler), builders - 1);
        prop_assert!(scheduler.registry().order_for_constructor(ids[pick]).is_none());
    }

    /// Repeated idle events while assisting the same builder send one Guard.
    #[test]
    fn prop_assist_is_idempotent(repeats in 1usize..8) {
        let helper = UnitId(1);
        let worker = UnitId(2);
        let mut host = arm_host();
        host.spawn(helper, "armcom", pos(0, 0));
        host.spawn(worker, "armcv", pos(400, 0));
        let mut scheduler = TaskScheduler::new(WorkflowConfig {
            goals: vec![GoalSpec::new(1.0, "armsolar", 1)],
            ..WorkflowConfig::default()
        });
        scheduler.on_unit_created(&mut host, helper, "armcom");
        scheduler.on_unit_created(&mut host, worker, "armcv");
        scheduler.on_unit_idle(&mut host, worker).unwrap();

        for _ in 0..repeats {
            scheduler.on_unit_idle(&mut host, helper).unwrap();
        }

        let guard = Command::Guard(worker);
        prop_assert_eq!(host.orders_for(helper), vec![&guard]);
        prop_assert_eq!(scheduler.assist_target(helper), Some(worker));
    }
}
