//! Engine dispatch tests: event routing, re-entrant callbacks, chat commands.

use std::cell::Cell;
use std::rc::Rc;

use buildflow_core::prelude::*;
use buildflow_test_utils::fixtures::{arm_host, mex_solar_config, pos};
use buildflow_test_utils::FakeHost;

const COMMANDER: UnitId = UnitId(1);
const VEHICLE: UnitId = UnitId(2);

fn two_builder_host() -> FakeHost {
    let mut host = arm_host();
    host.spawn(COMMANDER, "armcom", pos(0, 0));
    host.spawn(VEHICLE, "armcv", pos(800, 0));
    host
}

fn created(unit: UnitId, unit_type: &str) -> HostEvent {
    HostEvent::UnitCreated {
        unit,
        unit_type: unit_type.to_string(),
    }
}

#[test]
fn test_events_drive_decisions() {
    let engine = Engine::new(mex_solar_config(), two_builder_host());

    assert_eq!(engine.dispatch(created(COMMANDER, "armcom")).processed, 1);
    let report = engine.dispatch(HostEvent::UnitIdle { unit: COMMANDER });

    assert_eq!(report.processed, 1);
    assert!(report.errors.is_empty());
    assert_eq!(engine.with_host(|host| host.orders().len()), 1);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.orders.len(), 1);
    assert_eq!(snapshot.active, vec![COMMANDER]);
}

#[test]
fn test_activate_picks_up_existing_units() {
    let engine = Engine::new(mex_solar_config(), two_builder_host());

    assert!(engine.activate().is_empty());

    let host = engine.into_host();
    assert_eq!(host.orders_for(COMMANDER).len(), 1);
    assert_eq!(host.orders_for(VEHICLE).len(), 1);
}

#[test]
fn test_rejection_reported_without_stopping_drain() {
    let mut host = two_builder_host();
    host.reject_orders("not now");
    let engine = Engine::new(mex_solar_config(), host);
    engine.dispatch(created(COMMANDER, "armcom"));

    let report = engine.dispatch(HostEvent::UnitIdle { unit: COMMANDER });

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].is_gateway_rejection());
    assert!(engine.snapshot().active.is_empty());
}

#[test]
fn test_reentrant_dispatch_is_queued_and_drained() {
    let engine = Rc::new(Engine::new(mex_solar_config(), two_builder_host()));
    engine.dispatch(created(COMMANDER, "armcom"));
    engine.dispatch(created(VEHICLE, "armcv"));

    let weak = Rc::downgrade(&engine);
    let fired = Rc::new(Cell::new(false));
    let deferred = Rc::new(Cell::new(false));
    {
        let fired = Rc::clone(&fired);
        let deferred = Rc::clone(&deferred);
        engine.with_host(move |host| {
            host.set_order_hook(move |_, _| {
                if fired.replace(true) {
                    return;
                }
                if let Some(engine) = weak.upgrade() {
                    let report = engine.dispatch(HostEvent::UnitIdle { unit: VEHICLE });
                    deferred.set(report.deferred());
                }
            });
        });
    }

    let report = engine.dispatch(HostEvent::UnitIdle { unit: COMMANDER });

    assert!(deferred.get());
    assert_eq!(report.processed, 2);
    assert!(report.errors.is_empty());
    assert_eq!(engine.pending_events(), 0);
    engine.with_host(|host| {
        assert_eq!(host.orders_for(COMMANDER).len(), 1);
        assert_eq!(host.orders_for(VEHICLE).len(), 1);
    });
}

#[test]
fn test_events_raised_during_activation_are_drained() {
    let engine = Rc::new(Engine::new(mex_solar_config(), two_builder_host()));

    let weak = Rc::downgrade(&engine);
    let destroyed = Rc::new(Cell::new(None));
    {
        let destroyed = Rc::clone(&destroyed);
        engine.with_host(move |host| {
            host.set_order_hook(move |unit, _| {
                if destroyed.get().is_some() {
                    return;
                }
                destroyed.set(Some(unit));
                if let Some(engine) = weak.upgrade() {
                    engine.dispatch(HostEvent::UnitDestroyed {
                        unit,
                        attacker: None,
                    });
                }
            });
        });
    }

    assert!(engine.activate().is_empty());

    let lost = destroyed.get().unwrap();
    assert_eq!(engine.pending_events(), 0);
    let snapshot = engine.snapshot();
    assert!(snapshot.orders.iter().all(|order| order.constructor != lost));
    assert!(!snapshot.active.contains(&lost));
}

#[test]
fn test_destroyed_event_retires_order() {
    let engine = Engine::new(mex_solar_config(), two_builder_host());
    engine.dispatch(created(COMMANDER, "armcom"));
    engine.dispatch(HostEvent::UnitIdle { unit: COMMANDER });

    engine.dispatch(HostEvent::UnitDestroyed {
        unit: COMMANDER,
        attacker: None,
    });

    let snapshot = engine.snapshot();
    assert!(snapshot.orders.is_empty());
    assert!(snapshot.goals.iter().all(|goal| goal.in_flight == 0));
}

#[test]
fn test_dump_workflow_over_chat() {
    let config = WorkflowConfig {
        debug_commands: true,
        team: 1,
        ..mex_solar_config()
    };
    let engine = Engine::new(config, two_builder_host());
    engine.dispatch(created(COMMANDER, "armcom"));
    engine.dispatch(HostEvent::UnitIdle { unit: COMMANDER });

    engine.dispatch(HostEvent::ChatMessage {
        text: ".csai1 dumpworkflow".to_string(),
        player: 0,
    });

    engine.with_host(|host| {
        let texts = host.texts();
        assert_eq!(texts[0], "Workflow:");
        assert!(texts
            .iter()
            .any(|line| line.contains("armmex") && line.contains("0(1) / 4")));
        assert!(texts.iter().any(|line| line == "Orders: 1"));
    });
}

#[test]
fn test_chat_ignored_without_debug_commands() {
    let engine = Engine::new(mex_solar_config(), two_builder_host());

    engine.dispatch(HostEvent::ChatMessage {
        text: ".csai help".to_string(),
        player: 0,
    });

    assert!(engine.with_host(|host| host.texts().is_empty()));
}

#[test]
fn test_chat_help_for_unknown_command() {
    let config = WorkflowConfig {
        debug_commands: true,
        ..mex_solar_config()
    };
    let engine = Engine::new(config, two_builder_host());

    engine.dispatch(HostEvent::ChatMessage {
        text: ".csai* wat".to_string(),
        player: 3,
    });

    engine.with_host(|host| {
        assert_eq!(host.texts(), [ConsoleCommand::help_text(0)]);
    });
}
