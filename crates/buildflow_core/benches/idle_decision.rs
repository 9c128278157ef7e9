//! Idle decision benchmarks for buildflow_core.
//!
//! Run with: `cargo bench -p buildflow_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use buildflow_core::prelude::*;
use buildflow_test_utils::fixtures::{arm_host, pos};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

const BUILDERS: u32 = 32;

fn busy_team() -> (TaskScheduler, buildflow_test_utils::FakeHost) {
    let mut host = arm_host();
    for i in 0..32 {
        host.add_metal_spot(pos(i * 150, 900));
    }
    let mut scheduler = TaskScheduler::new(WorkflowConfig {
        goals: vec![
            GoalSpec::new(2.0, "armmex", 64),
            GoalSpec::new(2.0, "armsolar", 64),
            GoalSpec::new(1.0, "armvp", 4),
        ],
        ..WorkflowConfig::default()
    });
    for id in 1..=BUILDERS {
        let unit = UnitId(id);
        host.spawn(unit, "armcv", pos(id as i32 * 100, 0));
        scheduler.on_unit_created(&mut host, unit, "armcv");
    }
    (scheduler, host)
}

/// One idle decision with a full team of builders.
pub fn idle_decision_benchmark(c: &mut Criterion) {
    c.bench_function("idle_decision_goal", |b| {
        b.iter_batched(
            busy_team,
            |(mut scheduler, mut host)| {
                black_box(scheduler.on_unit_idle(&mut host, UnitId(1)).ok());
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("idle_sweep_32_builders", |b| {
        b.iter_batched(
            busy_team,
            |(mut scheduler, mut host)| {
                black_box(scheduler.idle_sweep(&mut host).len());
            },
            BatchSize::SmallInput,
        )
    });
}

/// Spawn matching against many pending orders.
pub fn spawn_matching_benchmark(c: &mut Criterion) {
    c.bench_function("spawn_match_256_orders", |b| {
        b.iter_batched(
            || {
                let mut registry = OrderRegistry::default();
                for id in 0..256 {
                    registry.register_order(
                        OrderOwner::Fallback,
                        UnitId(id),
                        "armsolar",
                        pos(id as i32 * 1000, 0),
                    );
                }
                registry
            },
            |mut registry| {
                let spawn = Some(pos(128_000, 10));
                black_box(registry.on_unit_created(UnitId(9999), "armsolar", spawn))
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, idle_decision_benchmark, spawn_matching_benchmark);
criterion_main!(benches);
