// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integration tests for priority ordering, budget allocation and adaptive rates.
//!
//! Systems advance a shared `ManualTime` by their simulated cost, so the
//! conductor measures exact, deterministic execution times.

use cadence_control::{Conductor, ConductorReport};
use cadence_core::{ManualFrameClock, ManualTime, Priority, SystemHooks};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

const EPSILON: f64 = 1e-6;

struct Harness {
    clock: ManualFrameClock,
    time: ManualTime,
    conductor: Conductor,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualFrameClock::new();
        let time = ManualTime::new();
        let conductor = Conductor::builder(Rc::new(clock.clone()))
            .time_source(Rc::new(time.clone()))
            .build()
            .expect("default configuration is valid");
        Self {
            clock,
            time,
            conductor,
        }
    }

    /// A system that costs `cost_ms` per call.
    fn costed(&self, cost_ms: f64) -> SystemHooks {
        let time = self.time.clone();
        SystemHooks::new().update(move |_| {
            time.advance(cost_ms);
            Ok(())
        })
    }

    /// A system whose cost can be changed while it is registered.
    fn variable(&self, cost: Rc<Cell<f64>>) -> SystemHooks {
        let time = self.time.clone();
        SystemHooks::new().update(move |_| {
            time.advance(cost.get());
            Ok(())
        })
    }

    fn report(&self) -> ConductorReport {
        self.conductor.report()
    }
}

fn exec_count(report: &ConductorReport, name: &str) -> u64 {
    report.system(name).map(|s| s.exec_count).unwrap_or_default()
}

fn budget_skips(report: &ConductorReport) -> u64 {
    report
        .per_system
        .values()
        .map(|s| s.budget_skipped_count)
        .sum()
}

/// Registers the A/B/C workload: A critical, B normal at 60Hz, C background at 10Hz.
fn register_workload(harness: &Harness, b_cost_ms: f64, a_cost_ms: f64) {
    let conductor = &harness.conductor;
    conductor
        .register_with("A", harness.costed(a_cost_ms), Priority::Critical, 60.0)
        .unwrap();
    conductor
        .register_with("B", harness.costed(b_cost_ms), Priority::Normal, 60.0)
        .unwrap();
    conductor
        .register_with("C", harness.costed(1.0), Priority::Background, 10.0)
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Workload scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_light_workload_runs_everything_at_its_rate() {
    let harness = Harness::new();
    register_workload(&harness, 1.0, 1.0);

    harness.clock.tick_many(0.0, 16.0, 120);

    let report = harness.report();
    assert_eq!(exec_count(&report, "A"), 120);
    assert_eq!(exec_count(&report, "B"), 120);
    assert_eq!(exec_count(&report, "C"), 20);
    assert_eq!(budget_skips(&report), 0, "light load never exhausts the budget");
    assert_eq!(report.tick_count, 120);
}

#[test]
fn test_heavy_normal_starves_background() {
    let light = Harness::new();
    register_workload(&light, 1.0, 2.0);
    light.clock.tick_many(0.0, 16.0, 120);
    let light_report = light.report();

    let heavy = Harness::new();
    register_workload(&heavy, 14.0, 2.0);
    heavy.clock.tick_many(0.0, 16.0, 120);
    let heavy_report = heavy.report();

    let light_c = light_report.system("C").unwrap();
    let heavy_c = heavy_report.system("C").unwrap();
    assert!(heavy_c.budget_skipped_count > light_c.budget_skipped_count);
    assert!(heavy_c.exec_count < light_c.exec_count);
    assert_eq!(heavy_c.exec_count, 0, "A and B consume the whole 16ms every tick");

    // The normal system itself still runs every tick.
    assert_eq!(exec_count(&heavy_report, "B"), 120);
    // 14ms is 2.6x the fair share: not enough to be slowed down.
    let b = heavy_report.system("B").unwrap();
    assert!((b.effective_interval_ms - 1000.0 / 60.0).abs() < EPSILON);
}

// ─────────────────────────────────────────────────────────────────────────────
// Budget allocation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_remaining_budget_matches_measured_costs() {
    let harness = Harness::new();
    register_workload(&harness, 3.0, 2.0);

    for frame in 0..40 {
        harness.clock.tick(f64::from(frame) * 16.0);
        let tick = harness.report().last_tick.expect("a tick ran");
        assert!(tick.remaining_budget_ms >= 0.0);

        let expected_spent: f64 = tick
            .executed
            .iter()
            .map(|name| match name.as_str() {
                "A" => 2.0,
                "B" => 3.0,
                _ => 1.0,
            })
            .sum();
        assert!((tick.spent_ms - expected_spent).abs() < EPSILON);
        assert!(
            (tick.remaining_budget_ms - (tick.frame_budget_ms - tick.spent_ms)).abs() < EPSILON
        );
    }
}

#[test]
fn test_critical_runs_even_when_over_budget() {
    let harness = Harness::new();
    let conductor = &harness.conductor;
    conductor
        .register_with("physics", harness.costed(20.0), Priority::Critical, 60.0)
        .unwrap();
    conductor
        .register_with("critical-2", harness.costed(1.0), Priority::Critical, 60.0)
        .unwrap();
    conductor.register("trail", harness.costed(1.0)).unwrap();

    harness.clock.tick_many(0.0, 16.0, 10);

    let report = harness.report();
    assert_eq!(exec_count(&report, "physics"), 10);
    assert_eq!(exec_count(&report, "critical-2"), 10);
    assert_eq!(exec_count(&report, "trail"), 0);
    assert_eq!(report.system("trail").unwrap().budget_skipped_count, 10);

    let tick = report.last_tick.unwrap();
    assert_eq!(tick.remaining_budget_ms, 0.0, "clamped, never negative");
    assert!((tick.spent_ms - 21.0).abs() < EPSILON);
    assert_eq!(tick.budget_skipped, vec!["trail".to_string()]);
}

#[test]
fn test_execution_order_is_priority_then_registration() {
    let harness = Harness::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    let recorder = |name: &'static str| {
        let order = order.clone();
        SystemHooks::new().update(move |_| {
            order.borrow_mut().push(name);
            Ok(())
        })
    };

    let conductor = &harness.conductor;
    conductor
        .register_with("bg", recorder("bg"), Priority::Background, 60.0)
        .unwrap();
    conductor
        .register_with("normal-1", recorder("normal-1"), Priority::Normal, 60.0)
        .unwrap();
    conductor
        .register_with("critical", recorder("critical"), Priority::Critical, 60.0)
        .unwrap();
    conductor
        .register_with("normal-2", recorder("normal-2"), Priority::Normal, 60.0)
        .unwrap();

    harness.clock.tick(0.0);
    assert_eq!(
        *order.borrow(),
        vec!["critical", "normal-1", "normal-2", "bg"]
    );
}

#[test]
fn test_failing_system_is_isolated() {
    let harness = Harness::new();
    let steady_runs = Rc::new(Cell::new(0));
    let sink = steady_runs.clone();

    let conductor = &harness.conductor;
    conductor
        .register(
            "flaky",
            SystemHooks::new().update(|_| Err(anyhow::anyhow!("texture not ready"))),
        )
        .unwrap();
    conductor
        .register(
            "steady",
            SystemHooks::new().update(move |_| {
                sink.set(sink.get() + 1);
                Ok(())
            }),
        )
        .unwrap();

    harness.clock.tick_many(0.0, 16.0, 5);

    let report = harness.report();
    let flaky = report.system("flaky").unwrap();
    assert_eq!(flaky.fault_count, 5);
    assert_eq!(flaky.exec_count, 5, "a faulting call still counts as an execution");
    assert_eq!(steady_runs.get(), 5);
    assert!(conductor.is_registered("flaky"), "faults never unregister");
}

#[test]
fn test_over_budget_streak_is_tracked() {
    let harness = Harness::new();
    harness.conductor.register("hog", harness.costed(10.0)).unwrap();
    harness
        .conductor
        .register("light", harness.costed(1.0))
        .unwrap();

    harness.clock.tick_many(0.0, 16.0, 4);

    // Fair share is 16ms / 2 systems = 8ms.
    let report = harness.report();
    assert_eq!(report.system("hog").unwrap().consecutive_over_budget, 4);
    assert_eq!(report.system("light").unwrap().consecutive_over_budget, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Adaptive rate control
// ─────────────────────────────────────────────────────────────────────────────

/// Registers one expensive normal system next to two idle background ones.
fn register_hog(harness: &Harness, cost: Rc<Cell<f64>>) {
    let conductor = &harness.conductor;
    conductor
        .register_with("hog", harness.variable(cost), Priority::Normal, 60.0)
        .unwrap();
    conductor
        .register_with("idle-1", harness.costed(0.0), Priority::Background, 10.0)
        .unwrap();
    conductor
        .register_with("idle-2", harness.costed(0.0), Priority::Background, 10.0)
        .unwrap();
}

#[test]
fn test_expensive_system_is_slowed_after_window() {
    let harness = Harness::new();
    register_hog(&harness, Rc::new(Cell::new(20.0)));
    let nominal = 1000.0 / 60.0;

    // Ticks 0..=1984: no pass yet.
    let next = harness.clock.tick_many(0.0, 16.0, 125);
    let report = harness.report();
    assert_eq!(report.adaptive_passes, 0);
    assert!((report.system("hog").unwrap().effective_interval_ms - nominal).abs() < EPSILON);

    // Tick 2000 closes the first window: 126 calls at 20ms against 126 ticks
    // of a 16/3ms allowance is 3.75x.
    harness.clock.tick(next);
    let report = harness.report();
    assert_eq!(report.adaptive_passes, 1);
    let hog = report.system("hog").unwrap();
    assert!((hog.effective_interval_ms - nominal * 1.5).abs() < EPSILON);
    assert_eq!(hog.exec_count, 126);

    // The stretched interval takes effect on the following ticks.
    harness.clock.tick(next + 16.0);
    assert_eq!(exec_count(&harness.report(), "hog"), 126);
    harness.clock.tick(next + 32.0);
    assert_eq!(exec_count(&harness.report(), "hog"), 127);
}

#[test]
fn test_recovered_system_contracts_back_to_nominal() {
    let harness = Harness::new();
    let cost = Rc::new(Cell::new(20.0));
    register_hog(&harness, cost.clone());
    let nominal = 1000.0 / 60.0;

    // First window (0..=2000) is expensive.
    let next = harness.clock.tick_many(0.0, 16.0, 126);
    let expanded = harness.report().system("hog").unwrap().effective_interval_ms;
    assert!((expanded - nominal * 1.5).abs() < EPSILON);

    // Second window (2016..=4000) is cheap: more than 40% headroom.
    cost.set(1.0);
    let next = harness.clock.tick_many(next, 16.0, 125);
    let contracted = harness.report().system("hog").unwrap().effective_interval_ms;
    assert!((contracted - expanded * 0.8).abs() < EPSILON);
    assert!(contracted > nominal);

    // Third window: contraction stops at the nominal interval.
    harness.clock.tick_many(next, 16.0, 125);
    let report = harness.report();
    assert_eq!(report.adaptive_passes, 3);
    let settled = report.system("hog").unwrap().effective_interval_ms;
    assert!((settled - nominal).abs() < EPSILON);
}

#[test]
fn test_slow_system_within_its_window_share_is_not_slowed() {
    let harness = Harness::new();
    let conductor = &harness.conductor;
    conductor
        .register_with("stars", harness.costed(16.0), Priority::Background, 10.0)
        .unwrap();
    conductor.register("ui-1", harness.costed(0.0)).unwrap();
    conductor.register("ui-2", harness.costed(0.0)).unwrap();

    harness.clock.tick_many(0.0, 16.0, 126);

    // 21 calls at 16ms is 336ms against a 672ms share.
    let report = harness.report();
    assert_eq!(report.adaptive_passes, 1);
    let stars = report.system("stars").unwrap();
    assert_eq!(stars.exec_count, 21);
    assert!((stars.effective_interval_ms - 100.0).abs() < EPSILON);
}

#[test]
fn test_restart_starts_a_fresh_adaptive_window() {
    let harness = Harness::new();
    let cost = Rc::new(Cell::new(60.0));
    register_hog(&harness, cost.clone());
    let nominal = 1000.0 / 60.0;

    harness.clock.tick_many(0.0, 16.0, 120);
    harness.conductor.stop();
    cost.set(1.0);
    harness.conductor.start();

    // A full cheap window after the restart.
    harness.clock.tick_many(5000.0, 16.0, 126);

    let report = harness.report();
    assert_eq!(report.adaptive_passes, 1);
    let hog = report.system("hog").unwrap();
    assert!((hog.effective_interval_ms - nominal).abs() < EPSILON);
    assert!(hog.max_exec_ms >= 60.0, "the expensive calls did happen");
}

#[test]
fn test_idle_background_systems_keep_nominal_interval() {
    let harness = Harness::new();
    register_hog(&harness, Rc::new(Cell::new(1.0)));

    harness.clock.tick_many(0.0, 16.0, 300);

    let report = harness.report();
    assert!(report.adaptive_passes >= 2);
    for name in ["idle-1", "idle-2"] {
        let system = report.system(name).unwrap();
        assert!((system.effective_interval_ms - 100.0).abs() < EPSILON);
        assert!(system.exec_count > 0);
    }
}
