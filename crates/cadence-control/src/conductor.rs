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

//! The top-level frame orchestrator.
//!
//! The `Conductor` subscribes to a [`FrameClock`] and runs one cycle per
//! refresh:
//!
//! 1. Compute the delta and reset the frame budget.
//! 2. Walk the registry in priority order, admitting each system through the
//!    budget allocator, timing it and charging its cost.
//! 3. Run the adaptive rate pass when its window has elapsed.
//! 4. Feed the tick into telemetry and let the mode controller react.
//! 5. Apply registrations and removals queued during the tick.
//!
//! Everything runs on the thread that delivers the refresh. No borrow of the
//! scheduler state is held while a system runs, so systems may call back into
//! the conductor; mutations they request are queued until step 5.

use crate::adaptive::AdaptiveRateController;
use crate::budget::{self, Admission, FrameCycleState};
use crate::config::ConductorConfig;
use crate::error::ConductorError;
use crate::mode::{ModeController, ModeProfile};
use crate::registry::{SystemEntry, SystemRegistry, DEFAULT_TARGET_RATE_HZ};
use crate::report::{ConductorReport, SystemReport, TickSummary};
use crate::stats::SkipReason;
use cadence_core::{
    ConfigurationError, FrameClock, FrameSystem, Mode, MonotonicTime, Priority, SystemFault,
    SystemHandle, TelemetrySource, TickTimestamp, TimeSource, Unsubscribe,
};
use cadence_telemetry::{FrameHealthMonitor, HealthMonitorConfig};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

type SharedSystem = Rc<RefCell<dyn FrameSystem>>;

struct Registration {
    name: String,
    priority: Priority,
    target_rate_hz: f64,
    system: SharedSystem,
}

/// A control request issued while a tick was running.
enum PendingOp {
    Register(Registration),
    Unregister(String),
    SetEnabled(String, bool),
    Start,
    Stop,
}

struct ConductorState {
    registry: SystemRegistry,
    mode: ModeController,
    adaptive: AdaptiveRateController,
    frame_budget_ms: f64,
    cycle: FrameCycleState,
    previous_timestamp_ms: Option<f64>,
    in_tick: bool,
    pending: Vec<PendingOp>,
    manually_stopped: bool,
    tick_count: u64,
    last_tick: Option<TickSummary>,
}

struct Shared {
    config: ConductorConfig,
    clock: Rc<dyn FrameClock>,
    time: Rc<dyn TimeSource>,
    telemetry: Option<Rc<dyn TelemetrySource>>,
    timestamp: TickTimestamp,
    state: RefCell<ConductorState>,
    subscription: RefCell<Option<Unsubscribe>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.subscription.get_mut().take() {
            unsubscribe();
        }
    }
}

/// Builder for [`Conductor`].
pub struct ConductorBuilder {
    clock: Rc<dyn FrameClock>,
    config: ConductorConfig,
    time: Option<Rc<dyn TimeSource>>,
    telemetry: Option<Rc<dyn TelemetrySource>>,
}

impl ConductorBuilder {
    /// Starts a builder around the host's frame clock.
    pub fn new(clock: Rc<dyn FrameClock>) -> Self {
        Self {
            clock,
            config: ConductorConfig::default(),
            time: None,
            telemetry: None,
        }
    }

    /// Replaces the default configuration.
    pub fn config(mut self, config: ConductorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock used to measure execution cost. Defaults to [`MonotonicTime`].
    pub fn time_source(mut self, time: Rc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    /// Attaches the source of health metrics driving the mode controller.
    ///
    /// Without one the conductor stays in quality mode.
    pub fn telemetry(mut self, telemetry: Rc<dyn TelemetrySource>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Attaches a [`FrameHealthMonitor`] fed from the conductor's own tick deltas.
    pub fn with_frame_health(self, config: HealthMonitorConfig) -> Self {
        self.telemetry(Rc::new(FrameHealthMonitor::new(config)))
    }

    /// Validates the configuration and creates an idle conductor.
    pub fn build(self) -> Result<Conductor, ConductorError> {
        self.config.validate()?;

        let frame_budget_ms = self.config.frame_time_budget_ms;
        let state = ConductorState {
            registry: SystemRegistry::new(),
            mode: ModeController::new(self.config.thresholds),
            adaptive: AdaptiveRateController::new(&self.config),
            frame_budget_ms,
            cycle: FrameCycleState::begin(frame_budget_ms, 0.0),
            previous_timestamp_ms: None,
            in_tick: false,
            pending: Vec::new(),
            manually_stopped: false,
            tick_count: 0,
            last_tick: None,
        };

        log::debug!(
            "Conductor: created (budget={}ms, debug_logging={}).",
            frame_budget_ms,
            self.config.enable_debug_logging
        );

        Ok(Conductor {
            shared: Rc::new(Shared {
                config: self.config,
                clock: self.clock,
                time: self.time.unwrap_or_else(|| Rc::new(MonotonicTime::new())),
                telemetry: self.telemetry,
                timestamp: TickTimestamp::default(),
                state: RefCell::new(state),
                subscription: RefCell::new(None),
            }),
        })
    }
}

/// Coordinates registered systems under a shared per-frame time budget.
///
/// Cloning yields another handle to the same conductor. Systems that need to
/// reach their conductor should hold a [`WeakConductor`] instead, so they do
/// not keep it alive.
#[derive(Clone)]
pub struct Conductor {
    shared: Rc<Shared>,
}

/// A non-owning handle to a [`Conductor`].
#[derive(Clone)]
pub struct WeakConductor {
    shared: Weak<Shared>,
}

impl WeakConductor {
    /// Returns the conductor if it is still alive.
    pub fn upgrade(&self) -> Option<Conductor> {
        self.shared.upgrade().map(|shared| Conductor { shared })
    }
}

impl Conductor {
    /// Starts a [`ConductorBuilder`].
    pub fn builder(clock: Rc<dyn FrameClock>) -> ConductorBuilder {
        ConductorBuilder::new(clock)
    }

    /// Creates a conductor with the given configuration and default collaborators.
    pub fn new(clock: Rc<dyn FrameClock>, config: ConductorConfig) -> Result<Self, ConductorError> {
        ConductorBuilder::new(clock).config(config).build()
    }

    /// Returns a non-owning handle.
    pub fn downgrade(&self) -> WeakConductor {
        WeakConductor {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Returns the construction configuration.
    pub fn config(&self) -> &ConductorConfig {
        &self.shared.config
    }

    // --- Registration ---

    /// Registers a normal-priority system at 60 Hz.
    pub fn register(
        &self,
        name: &str,
        handle: impl Into<SystemHandle>,
    ) -> Result<(), ConfigurationError> {
        self.register_with(name, handle, Priority::Normal, DEFAULT_TARGET_RATE_HZ)
    }

    /// Registers a system, replacing any previous registration under `name`.
    ///
    /// The first registration starts the frame cycle unless [`stop`](Self::stop)
    /// was called. When invoked from inside a tick the registration takes
    /// effect at the end of that tick; validation errors are still returned
    /// immediately.
    pub fn register_with(
        &self,
        name: &str,
        handle: impl Into<SystemHandle>,
        priority: Priority,
        target_rate_hz: f64,
    ) -> Result<(), ConfigurationError> {
        let system =
            Self::validate_registration(name, handle.into(), target_rate_hz, &self.shared.timestamp)
                .map_err(|err| {
                    log::warn!("Conductor: rejected registration: {err}");
                    err
                })?;

        self.submit(PendingOp::Register(Registration {
            name: name.to_owned(),
            priority,
            target_rate_hz,
            system,
        }));
        Ok(())
    }

    fn validate_registration(
        name: &str,
        handle: SystemHandle,
        target_rate_hz: f64,
        timestamp: &TickTimestamp,
    ) -> Result<SharedSystem, ConfigurationError> {
        if name.is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        if !target_rate_hz.is_finite() || target_rate_hz <= 0.0 {
            return Err(ConfigurationError::InvalidTargetRate {
                name: name.to_owned(),
                rate_hz: target_rate_hz,
            });
        }
        handle.normalize(name, timestamp)
    }

    /// Removes the system registered under `name`. Unknown names are ignored.
    ///
    /// Removing the last system returns the conductor to idle.
    pub fn unregister(&self, name: &str) {
        self.submit(PendingOp::Unregister(name.to_owned()));
    }

    /// Enables or disables a system without unregistering it.
    pub fn set_enabled(&self, name: &str, enabled: bool) {
        self.submit(PendingOp::SetEnabled(name.to_owned(), enabled));
    }

    /// Returns true if a system is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.shared.state.borrow().registry.get(name).is_some()
    }

    /// Number of registered systems.
    pub fn system_count(&self) -> usize {
        self.shared.state.borrow().registry.len()
    }

    // --- Lifecycle ---

    /// Subscribes to the frame clock, even with nothing registered, and lifts
    /// a previous [`stop`](Self::stop).
    pub fn start(&self) {
        self.submit(PendingOp::Start);
    }

    /// Unsubscribes from the frame clock. Later registrations will not
    /// restart the cycle until [`start`](Self::start) is called.
    pub fn stop(&self) {
        self.submit(PendingOp::Stop);
    }

    /// Returns true while subscribed to the frame clock.
    pub fn is_active(&self) -> bool {
        self.shared.subscription.borrow().is_some()
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        self.shared.state.borrow().mode.current()
    }

    /// Frame budget in effect for the next tick.
    pub fn frame_budget_ms(&self) -> f64 {
        self.shared.state.borrow().frame_budget_ms
    }

    /// Takes a snapshot of the scheduler.
    pub fn report(&self) -> ConductorReport {
        let state = self.shared.state.borrow();
        ConductorReport {
            per_system: state
                .registry
                .iter()
                .map(|entry| (entry.name.clone(), SystemReport::from(entry)))
                .collect(),
            mode: state.mode.current(),
            frame_budget_ms: state.frame_budget_ms,
            active: self.is_active(),
            tick_count: state.tick_count,
            adaptive_passes: state.adaptive.passes(),
            mode_state: *state.mode.state(),
            last_tick: state.last_tick.clone(),
        }
    }

    // --- Internals ---

    /// Applies `op` now, or queues it if a tick is running.
    fn submit(&self, op: PendingOp) {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.in_tick {
                state.pending.push(op);
                return;
            }
        }
        self.apply(op);
    }

    fn apply(&self, op: PendingOp) {
        match op {
            PendingOp::Register(registration) => self.apply_register(registration),
            PendingOp::Unregister(name) => self.apply_unregister(&name),
            PendingOp::SetEnabled(name, enabled) => {
                let mut state = self.shared.state.borrow_mut();
                match state.registry.get_mut(&name) {
                    Some(entry) => {
                        entry.enabled = enabled;
                        log::info!(
                            "Conductor: '{}' {}.",
                            name,
                            if enabled { "enabled" } else { "disabled" }
                        );
                    }
                    None => log::debug!("Conductor: cannot toggle unknown system '{name}'."),
                }
            }
            PendingOp::Start => {
                self.shared.state.borrow_mut().manually_stopped = false;
                self.subscribe();
            }
            PendingOp::Stop => {
                self.shared.state.borrow_mut().manually_stopped = true;
                self.unsubscribe();
            }
        }
    }

    fn apply_register(&self, registration: Registration) {
        let config = &self.shared.config;
        let (replaced, auto_start) = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            let mode_scale = match registration.priority {
                Priority::Background => {
                    ModeProfile::for_mode(state.mode.current(), config).background_scale
                }
                _ => 1.0,
            };
            let entry = SystemEntry::new(
                registration.name,
                registration.priority,
                registration.target_rate_hz,
                registration.system,
                mode_scale,
                config.max_interval_ms,
            );
            (state.registry.insert(entry), !state.manually_stopped)
        };
        drop(replaced);

        if auto_start {
            self.subscribe();
        }
    }

    fn apply_unregister(&self, name: &str) {
        let (removed, now_empty) = {
            let mut state = self.shared.state.borrow_mut();
            let removed = state.registry.remove(name);
            (removed, state.registry.is_empty())
        };
        if removed.is_none() {
            log::debug!("Conductor: unregister of unknown system '{name}' ignored.");
            return;
        }
        log::info!("Conductor: unregistered '{name}'.");
        drop(removed);

        if now_empty && self.is_active() {
            log::info!("Conductor: last system removed, going idle.");
            self.unsubscribe();
        }
    }

    fn subscribe(&self) {
        if self.is_active() {
            return;
        }
        {
            let mut state = self.shared.state.borrow_mut();
            state.previous_timestamp_ms = None;
            state.adaptive.reset_schedule();
            state.registry.clear_windows();
        }

        let weak = Rc::downgrade(&self.shared);
        let unsubscribe = self.shared.clock.subscribe(Box::new(move |timestamp_ms| {
            if let Some(shared) = weak.upgrade() {
                Conductor { shared }.on_frame(timestamp_ms);
            }
        }));
        *self.shared.subscription.borrow_mut() = Some(unsubscribe);
        log::info!("Conductor: active, subscribed to the frame clock.");
    }

    fn unsubscribe(&self) {
        let subscription = self.shared.subscription.borrow_mut().take();
        if let Some(unsubscribe) = subscription {
            unsubscribe();
            log::info!("Conductor: idle, unsubscribed from the frame clock.");
        }
    }

    /// Runs one cycle for the refresh at `timestamp_ms`.
    fn on_frame(&self, timestamp_ms: f64) {
        let (delta_ms, system_count) = {
            let Ok(mut guard) = self.shared.state.try_borrow_mut() else {
                log::warn!("Conductor: re-entrant frame at {timestamp_ms:.2}ms ignored.");
                return;
            };
            let state = &mut *guard;
            if state.in_tick {
                log::warn!("Conductor: nested frame at {timestamp_ms:.2}ms ignored.");
                return;
            }
            state.in_tick = true;

            let delta_ms = state
                .previous_timestamp_ms
                .map_or(0.0, |previous| (timestamp_ms - previous).max(0.0));
            state.previous_timestamp_ms = Some(timestamp_ms);
            state.cycle = FrameCycleState::begin(state.frame_budget_ms, timestamp_ms);
            state.registry.open_windows(timestamp_ms);
            (delta_ms, state.registry.len())
        };
        self.shared.timestamp.set(timestamp_ms);

        let mut summary = TickSummary {
            timestamp_ms,
            delta_ms,
            ..Default::default()
        };
        // Registry mutations are deferred while `in_tick` is set, so indices are stable.
        for index in 0..system_count {
            self.run_system(index, timestamp_ms, delta_ms, &mut summary);
        }
        self.finish_tick(timestamp_ms, delta_ms, summary);
    }

    fn run_system(&self, index: usize, timestamp_ms: f64, delta_ms: f64, summary: &mut TickSummary) {
        let (name, system) = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            let Some(entry) = state.registry.at_mut(index) else {
                return;
            };
            if !entry.enabled {
                return;
            }
            let due = budget::is_due(
                entry.stats.last_executed_at_ms,
                timestamp_ms,
                delta_ms,
                entry.stats.effective_interval_ms,
            );
            match state.cycle.admit(entry.priority, due) {
                Admission::Run => (entry.name.clone(), Rc::clone(&entry.system)),
                Admission::Skip(reason) => {
                    entry.stats.record_skip(reason);
                    if reason == SkipReason::BudgetExhausted {
                        summary.budget_skipped.push(entry.name.clone());
                    }
                    return;
                }
            }
        };

        let started_ms = self.shared.time.now_ms();
        let outcome = match system.try_borrow_mut() {
            Ok(mut system) => system.update(delta_ms),
            Err(_) => Err(anyhow::anyhow!("system is already borrowed")),
        };
        let cost_ms = (self.shared.time.now_ms() - started_ms).max(0.0);

        let mut guard = self.shared.state.borrow_mut();
        let state = &mut *guard;
        state.cycle.charge(cost_ms);
        let allowance_ms = state.cycle.frame_budget_ms / state.registry.len().max(1) as f64;
        if let Some(entry) = state.registry.at_mut(index) {
            entry.stats.record_execution(timestamp_ms, cost_ms, allowance_ms);
            if let Err(cause) = outcome {
                entry.stats.record_fault();
                let fault = SystemFault::Execution {
                    name: name.clone(),
                    cause,
                };
                log::warn!("Conductor: {fault}");
            }
        }
        summary.executed.push(name);
    }

    fn finish_tick(&self, timestamp_ms: f64, delta_ms: f64, mut summary: TickSummary) {
        let config = &self.shared.config;
        let sample = self.shared.telemetry.as_ref().map(|telemetry| {
            if delta_ms > 0.0 {
                telemetry.record_frame(delta_ms);
            }
            telemetry.sample()
        });

        let transition = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            summary.frame_budget_ms = state.cycle.frame_budget_ms;
            summary.spent_ms = state.cycle.spent_ms;
            summary.remaining_budget_ms = state.cycle.remaining_budget_ms;
            state.tick_count += 1;

            if config.enable_debug_logging {
                log::debug!(
                    "Conductor: tick #{} at {:.2}ms (delta={:.2}ms) spent {:.2}/{:.2}ms, \
                     remaining {:.2}ms; ran {:?}, budget-skipped {:?}.",
                    state.tick_count,
                    timestamp_ms,
                    delta_ms,
                    summary.spent_ms,
                    summary.frame_budget_ms,
                    summary.remaining_budget_ms,
                    summary.executed,
                    summary.budget_skipped
                );
            }
            state.last_tick = Some(summary);

            if state.adaptive.is_due(timestamp_ms) {
                let pass =
                    state
                        .adaptive
                        .run_pass(timestamp_ms, &mut state.registry, state.frame_budget_ms);
                if config.enable_debug_logging {
                    log::debug!(
                        "Conductor: adaptive pass over {} ticks (share={:.2}ms) expanded {:?}, \
                         contracted {:?}.",
                        pass.window_ticks,
                        pass.window_share_ms,
                        pass.expanded,
                        pass.contracted
                    );
                }
            }

            match sample.and_then(|sample| state.mode.observe(sample)) {
                Some(mode) => {
                    apply_mode(state, mode, config);
                    let targets: Vec<(String, SharedSystem)> = state
                        .registry
                        .iter()
                        .map(|entry| (entry.name.clone(), Rc::clone(&entry.system)))
                        .collect();
                    Some((mode, targets))
                }
                None => None,
            }
        };

        if let Some((mode, targets)) = transition {
            self.notify_mode_change(mode, targets);
        }

        let pending = {
            let mut state = self.shared.state.borrow_mut();
            state.in_tick = false;
            std::mem::take(&mut state.pending)
        };
        for op in pending {
            self.apply(op);
        }
    }

    /// Delivers `mode` to every system. A failing hook never stops delivery
    /// to the rest.
    fn notify_mode_change(&self, mode: Mode, targets: Vec<(String, SharedSystem)>) {
        let mut faulted = Vec::new();
        for (name, system) in targets {
            let outcome = match system.try_borrow_mut() {
                Ok(mut system) => system.on_mode_change(mode),
                Err(_) => Err(anyhow::anyhow!("system is already borrowed")),
            };
            if let Err(cause) = outcome {
                let fault = SystemFault::ModeNotification { name, mode, cause };
                log::warn!("Conductor: {fault}");
                faulted.push(fault.system_name().to_owned());
            }
        }

        let mut state = self.shared.state.borrow_mut();
        for name in faulted {
            if let Some(entry) = state.registry.get_mut(&name) {
                entry.stats.record_mode_fault();
            }
        }
    }
}

/// Switches budget and cadence to `mode`.
///
/// Quality drops any adaptive stretch and the background multiplier, so
/// repeated flips never compound.
fn apply_mode(state: &mut ConductorState, mode: Mode, config: &ConductorConfig) {
    let profile = ModeProfile::for_mode(mode, config);
    state.frame_budget_ms = profile.frame_budget_ms;
    for entry in state.registry.iter_mut() {
        entry.stats.mode_scale = match entry.priority {
            Priority::Background => profile.background_scale,
            _ => 1.0,
        };
        if mode == Mode::Quality {
            entry.stats.adaptive_interval_ms = entry.nominal_interval_ms;
        }
        entry
            .stats
            .refresh_effective_interval(entry.nominal_interval_ms, config.max_interval_ms);
    }
}
