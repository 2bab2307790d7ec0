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

//! Adaptive rate control.
//!
//! On a fixed real-time cadence (2s by default) the `AdaptiveRateController`
//! compares the execution time each system accumulated over the window with
//! its window share: the per-frame allowance (`budget / system count`) summed
//! over every tick of the window. A system configured at a tenth of the
//! refresh rate draws on that share ten times less often, so it may spend up
//! to ten allowances per call.
//!
//! 1. **Expand**: accumulated time at least 3x the share slows the system
//!    down by stretching its interval.
//! 2. **Contract**: more than 40% of the share left unused brings the
//!    interval back toward, never below, its nominal value.
//! 3. **Hold**: anything in between.
//!
//! Window counters reset after every pass, whatever the decision.

use crate::config::ConductorConfig;
use crate::registry::SystemRegistry;
use crate::stats::RuntimeStats;
use cadence_core::Priority;

/// What a pass decided for one system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    /// Stretch the interval to the given value.
    Expand(f64),
    /// Shrink the interval to the given value.
    Contract(f64),
    /// Leave the interval unchanged.
    Hold,
}

/// Outcome of one adaptive pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptivePassReport {
    /// Systems whose interval was stretched.
    pub expanded: Vec<String>,
    /// Systems whose interval was shrunk.
    pub contracted: Vec<String>,
    /// Per-frame allowance of each system.
    pub allowance_ms: f64,
    /// Ticks covered by the window.
    pub window_ticks: u32,
    /// Execution time each system could accumulate over the window.
    pub window_share_ms: f64,
}

/// Periodically stretches or contracts each system's effective interval.
#[derive(Debug, Clone)]
pub struct AdaptiveRateController {
    window_ms: f64,
    expand_ratio: f64,
    headroom_ratio: f64,
    expand_factor: f64,
    contract_factor: f64,
    max_interval_ms: f64,
    last_pass_at_ms: Option<f64>,
    window_ticks: u32,
    passes: u64,
}

impl AdaptiveRateController {
    /// Creates a controller from the conductor configuration.
    pub fn new(config: &ConductorConfig) -> Self {
        Self {
            window_ms: config.adaptive_window_ms,
            expand_ratio: config.adaptive_expand_ratio,
            headroom_ratio: config.adaptive_headroom_ratio,
            expand_factor: config.adaptive_expand_factor,
            contract_factor: config.adaptive_contract_factor,
            max_interval_ms: config.max_interval_ms,
            last_pass_at_ms: None,
            window_ticks: 0,
            passes: 0,
        }
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Forgets the pass schedule; the next tick starts a new window.
    pub fn reset_schedule(&mut self) {
        self.last_pass_at_ms = None;
        self.window_ticks = 0;
    }

    /// Ticks counted in the current window.
    pub fn window_ticks(&self) -> u32 {
        self.window_ticks
    }

    /// Counts the tick at `now_ms` and returns true when a pass is due.
    ///
    /// The first call only anchors the schedule.
    pub fn is_due(&mut self, now_ms: f64) -> bool {
        self.window_ticks += 1;
        match self.last_pass_at_ms {
            None => {
                self.last_pass_at_ms = Some(now_ms);
                false
            }
            Some(last) => now_ms - last >= self.window_ms,
        }
    }

    /// Decides the new interval of a system from its window statistics.
    ///
    /// Systems that did not cover a full window, or did not run in it, hold.
    pub fn evaluate(
        &self,
        stats: &RuntimeStats,
        nominal_interval_ms: f64,
        window_share_ms: f64,
        now_ms: f64,
    ) -> RateDecision {
        let full_window = stats
            .window_started_at_ms
            .is_some_and(|start| now_ms - start >= self.window_ms);
        if !full_window || window_share_ms <= 0.0 || stats.window_exec_count == 0 {
            return RateDecision::Hold;
        }

        let over_budget_factor = stats.window_exec_time_ms / window_share_ms;
        let headroom = 1.0 - over_budget_factor;
        let current = stats.adaptive_interval_ms;

        if over_budget_factor >= self.expand_ratio {
            let ceiling = nominal_interval_ms.max(self.max_interval_ms);
            let expanded = (current * self.expand_factor).min(ceiling);
            if expanded > current {
                return RateDecision::Expand(expanded);
            }
        } else if headroom > self.headroom_ratio && current > nominal_interval_ms {
            return RateDecision::Contract((current * self.contract_factor).max(nominal_interval_ms));
        }
        RateDecision::Hold
    }

    /// Runs one pass over the registry and starts a new window for everyone.
    pub fn run_pass(
        &mut self,
        now_ms: f64,
        registry: &mut SystemRegistry,
        frame_budget_ms: f64,
    ) -> AdaptivePassReport {
        let allowance_ms = frame_budget_ms / registry.len().max(1) as f64;
        let window_share_ms = allowance_ms * f64::from(self.window_ticks);
        let mut report = AdaptivePassReport {
            allowance_ms,
            window_ticks: self.window_ticks,
            window_share_ms,
            ..Default::default()
        };

        for entry in registry.iter_mut() {
            if entry.priority != Priority::Critical {
                let decision = self.evaluate(
                    &entry.stats,
                    entry.nominal_interval_ms,
                    window_share_ms,
                    now_ms,
                );
                match decision {
                    RateDecision::Expand(interval) => {
                        log::info!(
                            "AdaptiveRate: '{}' spent {:.2}ms against a {:.2}ms window share, \
                             stretching interval {:.2}ms -> {:.2}ms.",
                            entry.name,
                            entry.stats.window_exec_time_ms,
                            window_share_ms,
                            entry.stats.adaptive_interval_ms,
                            interval
                        );
                        entry.stats.adaptive_interval_ms = interval;
                        report.expanded.push(entry.name.clone());
                    }
                    RateDecision::Contract(interval) => {
                        log::debug!(
                            "AdaptiveRate: '{}' has headroom, interval {:.2}ms -> {:.2}ms.",
                            entry.name,
                            entry.stats.adaptive_interval_ms,
                            interval
                        );
                        entry.stats.adaptive_interval_ms = interval;
                        report.contracted.push(entry.name.clone());
                    }
                    RateDecision::Hold => {}
                }
                entry
                    .stats
                    .refresh_effective_interval(entry.nominal_interval_ms, self.max_interval_ms);
            }
            entry.stats.reset_window(now_ms);
        }

        self.last_pass_at_ms = Some(now_ms);
        self.window_ticks = 0;
        self.passes += 1;
        report
    }
}
