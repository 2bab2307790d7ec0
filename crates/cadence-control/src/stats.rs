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

//! Per-system runtime statistics.

/// Why a system did not run in a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Its effective interval had not elapsed yet.
    NotDue,
    /// The frame budget was exhausted.
    BudgetExhausted,
}

/// Bookkeeping for one registered system.
///
/// The `window_*` fields cover the current adaptive window and are reset by
/// every adaptive pass. The remaining counters accumulate for the lifetime of
/// the registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeStats {
    /// Tick timestamp of the last execution, if any.
    pub last_executed_at_ms: Option<f64>,
    /// Tick timestamp at which the current adaptive window started.
    pub window_started_at_ms: Option<f64>,
    /// Execution time accumulated in the current window.
    pub window_exec_time_ms: f64,
    /// Executions in the current window.
    pub window_exec_count: u32,
    /// Interval chosen by the adaptive controller, before the mode scale.
    pub adaptive_interval_ms: f64,
    /// Interval multiplier imposed by the current mode.
    pub mode_scale: f64,
    /// Minimum spacing between executions actually enforced.
    pub effective_interval_ms: f64,
    /// Consecutive executions that cost more than the fair per-system allowance.
    pub consecutive_over_budget: u32,

    pub(crate) exec_count: u64,
    pub(crate) total_exec_ms: f64,
    pub(crate) max_exec_ms: f64,
    pub(crate) not_due_count: u64,
    pub(crate) budget_skipped_count: u64,
    pub(crate) fault_count: u64,
    pub(crate) mode_fault_count: u64,
}

impl RuntimeStats {
    /// Fresh statistics for a system whose nominal interval is `nominal_interval_ms`.
    pub fn new(nominal_interval_ms: f64, mode_scale: f64, max_interval_ms: f64) -> Self {
        let mut stats = Self {
            last_executed_at_ms: None,
            window_started_at_ms: None,
            window_exec_time_ms: 0.0,
            window_exec_count: 0,
            adaptive_interval_ms: nominal_interval_ms,
            mode_scale,
            effective_interval_ms: nominal_interval_ms,
            consecutive_over_budget: 0,
            exec_count: 0,
            total_exec_ms: 0.0,
            max_exec_ms: 0.0,
            not_due_count: 0,
            budget_skipped_count: 0,
            fault_count: 0,
            mode_fault_count: 0,
        };
        stats.refresh_effective_interval(nominal_interval_ms, max_interval_ms);
        stats
    }

    /// Records one execution that cost `cost_ms`, started at tick `now_ms`.
    pub fn record_execution(&mut self, now_ms: f64, cost_ms: f64, allowance_ms: f64) {
        self.last_executed_at_ms = Some(now_ms);
        self.window_exec_time_ms += cost_ms;
        self.window_exec_count += 1;
        self.exec_count += 1;
        self.total_exec_ms += cost_ms;
        self.max_exec_ms = self.max_exec_ms.max(cost_ms);

        if cost_ms > allowance_ms {
            self.consecutive_over_budget += 1;
        } else {
            self.consecutive_over_budget = 0;
        }
    }

    /// Records a tick in which the system was passed over.
    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NotDue => self.not_due_count += 1,
            SkipReason::BudgetExhausted => self.budget_skipped_count += 1,
        }
    }

    pub(crate) fn record_fault(&mut self) {
        self.fault_count += 1;
    }

    pub(crate) fn record_mode_fault(&mut self) {
        self.mode_fault_count += 1;
    }

    /// Starts a new adaptive window at `now_ms`.
    pub fn reset_window(&mut self, now_ms: f64) {
        self.window_started_at_ms = Some(now_ms);
        self.window_exec_time_ms = 0.0;
        self.window_exec_count = 0;
    }

    /// Drops the current window; the next tick opens a fresh one.
    pub fn clear_window(&mut self) {
        self.window_started_at_ms = None;
        self.window_exec_time_ms = 0.0;
        self.window_exec_count = 0;
    }

    /// Recomputes the enforced interval from the adaptive interval and the mode scale.
    ///
    /// The result never falls below the nominal interval and never exceeds
    /// `max(nominal, max_interval_ms)`.
    pub fn refresh_effective_interval(&mut self, nominal_interval_ms: f64, max_interval_ms: f64) {
        let ceiling = nominal_interval_ms.max(max_interval_ms);
        self.effective_interval_ms =
            (self.adaptive_interval_ms * self.mode_scale).clamp(nominal_interval_ms, ceiling);
    }

    /// Total executions since registration.
    pub fn exec_count(&self) -> u64 {
        self.exec_count
    }

    /// Average cost per execution since registration.
    pub fn average_exec_ms(&self) -> f64 {
        if self.exec_count == 0 {
            0.0
        } else {
            self.total_exec_ms / self.exec_count as f64
        }
    }

    /// Most expensive execution since registration.
    pub fn max_exec_ms(&self) -> f64 {
        self.max_exec_ms
    }

    /// All ticks in which the system was passed over.
    pub fn skipped_count(&self) -> u64 {
        self.not_due_count + self.budget_skipped_count
    }

    /// Ticks skipped because the interval had not elapsed.
    pub fn not_due_count(&self) -> u64 {
        self.not_due_count
    }

    /// Ticks skipped because the budget was exhausted.
    pub fn budget_skipped_count(&self) -> u64 {
        self.budget_skipped_count
    }

    /// Failed update calls.
    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    /// Failed mode-change notifications.
    pub fn mode_fault_count(&self) -> u64 {
        self.mode_fault_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOMINAL: f64 = 1000.0 / 60.0;

    #[test]
    fn test_execution_updates_window_and_lifetime() {
        let mut stats = RuntimeStats::new(NOMINAL, 1.0, 1000.0);
        stats.record_execution(0.0, 2.0, 5.0);
        stats.record_execution(16.0, 4.0, 5.0);

        assert_eq!(stats.exec_count(), 2);
        assert_eq!(stats.window_exec_count, 2);
        assert!((stats.average_exec_ms() - 3.0).abs() < 1e-9);
        assert_eq!(stats.max_exec_ms(), 4.0);
        assert_eq!(stats.last_executed_at_ms, Some(16.0));
        assert_eq!(stats.window_exec_time_ms, 6.0);
    }

    #[test]
    fn test_over_budget_streak_resets_on_cheap_run() {
        let mut stats = RuntimeStats::new(NOMINAL, 1.0, 1000.0);
        stats.record_execution(0.0, 9.0, 5.0);
        stats.record_execution(16.0, 9.0, 5.0);
        assert_eq!(stats.consecutive_over_budget, 2);
        stats.record_execution(32.0, 1.0, 5.0);
        assert_eq!(stats.consecutive_over_budget, 0);
    }

    #[test]
    fn test_skip_reasons_are_split() {
        let mut stats = RuntimeStats::new(NOMINAL, 1.0, 1000.0);
        stats.record_skip(SkipReason::NotDue);
        stats.record_skip(SkipReason::BudgetExhausted);
        stats.record_skip(SkipReason::BudgetExhausted);
        assert_eq!(stats.skipped_count(), 3);
        assert_eq!(stats.not_due_count(), 1);
        assert_eq!(stats.budget_skipped_count(), 2);
    }

    #[test]
    fn test_reset_window_keeps_lifetime_counters() {
        let mut stats = RuntimeStats::new(NOMINAL, 1.0, 1000.0);
        stats.record_execution(0.0, 2.0, 5.0);
        stats.reset_window(2000.0);
        assert_eq!(stats.window_exec_count, 0);
        assert_eq!(stats.window_exec_time_ms, 0.0);
        assert_eq!(stats.window_started_at_ms, Some(2000.0));
        assert_eq!(stats.exec_count(), 1);
    }

    #[test]
    fn test_clear_window_leaves_window_unopened() {
        let mut stats = RuntimeStats::new(NOMINAL, 1.0, 1000.0);
        stats.reset_window(0.0);
        stats.record_execution(16.0, 60.0, 5.0);
        stats.clear_window();
        assert_eq!(stats.window_started_at_ms, None);
        assert_eq!(stats.window_exec_time_ms, 0.0);
        assert_eq!(stats.window_exec_count, 0);
        assert_eq!(stats.max_exec_ms(), 60.0);
    }

    #[test]
    fn test_effective_interval_is_clamped() {
        let mut stats = RuntimeStats::new(100.0, 1.5, 1000.0);
        assert_eq!(stats.effective_interval_ms, 150.0);

        stats.adaptive_interval_ms = 900.0;
        stats.refresh_effective_interval(100.0, 1000.0);
        assert_eq!(stats.effective_interval_ms, 1000.0);

        stats.adaptive_interval_ms = 10.0;
        stats.mode_scale = 1.0;
        stats.refresh_effective_interval(100.0, 1000.0);
        assert_eq!(stats.effective_interval_ms, 100.0);
    }

    #[test]
    fn test_slow_nominal_rate_above_ceiling_is_kept() {
        // A 0.5 Hz system is nominally slower than the 1s ceiling.
        let stats = RuntimeStats::new(2000.0, 1.5, 1000.0);
        assert_eq!(stats.effective_interval_ms, 2000.0);
    }
}
