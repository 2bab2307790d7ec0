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

//! Per-tick budget allocation.
//!
//! A tick starts with the full frame budget. Every invocation's measured cost
//! is charged against it, and the remainder decides which of the following
//! systems may still run. Nothing is ever interrupted: a system either runs
//! to completion or is skipped wholesale.

use crate::stats::SkipReason;
use cadence_core::Priority;

/// The outcome of asking whether a system may run this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Invoke the system.
    Run,
    /// Skip it for the given reason.
    Skip(SkipReason),
}

/// Budget bookkeeping for a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCycleState {
    /// Budget the tick started with.
    pub frame_budget_ms: f64,
    /// What is left of it, never negative.
    pub remaining_budget_ms: f64,
    /// Sum of all measured costs, including those past the budget.
    pub spent_ms: f64,
    /// Timestamp delivered by the frame clock.
    pub tick_start_timestamp_ms: f64,
}

impl FrameCycleState {
    /// Starts a tick with the full budget.
    pub fn begin(frame_budget_ms: f64, tick_start_timestamp_ms: f64) -> Self {
        Self {
            frame_budget_ms,
            remaining_budget_ms: frame_budget_ms,
            spent_ms: 0.0,
            tick_start_timestamp_ms,
        }
    }

    /// Charges a measured execution cost against the budget.
    pub fn charge(&mut self, cost_ms: f64) {
        let cost_ms = cost_ms.max(0.0);
        self.spent_ms += cost_ms;
        self.remaining_budget_ms = (self.remaining_budget_ms - cost_ms).max(0.0);
    }

    /// Returns true once nothing is left for non-critical systems.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_budget_ms <= 0.0
    }

    /// Decides whether a system of class `priority` may run.
    ///
    /// * Critical systems always run.
    /// * Normal systems must be due, then need budget left.
    /// * Background systems are dropped as soon as the budget is gone,
    ///   before their interval is even considered.
    pub fn admit(&self, priority: Priority, due: bool) -> Admission {
        match priority {
            Priority::Critical => Admission::Run,
            Priority::Normal if !due => Admission::Skip(SkipReason::NotDue),
            Priority::Normal if self.is_exhausted() => {
                Admission::Skip(SkipReason::BudgetExhausted)
            }
            Priority::Normal => Admission::Run,
            Priority::Background if self.is_exhausted() => {
                Admission::Skip(SkipReason::BudgetExhausted)
            }
            Priority::Background if !due => Admission::Skip(SkipReason::NotDue),
            Priority::Background => Admission::Run,
        }
    }
}

/// Returns true when a system last run at `last_executed_at_ms` should run
/// in the tick at `now_ms`.
///
/// The gate is quantised to frame boundaries: the system is due once the
/// frame nearest to its due time has arrived. A system that never ran is
/// always due.
pub fn is_due(last_executed_at_ms: Option<f64>, now_ms: f64, delta_ms: f64, interval_ms: f64) -> bool {
    match last_executed_at_ms {
        None => true,
        Some(last) => (now_ms - last) + delta_ms * 0.5 >= interval_ms,
    }
}
