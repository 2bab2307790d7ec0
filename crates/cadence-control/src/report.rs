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

//! Read-only diagnostic snapshots.

use crate::mode::ModeState;
use crate::registry::SystemEntry;
use cadence_core::{Mode, Priority};
use serde::Serialize;
use std::collections::BTreeMap;

/// Statistics of one registered system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemReport {
    /// Priority class.
    pub priority: Priority,
    /// Whether the system is currently considered for execution.
    pub enabled: bool,
    /// Configured update rate.
    pub target_rate_hz: f64,
    /// Interval implied by the configured rate.
    pub nominal_interval_ms: f64,
    /// Interval enforced after adaptive and mode adjustments.
    pub effective_interval_ms: f64,
    /// Executions since registration, faulting ones included.
    pub exec_count: u64,
    /// Average measured cost per execution.
    pub avg_exec_ms: f64,
    /// Most expensive execution.
    pub max_exec_ms: f64,
    /// Every tick the system was passed over, for any reason.
    pub skipped_count: u64,
    /// Ticks skipped because the frame budget ran out.
    pub budget_skipped_count: u64,
    /// Ticks skipped because the effective interval had not elapsed.
    pub not_due_count: u64,
    /// Failed update calls.
    pub fault_count: u64,
    /// Failed mode-change notifications.
    pub mode_fault_count: u64,
    /// Current run of executions over the per-system allowance.
    pub consecutive_over_budget: u32,
}

impl From<&SystemEntry> for SystemReport {
    fn from(entry: &SystemEntry) -> Self {
        let stats = &entry.stats;
        Self {
            priority: entry.priority,
            enabled: entry.enabled,
            target_rate_hz: entry.target_rate_hz,
            nominal_interval_ms: entry.nominal_interval_ms,
            effective_interval_ms: stats.effective_interval_ms,
            exec_count: stats.exec_count(),
            avg_exec_ms: stats.average_exec_ms(),
            max_exec_ms: stats.max_exec_ms(),
            skipped_count: stats.skipped_count(),
            budget_skipped_count: stats.budget_skipped_count(),
            not_due_count: stats.not_due_count(),
            fault_count: stats.fault_count(),
            mode_fault_count: stats.mode_fault_count(),
            consecutive_over_budget: stats.consecutive_over_budget,
        }
    }
}

/// What happened during the most recent tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickSummary {
    /// Timestamp delivered by the frame clock.
    pub timestamp_ms: f64,
    /// Time since the previous tick, 0 on the first one.
    pub delta_ms: f64,
    /// Budget the tick ran under.
    pub frame_budget_ms: f64,
    /// Sum of the measured costs of every system that ran.
    pub spent_ms: f64,
    /// `max(0, frame_budget_ms - spent_ms)`.
    pub remaining_budget_ms: f64,
    /// Names of the systems invoked, in execution order.
    pub executed: Vec<String>,
    /// Names of the systems skipped because the budget ran out.
    pub budget_skipped: Vec<String>,
}

/// A snapshot of the conductor. Taking one never mutates scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConductorReport {
    /// Per-system statistics keyed by name.
    pub per_system: BTreeMap<String, SystemReport>,
    /// Current operating mode.
    pub mode: Mode,
    /// Budget the next tick will run under.
    pub frame_budget_ms: f64,
    /// Whether the conductor is subscribed to its frame clock.
    pub active: bool,
    /// Ticks run since construction.
    pub tick_count: u64,
    /// Adaptive passes run since construction.
    pub adaptive_passes: u64,
    /// Mode controller state and the last health metrics it saw.
    pub mode_state: ModeState,
    /// Summary of the most recent tick, if any ran.
    pub last_tick: Option<TickSummary>,
}

impl ConductorReport {
    /// Returns the row for `name`.
    pub fn system(&self, name: &str) -> Option<&SystemReport> {
        self.per_system.get(name)
    }

    /// Serialises the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serialises_names_in_snake_case() {
        let mut per_system = BTreeMap::new();
        per_system.insert(
            "stars".to_string(),
            SystemReport {
                priority: Priority::Background,
                enabled: true,
                target_rate_hz: 10.0,
                nominal_interval_ms: 100.0,
                effective_interval_ms: 150.0,
                exec_count: 3,
                avg_exec_ms: 1.0,
                max_exec_ms: 1.5,
                skipped_count: 2,
                budget_skipped_count: 1,
                not_due_count: 1,
                fault_count: 0,
                mode_fault_count: 0,
                consecutive_over_budget: 0,
            },
        );
        let report = ConductorReport {
            per_system,
            mode: Mode::Performance,
            frame_budget_ms: 12.0,
            active: true,
            tick_count: 5,
            adaptive_passes: 0,
            mode_state: ModeState::default(),
            last_tick: None,
        };

        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "performance");
        assert_eq!(value["per_system"]["stars"]["priority"], "background");
        assert_eq!(value["per_system"]["stars"]["exec_count"], 3);
        assert!(value["last_tick"].is_null());
        assert_eq!(report.system("stars").map(|s| s.skipped_count), Some(2));
    }
}
