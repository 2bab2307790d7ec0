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

//! Construction-time configuration for the conductor.

use crate::error::ConductorError;
use crate::mode::ModeThresholds;
use serde::{Deserialize, Serialize};

/// Configuration for the [`Conductor`](crate::Conductor).
///
/// Every field has a default, so partial JSON documents parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Frame budget in quality mode, in milliseconds.
    pub frame_time_budget_ms: f64,
    /// Emits per-tick `debug!` traces when enabled.
    pub enable_debug_logging: bool,
    /// Frame budget in performance mode, in milliseconds.
    pub performance_budget_ms: f64,
    /// Interval multiplier applied to background systems in performance mode.
    pub background_performance_multiplier: f64,
    /// Real-time spacing between adaptive rate passes, in milliseconds.
    pub adaptive_window_ms: f64,
    /// Cost-to-allowance ratio at or above which a system is slowed down.
    pub adaptive_expand_ratio: f64,
    /// Unused fraction of the allowance above which a system is sped back up.
    pub adaptive_headroom_ratio: f64,
    /// Interval multiplier applied on expansion (> 1).
    pub adaptive_expand_factor: f64,
    /// Interval multiplier applied on contraction (< 1).
    pub adaptive_contract_factor: f64,
    /// Ceiling on any effective interval, in milliseconds.
    pub max_interval_ms: f64,
    /// Mode switching thresholds.
    pub thresholds: ModeThresholds,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            frame_time_budget_ms: 16.0,
            enable_debug_logging: false,
            performance_budget_ms: 12.0,
            background_performance_multiplier: 1.5,
            adaptive_window_ms: 2000.0,
            adaptive_expand_ratio: 3.0,
            adaptive_headroom_ratio: 0.4,
            adaptive_expand_factor: 1.5,
            adaptive_contract_factor: 0.8,
            max_interval_ms: 1000.0,
            thresholds: ModeThresholds::default(),
        }
    }
}

impl ConductorConfig {
    /// Parses a JSON document and validates the result.
    pub fn from_json_str(json: &str) -> Result<Self, ConductorError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values describe a coherent scheduler.
    pub fn validate(&self) -> Result<(), ConductorError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConductorError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConductorError::InvalidConfig {
                    field,
                    reason: format!("must be a positive number, got {value}"),
                })
            }
        }

        positive("frame_time_budget_ms", self.frame_time_budget_ms)?;
        positive("performance_budget_ms", self.performance_budget_ms)?;
        positive("adaptive_window_ms", self.adaptive_window_ms)?;
        positive("adaptive_expand_ratio", self.adaptive_expand_ratio)?;
        positive("max_interval_ms", self.max_interval_ms)?;

        if self.performance_budget_ms > self.frame_time_budget_ms {
            return Err(ConductorError::InvalidConfig {
                field: "performance_budget_ms",
                reason: format!(
                    "{} exceeds the quality budget of {}",
                    self.performance_budget_ms, self.frame_time_budget_ms
                ),
            });
        }
        if !(self.background_performance_multiplier >= 1.0) {
            return Err(ConductorError::InvalidConfig {
                field: "background_performance_multiplier",
                reason: "must be at least 1.0".to_string(),
            });
        }
        if !(self.adaptive_expand_factor > 1.0) {
            return Err(ConductorError::InvalidConfig {
                field: "adaptive_expand_factor",
                reason: "must be greater than 1.0".to_string(),
            });
        }
        if !(self.adaptive_contract_factor > 0.0 && self.adaptive_contract_factor < 1.0) {
            return Err(ConductorError::InvalidConfig {
                field: "adaptive_contract_factor",
                reason: "must lie strictly between 0.0 and 1.0".to_string(),
            });
        }
        if !(self.adaptive_headroom_ratio > 0.0 && self.adaptive_headroom_ratio < 1.0) {
            return Err(ConductorError::InvalidConfig {
                field: "adaptive_headroom_ratio",
                reason: "must lie strictly between 0.0 and 1.0".to_string(),
            });
        }
        self.thresholds.validate()
    }
}
