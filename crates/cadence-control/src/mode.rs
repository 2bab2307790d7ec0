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

//! Quality / performance mode switching.
//!
//! The `ModeController` is a two-state machine driven by the rolling health
//! metrics. Entering and leaving performance mode use different thresholds so
//! that a reading hovering around a single boundary cannot make it oscillate:
//!
//! | Transition | Condition |
//! |---|---|
//! | quality → performance | dropped ratio > 10% **or** avg frame time > 20ms |
//! | performance → quality | dropped ratio < 2% **and** avg frame time < 10ms |

use crate::config::ConductorConfig;
use crate::error::ConductorError;
use cadence_core::telemetry::HealthSample;
use cadence_core::Mode;
use serde::{Deserialize, Serialize};

/// Dropped-frame ratio above which quality mode is abandoned.
const ENTER_PERFORMANCE_DROP_RATIO: f64 = 0.10;
/// Average frame time (ms) above which quality mode is abandoned.
const ENTER_PERFORMANCE_FRAME_TIME_MS: f64 = 20.0;
/// Dropped-frame ratio below which quality mode may resume.
const EXIT_PERFORMANCE_DROP_RATIO: f64 = 0.02;
/// Average frame time (ms) below which quality mode may resume.
const EXIT_PERFORMANCE_FRAME_TIME_MS: f64 = 10.0;

/// Asymmetric thresholds driving the mode controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeThresholds {
    /// Enter performance when the dropped-frame ratio exceeds this.
    pub enter_performance_drop_ratio: f64,
    /// Enter performance when the average frame time exceeds this.
    pub enter_performance_frame_time_ms: f64,
    /// Return to quality only when the dropped-frame ratio is below this...
    pub exit_performance_drop_ratio: f64,
    /// ...and the average frame time is below this.
    pub exit_performance_frame_time_ms: f64,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            enter_performance_drop_ratio: ENTER_PERFORMANCE_DROP_RATIO,
            enter_performance_frame_time_ms: ENTER_PERFORMANCE_FRAME_TIME_MS,
            exit_performance_drop_ratio: EXIT_PERFORMANCE_DROP_RATIO,
            exit_performance_frame_time_ms: EXIT_PERFORMANCE_FRAME_TIME_MS,
        }
    }
}

impl ModeThresholds {
    /// Exit bounds must sit strictly below the enter bounds.
    pub fn validate(&self) -> Result<(), ConductorError> {
        let all = [
            self.enter_performance_drop_ratio,
            self.enter_performance_frame_time_ms,
            self.exit_performance_drop_ratio,
            self.exit_performance_frame_time_ms,
        ];
        if all.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConductorError::InvalidConfig {
                field: "thresholds",
                reason: "must be finite and non-negative".to_string(),
            });
        }
        if self.exit_performance_drop_ratio >= self.enter_performance_drop_ratio
            || self.exit_performance_frame_time_ms >= self.enter_performance_frame_time_ms
        {
            return Err(ConductorError::InvalidConfig {
                field: "thresholds",
                reason: "exit bounds must be strictly below enter bounds".to_string(),
            });
        }
        Ok(())
    }

    fn should_enter_performance(&self, sample: &HealthSample) -> bool {
        sample.dropped_frame_ratio > self.enter_performance_drop_ratio
            || sample.average_frame_time_ms > self.enter_performance_frame_time_ms
    }

    fn should_exit_performance(&self, sample: &HealthSample) -> bool {
        sample.dropped_frame_ratio < self.exit_performance_drop_ratio
            && sample.average_frame_time_ms < self.exit_performance_frame_time_ms
    }
}

/// Budget and cadence settings applied while a mode is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeProfile {
    /// Frame budget in milliseconds.
    pub frame_budget_ms: f64,
    /// Interval multiplier for background systems.
    pub background_scale: f64,
}

impl ModeProfile {
    /// Derives the profile for `mode` from the configuration.
    ///
    /// Always computed from the configured values, so repeated flips never compound.
    pub fn for_mode(mode: Mode, config: &ConductorConfig) -> Self {
        match mode {
            Mode::Quality => Self {
                frame_budget_ms: config.frame_time_budget_ms,
                background_scale: 1.0,
            },
            Mode::Performance => Self {
                frame_budget_ms: config.performance_budget_ms,
                background_scale: config.background_performance_multiplier,
            },
        }
    }
}

/// The current mode and the metrics it was last evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ModeState {
    /// Active mode.
    pub current: Mode,
    /// Last observed rolling dropped-frame ratio.
    pub rolling_dropped_frame_ratio: f64,
    /// Last observed rolling average frame time in milliseconds.
    pub rolling_average_frame_time_ms: f64,
    /// Number of transitions since construction.
    pub transitions: u64,
}

/// Two-state machine switching between quality and performance.
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    thresholds: ModeThresholds,
    state: ModeState,
}

impl ModeController {
    /// Creates a controller starting in quality mode.
    pub fn new(thresholds: ModeThresholds) -> Self {
        Self {
            thresholds,
            state: ModeState::default(),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> &ModeState {
        &self.state
    }

    /// Returns the active mode.
    pub fn current(&self) -> Mode {
        self.state.current
    }

    /// Records a health sample and returns the new mode if it caused a transition.
    pub fn observe(&mut self, sample: HealthSample) -> Option<Mode> {
        self.state.rolling_dropped_frame_ratio = sample.dropped_frame_ratio;
        self.state.rolling_average_frame_time_ms = sample.average_frame_time_ms;

        let next = match self.state.current {
            Mode::Quality if self.thresholds.should_enter_performance(&sample) => {
                log::info!(
                    "ModeController: entering performance mode (dropped={:.1}%, avg={:.2}ms).",
                    sample.dropped_frame_ratio * 100.0,
                    sample.average_frame_time_ms
                );
                Mode::Performance
            }
            Mode::Performance if self.thresholds.should_exit_performance(&sample) => {
                log::info!(
                    "ModeController: health recovered, returning to quality mode \
                     (dropped={:.1}%, avg={:.2}ms).",
                    sample.dropped_frame_ratio * 100.0,
                    sample.average_frame_time_ms
                );
                Mode::Quality
            }
            _ => return None,
        };

        self.state.current = next;
        self.state.transitions += 1;
        Some(next)
    }
}
