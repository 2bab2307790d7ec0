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

//! The capability contract consumed from every scheduled system.
//!
//! A system is a per-frame update routine (a particle field, a parallax layer,
//! a cursor trail...). The conductor only knows it through the traits below:
//! a required update entry point and an optional mode-change hook.

mod handle;

pub use handle::{SystemHandle, SystemHooks, TickTimestamp};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordering class controlling execution order and eligibility under budget pressure.
///
/// The order of variants defines the execution order (first = runs first).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Always executes, independent of the remaining budget.
    Critical,
    /// Executes while budget remains and its interval has elapsed.
    #[default]
    Normal,
    /// Sacrificed first: skipped as soon as the budget is exhausted.
    Background,
}

impl Priority {
    /// Numeric rank used for ordering (lower runs first).
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::Normal => 1,
            Priority::Background => 2,
        }
    }

    /// Returns the lowercase name of the priority class.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::Normal => "normal",
            Priority::Background => "background",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Global operating state of the conductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Full frame budget, systems at their configured rates.
    #[default]
    Quality,
    /// Reduced frame budget, background cadence stretched.
    Performance,
}

impl Mode {
    /// Returns the lowercase name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Quality => "quality",
            Mode::Performance => "performance",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The canonical per-frame system interface.
///
/// `update` runs to completion inside the tick that invoked it; it must not
/// block waiting on other work. Returning an error records an execution fault
/// for this system without affecting any other system.
pub trait FrameSystem {
    /// Advances the system by `delta_ms` milliseconds.
    fn update(&mut self, delta_ms: f64) -> anyhow::Result<()>;

    /// Called on every transition between quality and performance modes.
    fn on_mode_change(&mut self, _mode: Mode) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The legacy two-argument update form.
///
/// Systems written against this form receive the tick timestamp alongside the
/// delta. They are adapted to [`FrameSystem`] once, at registration.
pub trait TimestampedSystem {
    /// Advances the system to `timestamp_ms`, `delta_ms` after the previous tick.
    fn update(&mut self, timestamp_ms: f64, delta_ms: f64) -> anyhow::Result<()>;

    /// Called on every transition between quality and performance modes.
    fn on_mode_change(&mut self, _mode: Mode) -> anyhow::Result<()> {
        Ok(())
    }
}
