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

//! The health metrics contract consumed by the mode controller.
//!
//! The conductor never computes health itself; it queries a
//! [`TelemetrySource`] once per tick. `cadence-telemetry` provides concrete
//! sources.

use serde::{Deserialize, Serialize};

/// A point-in-time reading of the rolling health metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthSample {
    /// Fraction of recent frames that missed their refresh (0.0 to 1.0).
    pub dropped_frame_ratio: f64,
    /// Average recent frame time in milliseconds.
    pub average_frame_time_ms: f64,
}

/// A queryable source of rolling frame-health metrics.
pub trait TelemetrySource {
    /// Rolling ratio of dropped frames (0.0 to 1.0).
    fn dropped_frame_ratio(&self) -> f64;

    /// Rolling average frame time in milliseconds.
    fn average_frame_time_ms(&self) -> f64;

    /// Receives the duration of the frame that just ended.
    ///
    /// Sources fed from elsewhere ignore this.
    fn record_frame(&self, _frame_time_ms: f64) {}

    /// Reads both metrics at once.
    fn sample(&self) -> HealthSample {
        HealthSample {
            dropped_frame_ratio: self.dropped_frame_ratio(),
            average_frame_time_ms: self.average_frame_time_ms(),
        }
    }
}
