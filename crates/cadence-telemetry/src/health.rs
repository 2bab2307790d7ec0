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

//! Telemetry sources for the rolling frame-health metrics.

use crate::ring::RingBuffer;
use cadence_core::telemetry::{HealthSample, TelemetrySource};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Number of frames in the rolling window (2s at 60Hz).
pub const HEALTH_WINDOW_FRAMES: usize = 120;

/// Configuration for [`FrameHealthMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    /// Nominal spacing between display refreshes in milliseconds.
    pub refresh_interval_ms: f64,
    /// A frame longer than `drop_factor` refresh intervals counts as dropped.
    pub drop_factor: f64,
    /// Below this many samples both metrics read as zero.
    pub min_samples: usize,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000.0 / 60.0,
            drop_factor: 1.5,
            min_samples: 10,
        }
    }
}

/// Derives the health metrics from the frame times the conductor feeds it.
#[derive(Debug, Default)]
pub struct FrameHealthMonitor {
    config: HealthMonitorConfig,
    frames: RefCell<RingBuffer<HEALTH_WINDOW_FRAMES>>,
}

impl FrameHealthMonitor {
    /// Creates a monitor with the given configuration.
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            config,
            frames: RefCell::new(RingBuffer::new()),
        }
    }

    /// Frame time above which a frame is counted as dropped.
    pub fn drop_threshold_ms(&self) -> f64 {
        self.config.refresh_interval_ms * self.config.drop_factor
    }

    /// Number of frames currently in the window.
    pub fn sample_count(&self) -> usize {
        self.frames.borrow().count()
    }

    fn has_enough_samples(&self) -> bool {
        self.sample_count() >= self.config.min_samples
    }
}

impl TelemetrySource for FrameHealthMonitor {
    fn dropped_frame_ratio(&self) -> f64 {
        if !self.has_enough_samples() {
            return 0.0;
        }
        let threshold = self.drop_threshold_ms();
        self.frames.borrow().ratio_where(|frame| frame > threshold)
    }

    fn average_frame_time_ms(&self) -> f64 {
        if !self.has_enough_samples() {
            return 0.0;
        }
        self.frames.borrow().average()
    }

    fn record_frame(&self, frame_time_ms: f64) {
        if !frame_time_ms.is_finite() || frame_time_ms < 0.0 {
            log::trace!("FrameHealthMonitor: ignoring frame time {frame_time_ms}");
            return;
        }
        self.frames.borrow_mut().push(frame_time_ms);
    }
}

/// A telemetry source whose values are produced elsewhere and pushed in.
///
/// Clones share the same reading, so the producer keeps one and hands
/// another to the conductor.
#[derive(Debug, Clone, Default)]
pub struct SharedHealth {
    sample: Rc<Cell<HealthSample>>,
}

impl SharedHealth {
    /// Creates a source reporting perfect health.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new reading.
    pub fn publish(&self, sample: HealthSample) {
        self.sample.set(sample);
    }

    /// Publishes a new reading from its two components.
    pub fn set(&self, dropped_frame_ratio: f64, average_frame_time_ms: f64) {
        self.publish(HealthSample {
            dropped_frame_ratio,
            average_frame_time_ms,
        });
    }
}

impl TelemetrySource for SharedHealth {
    fn dropped_frame_ratio(&self) -> f64 {
        self.sample.get().dropped_frame_ratio
    }

    fn average_frame_time_ms(&self) -> f64 {
        self.sample.get().average_frame_time_ms
    }

    fn sample(&self) -> HealthSample {
        self.sample.get()
    }
}
