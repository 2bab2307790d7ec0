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

//! # Cadence Core
//!
//! Foundational crate containing the contracts shared by the frame conductor:
//! the capability traits every scheduled system implements, the host's frame
//! clock and time source, the telemetry interface, and the error taxonomy.
//!
//! This crate defines the abstract "what". `cadence-telemetry` provides the
//! health metrics and `cadence-control` provides the scheduler itself.

#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod system;
pub mod telemetry;

pub use clock::{
    FrameCallback, FrameClock, ManualFrameClock, ManualTime, MonotonicTime, PacedFrameClock,
    TimeSource, Unsubscribe,
};
pub use error::{ConfigurationError, SystemFault};
pub use system::{
    FrameSystem, Mode, Priority, SystemHandle, SystemHooks, TickTimestamp, TimestampedSystem,
};
pub use telemetry::{HealthSample, TelemetrySource};
