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

//! # Cadence Control
//!
//! The frame conductor. It coordinates independent per-frame systems under a
//! shared time budget:
//!
//! - **Registry**: systems ordered by priority class, then registration order.
//! - **Budget allocator**: which systems may still run in the current tick.
//! - **Adaptive rate controller**: stretches or contracts each system's
//!   interval from its measured cost, every two seconds.
//! - **Mode controller**: switches between quality and performance with
//!   hysteresis on the health metrics.

#![warn(missing_docs)]

pub mod adaptive;
pub mod budget;
pub mod conductor;
pub mod config;
pub mod error;
pub mod mode;
pub mod registry;
pub mod report;
pub mod stats;

pub use adaptive::{AdaptivePassReport, AdaptiveRateController, RateDecision};
pub use budget::{Admission, FrameCycleState};
pub use conductor::{Conductor, ConductorBuilder, WeakConductor};
pub use config::ConductorConfig;
pub use error::ConductorError;
pub use mode::{ModeController, ModeProfile, ModeState, ModeThresholds};
pub use registry::{SystemEntry, SystemRegistry, DEFAULT_TARGET_RATE_HZ};
pub use report::{ConductorReport, SystemReport, TickSummary};
pub use stats::{RuntimeStats, SkipReason};
