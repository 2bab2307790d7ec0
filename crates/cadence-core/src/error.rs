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

//! Defines the error types surfaced by registration and recorded for faulting systems.

use crate::system::Mode;

/// An invalid registration, returned synchronously to the caller of `register`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// The handle exposes neither the canonical nor the legacy update entry point.
    #[error("system '{name}' does not provide an update entry point")]
    MissingUpdate {
        /// Name the system was registered under.
        name: String,
    },
    /// Systems are keyed by name, so an empty one is rejected.
    #[error("system name must not be empty")]
    EmptyName,
    /// The target rate must be a finite, strictly positive frequency.
    #[error("system '{name}' has an invalid target rate of {rate_hz} Hz")]
    InvalidTargetRate {
        /// Name the system was registered under.
        name: String,
        /// The rejected rate.
        rate_hz: f64,
    },
}

/// A failure raised by a registered system during a tick.
///
/// Faults are isolated per system: they are logged and counted, and never
/// propagate to the frame clock or to sibling systems.
#[derive(Debug, thiserror::Error)]
pub enum SystemFault {
    /// The system's update call returned an error.
    #[error("system '{name}' failed during update: {cause}")]
    Execution {
        /// Name of the faulting system.
        name: String,
        /// The error the system reported.
        cause: anyhow::Error,
    },
    /// The system's mode-change hook returned an error.
    #[error("system '{name}' failed to handle the switch to {mode} mode: {cause}")]
    ModeNotification {
        /// Name of the faulting system.
        name: String,
        /// Mode that was being delivered.
        mode: Mode,
        /// The error the hook reported.
        cause: anyhow::Error,
    },
}

impl SystemFault {
    /// Returns the name of the system that produced this fault.
    pub fn system_name(&self) -> &str {
        match self {
            SystemFault::Execution { name, .. } | SystemFault::ModeNotification { name, .. } => {
                name
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::MissingUpdate {
            name: "parallax".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "system 'parallax' does not provide an update entry point"
        );

        let err = ConfigurationError::InvalidTargetRate {
            name: "stars".to_string(),
            rate_hz: 0.0,
        };
        assert!(err.to_string().contains("0 Hz"));
    }

    #[test]
    fn test_system_fault_carries_name_and_cause() {
        let fault = SystemFault::ModeNotification {
            name: "bloom".to_string(),
            mode: Mode::Performance,
            cause: anyhow::anyhow!("shader missing"),
        };
        assert_eq!(fault.system_name(), "bloom");
        let message = fault.to_string();
        assert!(message.contains("performance"));
        assert!(message.contains("shader missing"));
    }
}
