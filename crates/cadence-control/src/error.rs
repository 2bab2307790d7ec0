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

//! Errors returned while building a conductor.
//!
//! Registration failures are reported as `ConfigurationError` directly.

/// An error returned by conductor construction or configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// A configuration value is out of range.
    #[error("invalid conductor configuration: `{field}` {reason}")]
    InvalidConfig {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// A configuration document could not be parsed.
    #[error("failed to parse conductor configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
