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

//! System registry with deterministic execution ordering.

use crate::stats::RuntimeStats;
use cadence_core::{FrameSystem, Priority};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Default target rate for a registration that does not specify one.
pub const DEFAULT_TARGET_RATE_HZ: f64 = 60.0;

/// A registered system together with its scheduling parameters.
pub struct SystemEntry {
    /// Unique key.
    pub name: String,
    /// Ordering class.
    pub priority: Priority,
    /// Configured target rate in Hz.
    pub target_rate_hz: f64,
    /// Interval derived from the target rate, in milliseconds.
    pub nominal_interval_ms: f64,
    /// Disabled systems stay registered but are never invoked.
    pub enabled: bool,
    /// The system in its canonical form.
    pub system: Rc<RefCell<dyn FrameSystem>>,
    /// Runtime statistics.
    pub stats: RuntimeStats,
    seq: u64,
}

impl SystemEntry {
    /// Creates an entry with fresh statistics.
    ///
    /// `mode_scale` is the interval multiplier of the mode active at registration.
    pub fn new(
        name: impl Into<String>,
        priority: Priority,
        target_rate_hz: f64,
        system: Rc<RefCell<dyn FrameSystem>>,
        mode_scale: f64,
        max_interval_ms: f64,
    ) -> Self {
        let nominal_interval_ms = 1000.0 / target_rate_hz;
        Self {
            name: name.into(),
            priority,
            target_rate_hz,
            nominal_interval_ms,
            enabled: true,
            system,
            stats: RuntimeStats::new(nominal_interval_ms, mode_scale, max_interval_ms),
            seq: 0,
        }
    }
}

impl fmt::Debug for SystemEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("target_rate_hz", &self.target_rate_hz)
            .field("enabled", &self.enabled)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Holds at most one entry per name, kept sorted by priority rank then
/// registration order.
#[derive(Debug, Default)]
pub struct SystemRegistry {
    entries: Vec<SystemEntry>,
    next_seq: u64,
}

impl SystemRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry`, replacing any entry with the same name.
    ///
    /// A replacement moves to the back of its priority class. Returns the
    /// entry it replaced, if any.
    pub fn insert(&mut self, mut entry: SystemEntry) -> Option<SystemEntry> {
        let replaced = self.remove(&entry.name);

        entry.seq = self.next_seq;
        self.next_seq += 1;

        let key = (entry.priority.rank(), entry.seq);
        let index = self
            .entries
            .partition_point(|existing| (existing.priority.rank(), existing.seq) < key);

        log::info!(
            "SystemRegistry: {} '{}' (priority={}, rate={}Hz)",
            if replaced.is_some() { "Replaced" } else { "Registered" },
            entry.name,
            entry.priority,
            entry.target_rate_hz
        );
        self.entries.insert(index, entry);
        replaced
    }

    /// Removes the entry registered under `name`.
    pub fn remove(&mut self, name: &str) -> Option<SystemEntry> {
        let index = self.position(name)?;
        Some(self.entries.remove(index))
    }

    /// Returns the execution index of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    /// Returns the entry registered under `name`.
    pub fn get(&self, name: &str) -> Option<&SystemEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Returns the entry registered under `name` mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut SystemEntry> {
        self.entries.iter_mut().find(|entry| entry.name == name)
    }

    /// Returns the entry at execution index `index`.
    pub fn at_mut(&mut self, index: usize) -> Option<&mut SystemEntry> {
        self.entries.get_mut(index)
    }

    /// Returns the number of registered systems.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemEntry> {
        self.entries.iter()
    }

    /// Iterates mutably in execution order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SystemEntry> {
        self.entries.iter_mut()
    }

    /// Opens an adaptive window for every entry that has none yet.
    pub fn open_windows(&mut self, now_ms: f64) {
        for entry in &mut self.entries {
            if entry.stats.window_started_at_ms.is_none() {
                entry.stats.window_started_at_ms = Some(now_ms);
            }
        }
    }

    /// Discards every adaptive window; the next tick reopens them.
    pub fn clear_windows(&mut self) {
        for entry in &mut self.entries {
            entry.stats.clear_window();
        }
    }
}
