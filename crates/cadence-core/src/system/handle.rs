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

//! Registration handles and their normalisation into the canonical form.

use super::{FrameSystem, Mode, TimestampedSystem};
use crate::error::ConfigurationError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Timestamp of the tick currently being processed.
///
/// Owned by the conductor and shared with legacy adapters so that they can
/// supply the first argument of the two-argument update form.
pub type TickTimestamp = Rc<Cell<f64>>;

type UpdateFn = Box<dyn FnMut(f64) -> anyhow::Result<()>>;
type TimestampedUpdateFn = Box<dyn FnMut(f64, f64) -> anyhow::Result<()>>;
type ModeHookFn = Box<dyn FnMut(Mode) -> anyhow::Result<()>>;

/// A system assembled from closures, each capability being optional.
///
/// At least one of the two update forms must be present, otherwise the
/// registration fails with [`ConfigurationError::MissingUpdate`].
#[derive(Default)]
pub struct SystemHooks {
    update: Option<UpdateFn>,
    update_timestamped: Option<TimestampedUpdateFn>,
    on_mode_change: Option<ModeHookFn>,
}

impl SystemHooks {
    /// Creates an empty set of hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the canonical `update(delta_ms)` entry point.
    pub fn update(mut self, update: impl FnMut(f64) -> anyhow::Result<()> + 'static) -> Self {
        self.update = Some(Box::new(update));
        self
    }

    /// Sets the legacy `update(timestamp_ms, delta_ms)` entry point.
    pub fn update_timestamped(
        mut self,
        update: impl FnMut(f64, f64) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.update_timestamped = Some(Box::new(update));
        self
    }

    /// Sets the optional mode-change hook.
    pub fn on_mode_change(mut self, hook: impl FnMut(Mode) -> anyhow::Result<()> + 'static) -> Self {
        self.on_mode_change = Some(Box::new(hook));
        self
    }

    /// Returns `true` if either update form is present.
    pub fn has_update(&self) -> bool {
        self.update.is_some() || self.update_timestamped.is_some()
    }
}

impl fmt::Debug for SystemHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemHooks")
            .field("update", &self.update.is_some())
            .field("update_timestamped", &self.update_timestamped.is_some())
            .field("on_mode_change", &self.on_mode_change.is_some())
            .finish()
    }
}

/// Everything that can be handed to `register`.
pub enum SystemHandle {
    /// A system implementing the canonical trait.
    Frame(Rc<RefCell<dyn FrameSystem>>),
    /// A system implementing the legacy two-argument form.
    Timestamped(Rc<RefCell<dyn TimestampedSystem>>),
    /// A system assembled from closures.
    Hooks(SystemHooks),
}

impl SystemHandle {
    /// Wraps a shared canonical system. The caller may keep its own clone to inspect it.
    pub fn frame<S: FrameSystem + 'static>(system: Rc<RefCell<S>>) -> Self {
        SystemHandle::Frame(system)
    }

    /// Wraps a shared legacy system.
    pub fn timestamped<S: TimestampedSystem + 'static>(system: Rc<RefCell<S>>) -> Self {
        SystemHandle::Timestamped(system)
    }

    /// Takes ownership of a canonical system.
    pub fn from_system<S: FrameSystem + 'static>(system: S) -> Self {
        SystemHandle::Frame(Rc::new(RefCell::new(system)))
    }

    /// Short description of the capability form, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SystemHandle::Frame(_) => "frame",
            SystemHandle::Timestamped(_) => "timestamped",
            SystemHandle::Hooks(_) => "hooks",
        }
    }

    /// Resolves the handle into the canonical single-argument form.
    ///
    /// Legacy forms are wrapped here, once, so the tick loop never branches on
    /// the signature.
    pub fn normalize(
        self,
        name: &str,
        timestamp: &TickTimestamp,
    ) -> Result<Rc<RefCell<dyn FrameSystem>>, ConfigurationError> {
        match self {
            SystemHandle::Frame(system) => Ok(system),
            SystemHandle::Timestamped(inner) => Ok(Rc::new(RefCell::new(TimestampAdapter {
                inner,
                timestamp: Rc::clone(timestamp),
            }))),
            SystemHandle::Hooks(hooks) => {
                let SystemHooks {
                    update,
                    update_timestamped,
                    on_mode_change,
                } = hooks;
                let update: UpdateFn = match (update, update_timestamped) {
                    (Some(update), _) => update,
                    (None, Some(mut legacy)) => {
                        let timestamp = Rc::clone(timestamp);
                        Box::new(move |delta_ms| legacy(timestamp.get(), delta_ms))
                    }
                    (None, None) => {
                        return Err(ConfigurationError::MissingUpdate {
                            name: name.to_string(),
                        })
                    }
                };
                Ok(Rc::new(RefCell::new(HookSystem {
                    update,
                    on_mode_change,
                })))
            }
        }
    }
}

impl From<SystemHooks> for SystemHandle {
    fn from(hooks: SystemHooks) -> Self {
        SystemHandle::Hooks(hooks)
    }
}

impl fmt::Debug for SystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemHandle::Hooks(hooks) => f.debug_tuple("Hooks").field(hooks).finish(),
            other => write!(f, "SystemHandle::{}", other.kind()),
        }
    }
}

/// Presents a legacy system through the canonical interface.
struct TimestampAdapter {
    inner: Rc<RefCell<dyn TimestampedSystem>>,
    timestamp: TickTimestamp,
}

impl FrameSystem for TimestampAdapter {
    fn update(&mut self, delta_ms: f64) -> anyhow::Result<()> {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .map_err(|_| anyhow::anyhow!("legacy system is already borrowed"))?;
        inner.update(self.timestamp.get(), delta_ms)
    }

    fn on_mode_change(&mut self, mode: Mode) -> anyhow::Result<()> {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .map_err(|_| anyhow::anyhow!("legacy system is already borrowed"))?;
        inner.on_mode_change(mode)
    }
}

struct HookSystem {
    update: UpdateFn,
    on_mode_change: Option<ModeHookFn>,
}

impl FrameSystem for HookSystem {
    fn update(&mut self, delta_ms: f64) -> anyhow::Result<()> {
        (self.update)(delta_ms)
    }

    fn on_mode_change(&mut self, mode: Mode) -> anyhow::Result<()> {
        match self.on_mode_change.as_mut() {
            Some(hook) => (*hook)(mode),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct LegacyTrail {
        calls: Vec<(f64, f64)>,
        modes: Vec<Mode>,
    }

    impl TimestampedSystem for LegacyTrail {
        fn update(&mut self, timestamp_ms: f64, delta_ms: f64) -> anyhow::Result<()> {
            self.calls.push((timestamp_ms, delta_ms));
            Ok(())
        }

        fn on_mode_change(&mut self, mode: Mode) -> anyhow::Result<()> {
            self.modes.push(mode);
            Ok(())
        }
    }

    #[test]
    fn test_hooks_without_update_are_rejected() {
        let timestamp = TickTimestamp::default();
        let handle = SystemHandle::from(SystemHooks::new().on_mode_change(|_| Ok(())));
        let err = handle.normalize("glow", &timestamp).err();
        assert_eq!(
            err,
            Some(ConfigurationError::MissingUpdate {
                name: "glow".to_string()
            })
        );
    }

    #[test]
    fn test_legacy_system_receives_tick_timestamp() {
        let timestamp = TickTimestamp::default();
        let trail = Rc::new(RefCell::new(LegacyTrail::default()));
        let system = SystemHandle::timestamped(trail.clone())
            .normalize("trail", &timestamp)
            .unwrap();

        timestamp.set(1000.0);
        system.borrow_mut().update(16.0).unwrap();
        timestamp.set(1016.0);
        system.borrow_mut().update(16.0).unwrap();
        system.borrow_mut().on_mode_change(Mode::Performance).unwrap();

        let trail = trail.borrow();
        assert_eq!(trail.calls, vec![(1000.0, 16.0), (1016.0, 16.0)]);
        assert_eq!(trail.modes, vec![Mode::Performance]);
    }

    #[test]
    fn test_timestamped_hook_is_adapted() {
        let timestamp = TickTimestamp::default();
        let seen = Rc::new(Cell::new((0.0, 0.0)));
        let sink = seen.clone();
        let system = SystemHandle::from(
            SystemHooks::new().update_timestamped(move |ts, dt| {
                sink.set((ts, dt));
                Ok(())
            }),
        )
        .normalize("stars", &timestamp)
        .unwrap();

        timestamp.set(48.0);
        system.borrow_mut().update(16.0).unwrap();
        assert_eq!(seen.get(), (48.0, 16.0));
        // No hook registered: the default is a silent no-op.
        assert!(system.borrow_mut().on_mode_change(Mode::Quality).is_ok());
    }

    #[test]
    fn test_canonical_update_preferred_over_legacy() {
        let timestamp = TickTimestamp::default();
        let canonical = Rc::new(Cell::new(0u32));
        let legacy = Rc::new(Cell::new(0u32));
        let (c, l) = (canonical.clone(), legacy.clone());
        let system = SystemHandle::from(
            SystemHooks::new()
                .update(move |_| {
                    c.set(c.get() + 1);
                    Ok(())
                })
                .update_timestamped(move |_, _| {
                    l.set(l.get() + 1);
                    Ok(())
                }),
        )
        .normalize("dual", &timestamp)
        .unwrap();

        system.borrow_mut().update(16.0).unwrap();
        assert_eq!(canonical.get(), 1);
        assert_eq!(legacy.get(), 0);
    }
}
