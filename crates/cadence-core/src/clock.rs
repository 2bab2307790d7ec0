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

//! The host's periodic timing primitive and the time source used to measure cost.
//!
//! The frame clock is injected rather than global: production wires a real
//! refresh-driven clock, tests drive a [`ManualFrameClock`] on demand.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Callback invoked once per display refresh with a monotonically increasing timestamp (ms).
pub type FrameCallback = Box<dyn FnMut(f64)>;

/// Closure returned by [`FrameClock::subscribe`]; calling it removes the subscription.
pub type Unsubscribe = Box<dyn FnOnce()>;

/// A source of one timestamp per display refresh.
pub trait FrameClock {
    /// Registers `callback` to be invoked on every refresh.
    fn subscribe(&self, callback: FrameCallback) -> Unsubscribe;
}

/// A monotonic millisecond clock used to measure execution cost.
pub trait TimeSource {
    /// Returns the current time in milliseconds.
    fn now_ms(&self) -> f64;
}

/// Wall-clock time measured from the moment of construction.
#[derive(Debug, Clone)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    /// Creates a new time source starting at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    #[inline]
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A time source that only moves when told to.
///
/// Clones share the same underlying time, so a test system can advance the
/// clock by its simulated cost while the conductor measures it.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Rc<Cell<f64>>,
}

impl ManualTime {
    /// Creates a manual time source at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time.
    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    /// Moves the current time forward by `ms`.
    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

type SharedCallback = Rc<RefCell<FrameCallback>>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, SharedCallback)>,
}

impl Subscribers {
    fn add(list: &Rc<RefCell<Subscribers>>, callback: FrameCallback) -> Unsubscribe {
        let id = {
            let mut subscribers = list.borrow_mut();
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            subscribers
                .entries
                .push((id, Rc::new(RefCell::new(callback))));
            id
        };
        let weak: Weak<RefCell<Subscribers>> = Rc::downgrade(list);
        Box::new(move || {
            if let Some(list) = weak.upgrade() {
                list.borrow_mut().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Invokes every subscriber. Subscribers may subscribe or unsubscribe
    /// from inside their callback; removals take effect immediately.
    fn dispatch(list: &Rc<RefCell<Subscribers>>, timestamp_ms: f64) {
        let snapshot: Vec<(u64, SharedCallback)> = list.borrow().entries.clone();
        for (id, callback) in snapshot {
            let subscribed = list.borrow().entries.iter().any(|(entry, _)| *entry == id);
            if !subscribed {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut callback) => (*callback)(timestamp_ms),
                Err(_) => log::warn!("FrameClock: re-entrant dispatch to subscriber {id} ignored"),
            }
        }
    }

    fn len(list: &Rc<RefCell<Subscribers>>) -> usize {
        list.borrow().entries.len()
    }
}

/// A frame clock ticked explicitly by the caller.
#[derive(Clone, Default)]
pub struct ManualFrameClock {
    subscribers: Rc<RefCell<Subscribers>>,
}

impl ManualFrameClock {
    /// Creates a clock with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers one refresh at `timestamp_ms` to every subscriber.
    pub fn tick(&self, timestamp_ms: f64) {
        Subscribers::dispatch(&self.subscribers, timestamp_ms);
    }

    /// Delivers `frames` refreshes spaced `interval_ms` apart, starting at `start_ms`.
    ///
    /// Returns the timestamp the next refresh would carry.
    pub fn tick_many(&self, start_ms: f64, interval_ms: f64, frames: u32) -> f64 {
        let mut timestamp = start_ms;
        for _ in 0..frames {
            self.tick(timestamp);
            timestamp += interval_ms;
        }
        timestamp
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        Subscribers::len(&self.subscribers)
    }
}

impl FrameClock for ManualFrameClock {
    fn subscribe(&self, callback: FrameCallback) -> Unsubscribe {
        Subscribers::add(&self.subscribers, callback)
    }
}

/// A frame clock that paces refreshes on the calling thread with `thread::sleep`.
///
/// Stands in for a display-driven refresh callback on hosts that have none.
pub struct PacedFrameClock {
    refresh_interval: Duration,
    time: MonotonicTime,
    subscribers: Rc<RefCell<Subscribers>>,
}

impl PacedFrameClock {
    /// Creates a clock refreshing at `refresh_hz` (clamped to at least 1 Hz).
    pub fn new(refresh_hz: f64) -> Self {
        let safe_hz = if refresh_hz.is_finite() {
            refresh_hz.max(1.0)
        } else {
            60.0
        };
        Self {
            refresh_interval: Duration::from_secs_f64(1.0 / safe_hz),
            time: MonotonicTime::new(),
            subscribers: Rc::default(),
        }
    }

    /// Returns the nominal spacing between refreshes in milliseconds.
    pub fn refresh_interval_ms(&self) -> f64 {
        self.refresh_interval.as_secs_f64() * 1000.0
    }

    /// Runs up to `frames` refreshes, returning how many were delivered.
    ///
    /// Stops early once nobody is subscribed anymore.
    pub fn run_frames(&self, frames: u64) -> u64 {
        let mut delivered = 0;
        while delivered < frames {
            if Subscribers::len(&self.subscribers) == 0 {
                log::info!("PacedFrameClock: no subscribers left after {delivered} frames.");
                break;
            }
            let start = Instant::now();
            Subscribers::dispatch(&self.subscribers, self.time.now_ms());
            delivered += 1;

            let elapsed = start.elapsed();
            if elapsed < self.refresh_interval {
                thread::sleep(self.refresh_interval - elapsed);
            } else {
                log::debug!(
                    "PacedFrameClock: frame {} took {:.2}ms, over the {:.2}ms refresh interval.",
                    delivered,
                    elapsed.as_secs_f64() * 1000.0,
                    self.refresh_interval_ms()
                );
            }
        }
        delivered
    }
}

impl FrameClock for PacedFrameClock {
    fn subscribe(&self, callback: FrameCallback) -> Unsubscribe {
        Subscribers::add(&self.subscribers, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time_shared_between_clones() {
        let time = ManualTime::new();
        let clone = time.clone();
        clone.advance(4.5);
        assert_eq!(time.now_ms(), 4.5);
        time.set(10.0);
        assert_eq!(clone.now_ms(), 10.0);
    }

    #[test]
    fn test_manual_clock_delivers_until_unsubscribed() {
        let clock = ManualFrameClock::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let unsubscribe = clock.subscribe(Box::new(move |ts| sink.borrow_mut().push(ts)));
        assert_eq!(clock.subscriber_count(), 1);

        let next = clock.tick_many(0.0, 16.0, 3);
        assert_eq!(next, 48.0);
        unsubscribe();
        clock.tick(48.0);

        assert_eq!(*seen.borrow(), vec![0.0, 16.0, 32.0]);
        assert_eq!(clock.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let clock = ManualFrameClock::new();
        let count = Rc::new(Cell::new(0));
        let handle: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));

        let (c, h) = (count.clone(), handle.clone());
        let unsubscribe = clock.subscribe(Box::new(move |_| {
            c.set(c.get() + 1);
            if let Some(unsubscribe) = h.borrow_mut().take() {
                unsubscribe();
            }
        }));
        *handle.borrow_mut() = Some(unsubscribe);

        clock.tick(0.0);
        clock.tick(16.0);
        assert_eq!(count.get(), 1);
        assert_eq!(clock.subscriber_count(), 0);
    }

    #[test]
    fn test_paced_clock_stops_without_subscribers() {
        let clock = PacedFrameClock::new(1000.0);
        assert_eq!(clock.run_frames(5), 0);

        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let _unsubscribe = clock.subscribe(Box::new(move |_| c.set(c.get() + 1)));
        assert_eq!(clock.run_frames(3), 3);
        assert_eq!(count.get(), 3);
    }
}
