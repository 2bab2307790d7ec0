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

//! Fixed-size storage for rolling frame samples.

/// A fixed-size circular buffer of `f64` samples.
///
/// Pushing into a full buffer overwrites the oldest sample.
#[derive(Debug, Clone)]
pub struct RingBuffer<const N: usize> {
    data: [f64; N],
    index: usize,
    count: usize,
}

impl<const N: usize> RingBuffer<N> {
    /// Creates a new, empty ring buffer.
    pub fn new() -> Self {
        Self {
            data: [0.0; N],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a new value, overwriting the oldest if full.
    pub fn push(&mut self, value: f64) {
        if N == 0 {
            return;
        }
        self.data[self.index] = value;
        self.index = (self.index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Returns the number of samples currently held.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns an iterator over the samples, oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        let start = if self.count < N { 0 } else { self.index };
        (0..self.count).map(move |offset| &self.data[(start + offset) % N])
    }

    /// Arithmetic mean of the samples, or 0.0 if empty.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.iter().sum::<f64>() / self.count as f64
    }

    /// Fraction of samples for which `predicate` holds, or 0.0 if empty.
    pub fn ratio_where(&self, predicate: impl Fn(f64) -> bool) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let hits = self.iter().filter(|v| predicate(**v)).count();
        hits as f64 / self.count as f64
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_push_and_iter() {
        let mut rb = RingBuffer::<3>::new();
        rb.push(1.0);
        rb.push(2.0);
        rb.push(3.0);
        rb.push(4.0); // Overwrites 1.0

        let values: Vec<f64> = rb.iter().copied().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(rb.count(), 3);
    }

    #[test]
    fn test_ring_buffer_partial_iter_order() {
        let mut rb = RingBuffer::<4>::new();
        rb.push(5.0);
        rb.push(6.0);
        let values: Vec<f64> = rb.iter().copied().collect();
        assert_eq!(values, vec![5.0, 6.0]);
    }

    #[test]
    fn test_ring_buffer_average_and_ratio() {
        let mut rb = RingBuffer::<4>::new();
        rb.push(10.0);
        rb.push(20.0);
        rb.push(30.0);
        rb.push(40.0);
        assert_eq!(rb.average(), 25.0);
        assert!((rb.ratio_where(|v| v > 25.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ring_buffer_empty() {
        let rb = RingBuffer::<4>::new();
        assert_eq!(rb.average(), 0.0);
        assert_eq!(rb.ratio_where(|_| true), 0.0);
        assert_eq!(rb.count(), 0);
    }
}
