//! Bounded history buffers for charts.

use std::collections::VecDeque;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    while dq.len() >= cap.max(1) {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Fixed-capacity FIFO of recent points, oldest evicted first.
///
/// Owned by exactly one view; no interior synchronization.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> RollingBuffer<T> {
    /// A zero capacity is treated as one.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, point: T) {
        push_capped(&mut self.items, point, self.cap);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Current contents, oldest first. The iterator is `Clone`, so it can be replayed
    /// as long as nothing is pushed in between.
    pub fn to_series(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<'a, T> IntoIterator for &'a RollingBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.to_series()
    }
}

// Keeps a history buffer per core with a fixed capacity
#[derive(Debug, Clone)]
pub struct PerCoreHistory {
    pub cores: Vec<RollingBuffer<f64>>,
    cap: usize,
}

impl PerCoreHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            cores: Vec::new(),
            cap,
        }
    }

    // Ensure we have one buffer per core; reset on CPU topology changes
    pub fn ensure_cores(&mut self, n: usize) {
        if self.cores.len() == n {
            return;
        }
        self.cores = (0..n).map(|_| RollingBuffer::new(self.cap)).collect();
    }

    // Push a new sample set for all cores (values 0..=100)
    pub fn push_samples(&mut self, samples: &[f64]) {
        self.ensure_cores(samples.len());
        for (buf, v) in self.cores.iter_mut().zip(samples) {
            buf.push(v.clamp(0.0, 100.0));
        }
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }
}
