use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::constants::GRAPH_SCALE_FLOOR_MBPS;
use crate::models::SampleTick;

/// Fixed-capacity FIFO of recent samples, oldest first.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<SampleTick>,
    capacity: usize,
}

/// The window as shared between the sampler (sole writer) and readers.
pub type SharedWindow = Arc<Mutex<RollingWindow>>;

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn shared(capacity: usize) -> SharedWindow {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Append a sample, evicting the oldest once over capacity.
    pub fn push(&mut self, sample: SampleTick) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Independent copy of the current contents in chronological order.
    pub fn snapshot(&self) -> Vec<SampleTick> {
        self.samples.iter().copied().collect()
    }

    /// Largest throughput across both directions, never below the graph floor.
    pub fn max_value(&self) -> f64 {
        self.samples
            .iter()
            .map(SampleTick::peak)
            .fold(GRAPH_SCALE_FLOOR_MBPS, f64::max)
    }
}

#[cfg(test)]
impl RollingWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
