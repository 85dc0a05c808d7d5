//! The live sample store.
//!
//! A bounded, time-ordered sequence of samples shared between the acquisition worker
//! (writer) and whoever consumes the data (display, statistics, export). All access goes
//! through one mutex; a reader can never observe the sequence mid-append.

use std::{collections::VecDeque, sync::Mutex};

/// One measurement: elapsed time since the run's time origin, and the reading.
///
/// Within one acquisition run the elapsed times are monotonically non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the run started (or since the store was last cleared mid-run).
    pub elapsed: f64,
    /// The reading, in the base unit of the configured measurement function.
    pub value: f64,
}

/// A bounded, thread-safe sample sequence with FIFO eviction.
///
/// Once the store is full, appending evicts the oldest samples first. Eviction never
/// blocks and never errors.
pub struct SampleStore {
    samples: Mutex<VecDeque<Sample>>,
    capacity: usize,
}

impl SampleStore {
    /// Create a new store holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        SampleStore {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one sample, evicting the oldest if the store is full.
    pub fn append(&self, sample: Sample) {
        let mut samples = self.samples.lock().expect("Mutex should not be poisoned");
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Append a batch of samples in order, evicting the oldest as needed.
    pub fn append_many(&self, batch: impl IntoIterator<Item = Sample>) {
        let mut samples = self.samples.lock().expect("Mutex should not be poisoned");
        for sample in batch {
            if samples.len() == self.capacity {
                samples.pop_front();
            }
            samples.push_back(sample);
        }
    }

    /// An ordered copy of the current samples.
    pub fn snapshot(&self) -> Vec<Sample> {
        let samples = self.samples.lock().expect("Mutex should not be poisoned");
        samples.iter().copied().collect()
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .expect("Mutex should not be poisoned")
            .len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all samples.
    pub fn clear(&self) {
        self.samples
            .lock()
            .expect("Mutex should not be poisoned")
            .clear();
    }
}
