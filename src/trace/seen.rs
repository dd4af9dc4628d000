//! Two-generation visited set.

use crate::types::LatticePoint;
use std::collections::HashSet;

/// Visited set whose memory is bounded to two generations of `threshold` entries.
///
/// Lookups consult both generations. Rotation moves `current` into `previous` and forgets
/// the old `previous`, so a point can be expanded again at most once per rotation.
#[derive(Debug)]
pub struct SeenCache {
    current: HashSet<LatticePoint>,
    previous: HashSet<LatticePoint>,
    threshold: usize,
    rotations: u64,
}

impl SeenCache {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            current: HashSet::new(),
            previous: HashSet::new(),
            threshold,
            rotations: 0,
        }
    }

    /// True if the point was seen; otherwise records it and returns false.
    pub fn has_been_seen(&mut self, point: LatticePoint) -> bool {
        if self.current.contains(&point) || self.previous.contains(&point) {
            return true;
        }
        // Hard cap between checkpoints
        if self.current.len() >= self.threshold {
            self.rotate();
        }
        self.current.insert(point);
        false
    }

    /// Rotate when the current generation has reached the threshold.
    pub fn maybe_rotate(&mut self) -> bool {
        if self.current.len() >= self.threshold {
            self.rotate();
            true
        } else {
            false
        }
    }

    pub fn rotate(&mut self) {
        self.previous = std::mem::take(&mut self.current);
        self.rotations += 1;
    }

    pub fn current_len(&self) -> usize {
        self.current.len()
    }

    pub fn previous_len(&self) -> usize {
        self.previous.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }
}
