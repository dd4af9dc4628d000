//! Border classification with a bounded membership cache.

use crate::oracle::MembershipOracle;
use crate::types::{LatticePoint, Offset, NEIGHBOR_OFFSETS};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Decides whether a lattice point lies on the border of the set at a fixed iteration budget.
///
/// A point is a border point when its level is at most `threshold` (it escapes) and at least
/// one of its 8 neighbours has a level above `threshold` (it is a member). Neighbours are
/// checked in [`NEIGHBOR_OFFSETS`] order so the reported offset is deterministic.
pub struct BorderClassifier {
    oracle: Arc<dyn MembershipOracle>,
    scale: f64,
    threshold: u32,
    capacity: usize,
    cache: HashMap<LatticePoint, bool>,
    order: VecDeque<LatticePoint>,
    oracle_calls: u64,
}

impl BorderClassifier {
    pub fn new(
        oracle: Arc<dyn MembershipOracle>,
        scale: f64,
        threshold: u32,
        capacity: usize,
    ) -> Self {
        Self {
            oracle,
            scale,
            threshold,
            capacity,
            cache: HashMap::with_capacity(capacity.min(1 << 20)),
            order: VecDeque::with_capacity(capacity.min(1 << 20)),
            oracle_calls: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Number of times the oracle was actually consulted
    pub fn oracle_calls(&self) -> u64 {
        self.oracle_calls
    }

    /// Iteration level of a lattice point (members report `threshold + 1`)
    pub fn level(&self, point: LatticePoint) -> u32 {
        self.oracle
            .level(point.to_plane(self.scale), None, self.threshold)
    }

    /// Whether the point's level exceeds the threshold
    pub fn is_member(&mut self, point: LatticePoint) -> bool {
        if let Some(&member) = self.cache.get(&point) {
            return member;
        }

        self.oracle_calls += 1;
        let member = self.level(point) > self.threshold;

        if self.capacity > 0 {
            if self.order.len() >= self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.cache.remove(&evicted);
                }
            }
            self.cache.insert(point, member);
            self.order.push_back(point);
        }
        member
    }

    /// Returns the neighbour offset that proves `point` is a border point, or `None`.
    pub fn is_border(&mut self, point: LatticePoint) -> Option<Offset> {
        if self.is_member(point) {
            return None;
        }
        NEIGHBOR_OFFSETS
            .into_iter()
            .find(|&offset| self.is_member(point.offset(offset)))
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
