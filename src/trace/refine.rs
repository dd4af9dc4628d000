//! Subpixel refinement of trail points.

use crate::config::RefineConfig;
use crate::oracle::{MembershipOracle, BAILOUT_SQ};
use crate::types::{PlanePoint, NEIGHBOR_OFFSETS};
use std::sync::Arc;

/// How far an escape is from the target signature. Iteration distance dominates; squared
/// radius distance breaks ties.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Score {
    iterations: u32,
    distance: f64,
}

impl Score {
    fn better_than(&self, other: &Score) -> bool {
        (self.iterations, self.distance) < (other.iterations, other.distance)
    }
}

/// Hill-climbing search for a point that escapes as late and as narrowly as possible at the
/// border iteration budget: escape iteration `threshold - 1`, final squared radius at the
/// bailout.
pub struct PointRefiner {
    oracle: Arc<dyn MembershipOracle>,
    threshold: u32,
    initial_step: f64,
    config: RefineConfig,
}

impl PointRefiner {
    pub fn new(
        oracle: Arc<dyn MembershipOracle>,
        threshold: u32,
        initial_step: f64,
        config: RefineConfig,
    ) -> Self {
        Self {
            oracle,
            threshold,
            initial_step,
            config,
        }
    }

    fn score(&self, point: PlanePoint) -> Score {
        let escape = self.oracle.calc(point, None, self.threshold);
        if escape.in_set {
            return Score {
                iterations: u32::MAX,
                distance: f64::INFINITY,
            };
        }
        let target = self.threshold.saturating_sub(1);
        Score {
            iterations: target.abs_diff(escape.escaped_at),
            distance: (escape.final_sq_dist - BAILOUT_SQ).abs(),
        }
    }

    fn matches(&self, score: &Score) -> bool {
        score.iterations <= self.config.iteration_tolerance
            && self
                .config
                .distance_tolerance
                .map_or(true, |tolerance| score.distance <= tolerance)
    }

    /// Refine `approx`, or `None` when nothing nearby matches the signature.
    pub fn refine(&self, approx: PlanePoint) -> Option<PlanePoint> {
        let mut best = approx;
        let mut best_score = self.score(approx);

        let floor = 4.0 * f64::EPSILON * approx.x.abs().max(approx.y.abs()).max(1.0);
        let mut step = self.initial_step;

        for _ in 0..self.config.rounds {
            if step < floor {
                break;
            }
            let center = best;
            for offset in NEIGHBOR_OFFSETS {
                for k in 1..=self.config.steps {
                    let reach = step * k as f64;
                    let candidate = PlanePoint::new(
                        center.x + offset.dx as f64 * reach,
                        center.y + offset.dy as f64 * reach,
                    );
                    let score = self.score(candidate);
                    if score.better_than(&best_score) {
                        best = candidate;
                        best_score = score;
                    }
                }
            }
            step /= 2.0;
        }

        if self.matches(&best_score) {
            Some(best)
        } else {
            None
        }
    }
}
