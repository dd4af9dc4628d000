//! Escape-time membership oracle.
//!
//! Every component that needs to know whether a point belongs to the set goes through
//! [`MembershipOracle`]. The tracer and refiner use the Mandelbrot form; frame rendering uses
//! the Julia form with the frame's trail coordinate as the Julia parameter.

use crate::types::PlanePoint;

/// Squared orbit radius at which a point counts as escaped
pub const BAILOUT_SQ: f64 = 25.0;

/// Result of iterating one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Escape {
    pub in_set: bool,
    /// Iteration index at which the orbit crossed the bailout (0 for members)
    pub escaped_at: u32,
    /// Squared orbit radius at escape (0.0 for members)
    pub final_sq_dist: f64,
}

impl Escape {
    pub const MEMBER: Escape = Escape {
        in_set: true,
        escaped_at: 0,
        final_sq_dist: 0.0,
    };
}

/// Deterministic escape-time calculation.
pub trait MembershipOracle: Send + Sync {
    /// Iterate `point` for up to `max_iter` steps.
    ///
    /// With `julia = None` the point is the Mandelbrot parameter `c`. With `Some(c)` the point
    /// is the Julia starting value and `c` the fixed parameter.
    fn calc(&self, point: PlanePoint, julia: Option<PlanePoint>, max_iter: u32) -> Escape;

    /// Iteration level: the escape iteration, or `max_iter + 1` for members
    fn level(&self, point: PlanePoint, julia: Option<PlanePoint>, max_iter: u32) -> u32 {
        let escape = self.calc(point, julia, max_iter);
        if escape.in_set {
            max_iter + 1
        } else {
            escape.escaped_at
        }
    }
}

/// The iterative `z -> z^2 + c` kernel
#[derive(Debug, Clone, Copy)]
pub struct EscapeTimeOracle {
    use_shortcuts: bool,
}

impl EscapeTimeOracle {
    pub fn new(use_shortcuts: bool) -> Self {
        Self { use_shortcuts }
    }
}

impl Default for EscapeTimeOracle {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Closed-form membership for the main cardioid and the period-2 bulb
pub fn in_known_component(point: PlanePoint) -> bool {
    let PlanePoint { x, y } = point;
    let p = ((x - 0.25) * (x - 0.25) + y * y).sqrt();
    if x <= p - 2.0 * p * p + 0.25 {
        return true;
    }
    (x + 1.0) * (x + 1.0) + y * y <= 1.0 / 16.0
}

impl MembershipOracle for EscapeTimeOracle {
    fn calc(&self, point: PlanePoint, julia: Option<PlanePoint>, max_iter: u32) -> Escape {
        let c = match julia {
            Some(c) => c,
            None => {
                if self.use_shortcuts && in_known_component(point) {
                    return Escape::MEMBER;
                }
                point
            }
        };

        let (mut x, mut y) = (point.x, point.y);
        for i in 0..max_iter {
            let next_x = x * x - y * y + c.x;
            let next_y = 2.0 * x * y + c.y;
            x = next_x;
            y = next_y;
            let dist = x * x + y * y;
            if dist >= BAILOUT_SQ {
                return Escape {
                    in_set: false,
                    escaped_at: i,
                    final_sq_dist: dist,
                };
            }
        }
        Escape::MEMBER
    }
}
