//! Core value types shared across the tracer, the frame store and the coordinator.

use serde::{Deserialize, Serialize};

/// Frame index along the trail (0-based, strictly increasing in trail order)
pub type FrameIndex = u64;

/// A point in the Mandelbrot plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanePoint {
    pub x: f64,
    pub y: f64,
}

impl PlanePoint {
    pub const ORIGIN: PlanePoint = PlanePoint { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another plane point
    pub fn distance(&self, other: &PlanePoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Nearest lattice point on a grid with `scale` units per plane unit
    pub fn to_lattice(&self, scale: f64) -> LatticePoint {
        LatticePoint {
            x: (self.x * scale).round() as i64,
            y: (self.y * scale).round() as i64,
        }
    }
}

/// An integer point on the scaled search grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LatticePoint {
    pub x: i64,
    pub y: i64,
}

impl LatticePoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, by: Offset) -> LatticePoint {
        LatticePoint {
            x: self.x + by.dx,
            y: self.y + by.dy,
        }
    }

    /// Plane coordinate of this lattice point (`plane = lattice / scale`)
    pub fn to_plane(&self, scale: f64) -> PlanePoint {
        PlanePoint {
            x: self.x as f64 / scale,
            y: self.y as f64 / scale,
        }
    }
}

/// A relative step between two 8-adjacent lattice points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Offset {
    pub dx: i64,
    pub dy: i64,
}

impl Offset {
    pub const fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }
}

/// The 8 neighbour offsets in counter-clockwise order starting from north-west.
///
/// The y axis points up (plane orientation), so north is `dy = +1`.
pub const NEIGHBOR_OFFSETS: [Offset; 8] = [
    Offset::new(-1, 1),  // NW
    Offset::new(-1, 0),  // W
    Offset::new(-1, -1), // SW
    Offset::new(0, -1),  // S
    Offset::new(1, -1),  // SE
    Offset::new(1, 0),   // E
    Offset::new(1, 1),   // NE
    Offset::new(0, 1),   // N
];
