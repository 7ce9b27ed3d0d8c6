//! Planar coordinates and line segments.
//!
//! Positions live in a continuous 2D world. Everything the overlay needs from
//! them is distance, a few vector operations for half-plane tests, and the
//! segment-versus-disc predicate used by the AOI checks.

use std::ops::{Add, Mul, Sub};

/// Tolerance used for degenerate geometry (coincident points, zero-length edges).
pub const EPSILON: f64 = 1e-9;

/// A point in the virtual world.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Origin of the world.
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new position.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Squared distance, for comparisons that don't need the root.
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    /// Dot product, treating both positions as vectors.
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the cross product, treating both positions as vectors.
    ///
    /// Positive when `other` is counter-clockwise from `self`.
    pub fn cross(&self, other: &Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Midpoint between two positions.
    pub fn midpoint(&self, other: &Self) -> Self {
        Self::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }

    /// Whether two positions coincide within [`EPSILON`].
    pub fn approx_eq(&self, other: &Self) -> bool {
        self.distance_squared(other) <= EPSILON * EPSILON
    }
}

impl Add for Position {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Position {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Position {
    type Output = Self;

    #[inline]
    fn mul(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// A straight line segment between two positions.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub p1: Position,
    pub p2: Position,
}

impl Segment {
    pub const fn new(p1: Position, p2: Position) -> Self {
        Self { p1, p2 }
    }

    pub fn length(&self) -> f64 {
        self.p1.distance(&self.p2)
    }

    /// Point on the segment closest to `p`.
    pub fn closest_point(&self, p: &Position) -> Position {
        let d = self.p2 - self.p1;
        let len2 = d.dot(&d);
        if len2 <= EPSILON * EPSILON {
            return self.p1;
        }
        let u = ((*p - self.p1).dot(&d) / len2).clamp(0.0, 1.0);
        self.p1 + d * u
    }

    /// Shortest distance from `p` to any point of the segment.
    pub fn distance_to(&self, p: &Position) -> f64 {
        self.closest_point(p).distance(p)
    }

    /// Whether any point of the segment lies within the closed disc.
    pub fn touches_disc(&self, center: &Position, radius: f64) -> bool {
        self.distance_to(center) <= radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(a.distance_squared(&b), 25.0);
    }

    #[test]
    fn cross_sign_gives_orientation() {
        let east = Position::new(1.0, 0.0);
        let north = Position::new(0.0, 1.0);
        assert!(east.cross(&north) > 0.0);
        assert!(north.cross(&east) < 0.0);
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let seg = Segment::new(Position::new(0.0, 0.0), Position::new(10.0, 0.0));
        assert_eq!(seg.distance_to(&Position::new(5.0, 3.0)), 3.0);
        assert_eq!(seg.distance_to(&Position::new(-4.0, 3.0)), 5.0);
    }

    #[test]
    fn disc_touch_uses_nearest_point() {
        let seg = Segment::new(Position::new(0.0, -20.0), Position::new(0.0, 20.0));
        assert!(seg.touches_disc(&Position::new(5.0, 0.0), 10.0));
        assert!(!seg.touches_disc(&Position::new(50.0, 0.0), 10.0));
        assert!(seg.touches_disc(&Position::ORIGIN, 100.0));
    }
}
