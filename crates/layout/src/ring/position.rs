//! Ring position mapping.
//!
//! A ring position is a scalar in `[0, 1)`. Position 0 is angle 0 and the
//! ring runs clockwise in screen coordinates (y grows downwards).

use serde::Serialize;

/// Full turn in radians.
pub const TAU: f64 = std::f64::consts::TAU;

/// A point in renderer coordinates.
#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Maps ring positions and angles onto a circle around a fixed center.
#[derive(Copy, Clone, Debug)]
pub struct PositionMapper {
    center: Point,
}

impl PositionMapper {
    pub fn new(center: Point) -> Self {
        Self { center }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    /// `2π·p`. Callers clamp `p` first.
    #[inline]
    pub fn angle(position: f64) -> f64 {
        TAU * position
    }

    /// Point at `angle` on the circle of the given radius.
    #[inline]
    pub fn point_at_angle(&self, angle: f64, radius: f64) -> Point {
        Point {
            x: self.center.x + radius * angle.cos(),
            y: self.center.y + radius * angle.sin(),
        }
    }

    /// Point for a ring position on the circle of the given radius.
    #[inline]
    pub fn point(&self, position: f64, radius: f64) -> Point {
        self.point_at_angle(Self::angle(position), radius)
    }
}

/// Clamps a raw position into `[0, 1)`.
///
/// Values outside the range wrap by their fractional part; NaN and
/// infinities land on 0.
pub fn clamp_position(position: f64) -> f64 {
    if !position.is_finite() {
        return 0.0;
    }
    let wrapped = position.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Normalizes an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Shortest angular distance between two angles, in `[0, π]`.
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let d = normalize_angle(a - b);
    d.min(TAU - d)
}

/// Clockwise distance from position `from` to position `to`, in `[0, 1)`.
pub fn clockwise_gap(from: f64, to: f64) -> f64 {
    clamp_position(to - from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_angle_of_position() {
        assert_eq!(PositionMapper::angle(0.0), 0.0);
        assert!((PositionMapper::angle(0.25) - TAU / 4.0).abs() < EPS);
        assert!((PositionMapper::angle(0.5) - std::f64::consts::PI).abs() < EPS);
    }

    #[test]
    fn test_point_offsets_from_center() {
        let mapper = PositionMapper::new(Point::new(100.0, 50.0));
        let p = mapper.point(0.0, 10.0);
        assert!((p.x - 110.0).abs() < EPS);
        assert!((p.y - 50.0).abs() < EPS);

        let p = mapper.point(0.25, 10.0);
        assert!((p.x - 100.0).abs() < EPS);
        assert!((p.y - 60.0).abs() < EPS);
    }

    #[test]
    fn test_clamp_position() {
        assert_eq!(clamp_position(0.3), 0.3);
        assert!((clamp_position(1.25) - 0.25).abs() < EPS);
        assert!((clamp_position(-0.25) - 0.75).abs() < EPS);
        assert_eq!(clamp_position(f64::NAN), 0.0);
        assert_eq!(clamp_position(f64::INFINITY), 0.0);
        assert_eq!(clamp_position(1.0), 0.0);
        assert!(clamp_position(-1e-20) < 1.0);
    }

    #[test]
    fn test_angular_distance_wraps() {
        let a = normalize_angle(-0.1);
        assert!((angular_distance(a, 0.1) - 0.2).abs() < EPS);
        assert!((angular_distance(0.0, std::f64::consts::PI) - std::f64::consts::PI).abs() < EPS);
    }

    #[test]
    fn test_clockwise_gap() {
        assert!((clockwise_gap(0.9, 0.1) - 0.2).abs() < EPS);
        assert!((clockwise_gap(0.1, 0.9) - 0.8).abs() < EPS);
        assert_eq!(clockwise_gap(0.4, 0.4), 0.0);
    }
}
