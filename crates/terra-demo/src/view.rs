//! Viewer flight path and the top-down view wedge used for culling.

use std::f32::consts::{PI, TAU};

use glam::Vec2;
use terra_lod::{BoundsRect, Cull};

/// Horizontal field of view seen from above: an infinite wedge of half-angle
/// `half_angle` around `direction`, starting at `origin`.
#[derive(Clone, Copy, Debug)]
pub struct ViewWedge {
    pub origin: Vec2,
    /// Unit facing direction.
    pub direction: Vec2,
    pub half_angle: f32,
}

impl ViewWedge {
    /// Wedge matching a vertical field of view and aspect ratio.
    pub fn new(origin: Vec2, direction: Vec2, fov_y_radians: f32, aspect: f32) -> Self {
        let half_angle = ((fov_y_radians * 0.5).tan() * aspect).atan();
        Self {
            origin,
            direction: direction.normalize_or(Vec2::X),
            half_angle,
        }
    }

    /// Signed angle of `p` away from the facing direction, in `(-PI, PI]`.
    fn angle_of(&self, p: Vec2) -> f32 {
        let d = p - self.origin;
        self.direction.perp_dot(d).atan2(self.direction.dot(d))
    }

    /// Classify a map rectangle against the wedge.
    pub fn classify(&self, bounds: &BoundsRect) -> Cull {
        let (x0, x1) = (bounds.x0 as f32, bounds.x1 as f32);
        let (y0, y1) = (bounds.y0 as f32, bounds.y1 as f32);
        if (x0..=x1).contains(&self.origin.x) && (y0..=y1).contains(&self.origin.y) {
            return Cull::Intersect;
        }

        let corners = [
            Vec2::new(x0, y0),
            Vec2::new(x1, y0),
            Vec2::new(x0, y1),
            Vec2::new(x1, y1),
        ];
        let angles = corners.map(|c| self.angle_of(c));
        let min = angles.iter().copied().fold(f32::INFINITY, f32::min);
        let max = angles.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let h = self.half_angle;

        // A rectangle not containing the origin spans less than half a turn;
        // a wider spread means it straddles the backward direction.
        if max - min > PI {
            return if max <= h || min >= -h {
                Cull::Intersect
            } else {
                Cull::Outside
            };
        }
        if min >= -h && max <= h {
            Cull::Inside
        } else if max < -h || min > h {
            Cull::Outside
        } else {
            Cull::Intersect
        }
    }
}

/// Closed orbit around the map centre, completing one lap every `period` frames.
#[derive(Clone, Copy, Debug)]
pub struct Orbit {
    pub center: Vec2,
    pub radius: f32,
    pub period: u32,
}

impl Orbit {
    pub fn position(&self, frame: u32) -> Vec2 {
        self.center + Vec2::from_angle(self.phase(frame)) * self.radius
    }

    /// Direction of travel at `frame`.
    pub fn heading(&self, frame: u32) -> Vec2 {
        Vec2::from_angle(self.phase(frame)).perp()
    }

    fn phase(&self, frame: u32) -> f32 {
        (frame % self.period.max(1)) as f32 / self.period.max(1) as f32 * TAU
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn wedge() -> ViewWedge {
        // 90 degree horizontal field of view looking along +x from the origin.
        ViewWedge {
            origin: Vec2::ZERO,
            direction: Vec2::X,
            half_angle: FRAC_PI_2 * 0.5,
        }
    }

    #[test]
    fn test_rect_ahead_is_inside() {
        assert_eq!(wedge().classify(&BoundsRect::new(10, 12, -1, 1)), Cull::Inside);
    }

    #[test]
    fn test_rect_behind_is_outside() {
        assert_eq!(wedge().classify(&BoundsRect::new(-12, -10, -1, 1)), Cull::Outside);
        assert_eq!(wedge().classify(&BoundsRect::new(-5, -3, 4, 6)), Cull::Outside);
    }

    #[test]
    fn test_rect_on_edge_intersects() {
        assert_eq!(wedge().classify(&BoundsRect::new(5, 10, 0, 20)), Cull::Intersect);
    }

    #[test]
    fn test_rect_holding_viewer_intersects() {
        assert_eq!(wedge().classify(&BoundsRect::new(-4, 4, -4, 4)), Cull::Intersect);
    }

    #[test]
    fn test_orbit_heading_is_tangent() {
        let orbit = Orbit {
            center: Vec2::new(100.0, 100.0),
            radius: 50.0,
            period: 360,
        };
        let p = orbit.position(45) - orbit.center;
        assert!(p.dot(orbit.heading(45)).abs() < 1e-3);
        assert!((p.length() - 50.0).abs() < 1e-3);
    }
}
