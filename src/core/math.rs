use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Common math types re-exported for convenience.
pub use glam::Mat2;

/// Rotates `v` by the unit rotation vector `rot` (complex multiplication).
#[inline]
pub fn rotate(v: Vec2, rot: Vec2) -> Vec2 {
    Vec2::new(v.x * rot.x - v.y * rot.y, v.x * rot.y + v.y * rot.x)
}

/// Rotates `v` by the inverse of the unit rotation vector `rot`.
#[inline]
pub fn unrotate(v: Vec2, rot: Vec2) -> Vec2 {
    Vec2::new(v.x * rot.x + v.y * rot.y, v.y * rot.x - v.x * rot.y)
}

/// Magnitude of the 2D cross product of `a` and `b`.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

/// `v` rotated 90 degrees counterclockwise.
#[inline]
pub fn perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Closest point to `p` on the segment from `a` to `b`.
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let delta = b - a;
    let length_sq = delta.length_squared();
    if length_sq < f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(delta) / length_sq).clamp(0.0, 1.0);
    a + delta * t
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Tight bounding box of a circle.
    pub fn for_circle(center: Vec2, radius: f32) -> Self {
        Self {
            min: center - Vec2::splat(radius),
            max: center + Vec2::splat(radius),
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        self.min.x <= p.x && p.x <= self.max.x && self.min.y <= p.y && p.y <= self.max.y
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn area(&self) -> f32 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y)
    }

    /// Slab test against the segment from `a` to `b`.
    pub fn intersects_segment(&self, a: Vec2, b: Vec2) -> bool {
        let delta = b - a;
        let mut t_min = 0.0f32;
        let mut t_max = 1.0f32;

        for axis in 0..2 {
            let origin = a[axis];
            let dir = delta[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if dir.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return false;
                }
            } else {
                let inv = 1.0 / dir;
                let (t1, t2) = ((lo - origin) * inv, (hi - origin) * inv);
                t_min = t_min.max(t1.min(t2));
                t_max = t_max.min(t1.max(t2));
                if t_min > t_max {
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_and_unrotate_are_inverses() {
        let rot = Vec2::from_angle(0.7);
        let v = Vec2::new(3.0, -2.0);
        let back = unrotate(rotate(v, rot), rot);
        assert!((back - v).length() < 1e-5);
    }

    #[test]
    fn aabb_segment_test_hits_crossing_segments() {
        let bb = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        assert!(bb.intersects_segment(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0)));
        assert!(!bb.intersects_segment(Vec2::new(-2.0, 2.0), Vec2::new(2.0, 3.0)));
        // Vertical segment, degenerate x extent.
        assert!(bb.intersects_segment(Vec2::new(0.5, -3.0), Vec2::new(0.5, 3.0)));
    }

    #[test]
    fn closest_point_clamps_to_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(closest_point_on_segment(Vec2::new(-5.0, 1.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec2::new(15.0, 1.0), a, b), b);
        assert_eq!(
            closest_point_on_segment(Vec2::new(4.0, 3.0), a, b),
            Vec2::new(4.0, 0.0)
        );
    }
}
