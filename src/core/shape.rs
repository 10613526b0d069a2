use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::core::body::BodyId;
use crate::core::math::{self, Aabb};
use crate::utils::allocator::Handle;

pub type ShapeId = Handle<Shape>;

/// Category/mask/group collision filter.
///
/// Two shapes collide when neither rejects the other: sharing a non-zero
/// group rejects, as does a missing category/mask overlap in either
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeFilter {
    pub group: u64,
    pub categories: u32,
    pub mask: u32,
}

impl Default for ShapeFilter {
    fn default() -> Self {
        Self {
            group: 0,
            categories: u32::MAX,
            mask: u32::MAX,
        }
    }
}

impl ShapeFilter {
    pub fn new(group: u64, categories: u32, mask: u32) -> Self {
        Self {
            group,
            categories,
            mask,
        }
    }

    pub fn reject(&self, other: &ShapeFilter) -> bool {
        (self.group != 0 && self.group == other.group)
            || (self.categories & other.mask) == 0
            || (other.categories & self.mask) == 0
    }
}

/// Body-relative geometry of a shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ShapeGeometry {
    Circle { offset: Vec2, radius: f32 },
    Segment { a: Vec2, b: Vec2, radius: f32 },
}

/// World-space coordinates cached from the owning body's transform.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TransformedShape {
    Circle {
        center: Vec2,
        radius: f32,
    },
    Segment {
        a: Vec2,
        b: Vec2,
        radius: f32,
        normal: Vec2,
    },
}

/// Result of a nearest-point query. `shape` is `None` when nothing was
/// within range; `distance` is negative inside a shape.
#[derive(Debug, Clone, Copy)]
pub struct PointQueryInfo {
    pub shape: Option<ShapeId>,
    pub point: Vec2,
    pub distance: f32,
    pub gradient: Vec2,
}

/// Result of a segment (ray) query. `alpha` is the normalized hit position
/// along the query segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentQueryInfo {
    pub shape: Option<ShapeId>,
    pub point: Vec2,
    pub normal: Vec2,
    pub alpha: f32,
}

/// A collision shape bound to exactly one body.
pub struct Shape {
    pub(crate) body: BodyId,
    pub(crate) geometry: ShapeGeometry,
    /// Monotonic per-space id; hashes the shape into the spatial indices and
    /// the arbiter cache.
    pub(crate) hashid: u32,
    pub collision_type: u64,
    pub filter: ShapeFilter,
    pub sensor: bool,
    pub elasticity: f32,
    pub friction: f32,
    pub surface_velocity: Vec2,
    pub(crate) bb: Aabb,
    pub(crate) world: TransformedShape,
}

impl Shape {
    pub fn new(body: BodyId, geometry: ShapeGeometry) -> Self {
        match geometry {
            ShapeGeometry::Circle { radius, .. } => {
                assert!(radius >= 0.0, "circle radius must be non-negative");
            }
            ShapeGeometry::Segment { a, b, radius } => {
                assert!(radius >= 0.0, "segment radius must be non-negative");
                assert!(a != b, "segment endpoints must differ");
            }
        }

        let mut shape = Self {
            body,
            geometry,
            hashid: 0,
            collision_type: 0,
            filter: ShapeFilter::default(),
            sensor: false,
            elasticity: 0.0,
            friction: 0.0,
            surface_velocity: Vec2::ZERO,
            bb: Aabb::new(Vec2::ZERO, Vec2::ZERO),
            world: TransformedShape::Circle {
                center: Vec2::ZERO,
                radius: 0.0,
            },
        };
        shape.cache_bb(Vec2::ZERO, Vec2::X);
        shape
    }

    pub fn circle(body: BodyId, radius: f32, offset: Vec2) -> Self {
        Self::new(body, ShapeGeometry::Circle { offset, radius })
    }

    pub fn segment(body: BodyId, a: Vec2, b: Vec2, radius: f32) -> Self {
        Self::new(body, ShapeGeometry::Segment { a, b, radius })
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn geometry(&self) -> ShapeGeometry {
        self.geometry
    }

    pub fn bb(&self) -> Aabb {
        self.bb
    }

    /// Recomputes the cached world coordinates and bounding box from the
    /// owning body's transform.
    pub(crate) fn cache_bb(&mut self, position: Vec2, rotation: Vec2) -> Aabb {
        match self.geometry {
            ShapeGeometry::Circle { offset, radius } => {
                let center = position + math::rotate(offset, rotation);
                self.world = TransformedShape::Circle { center, radius };
                self.bb = Aabb::for_circle(center, radius);
            }
            ShapeGeometry::Segment { a, b, radius } => {
                let ta = position + math::rotate(a, rotation);
                let tb = position + math::rotate(b, rotation);
                let normal = math::perp((tb - ta).normalize());
                self.world = TransformedShape::Segment {
                    a: ta,
                    b: tb,
                    radius,
                    normal,
                };
                self.bb = Aabb::new(
                    ta.min(tb) - Vec2::splat(radius),
                    ta.max(tb) + Vec2::splat(radius),
                );
            }
        }
        self.bb
    }

    /// Nearest point on this shape's surface to `p`. The returned `shape`
    /// field is filled in by the space-level queries.
    pub fn point_query(&self, p: Vec2) -> PointQueryInfo {
        let (surface_center, radius, fallback_gradient) = match self.world {
            TransformedShape::Circle { center, radius } => (center, radius, Vec2::Y),
            TransformedShape::Segment {
                a, b, radius, normal, ..
            } => (math::closest_point_on_segment(p, a, b), radius, normal),
        };

        let delta = p - surface_center;
        let d = delta.length();
        let gradient = if d > f32::EPSILON {
            delta / d
        } else {
            fallback_gradient
        };

        PointQueryInfo {
            shape: None,
            point: surface_center + gradient * radius,
            distance: d - radius,
            gradient,
        }
    }

    /// Casts the swept circle from `a` to `b` (radius `query_radius`) against
    /// this shape, returning the first hit.
    pub fn segment_query(&self, a: Vec2, b: Vec2, query_radius: f32) -> Option<SegmentQueryInfo> {
        match self.world {
            TransformedShape::Circle { center, radius } => {
                circle_segment_query(center, radius, a, b, query_radius)
            }
            TransformedShape::Segment {
                a: ta,
                b: tb,
                radius,
                normal,
            } => {
                let mut best: Option<SegmentQueryInfo> = None;
                let face = fat_segment_face_query(ta, tb, radius, normal, a, b, query_radius);
                for candidate in [
                    face,
                    circle_segment_query(ta, radius, a, b, query_radius),
                    circle_segment_query(tb, radius, a, b, query_radius),
                ]
                .into_iter()
                .flatten()
                {
                    match best {
                        Some(current) if current.alpha <= candidate.alpha => {}
                        _ => best = Some(candidate),
                    }
                }
                best
            }
        }
    }
}

fn circle_segment_query(
    center: Vec2,
    radius: f32,
    a: Vec2,
    b: Vec2,
    query_radius: f32,
) -> Option<SegmentQueryInfo> {
    let d = b - a;
    let f = a - center;
    let rr = radius + query_radius;

    let qa = d.length_squared();
    if qa < f32::EPSILON {
        return None;
    }
    let qb = 2.0 * f.dot(d);
    let qc = f.length_squared() - rr * rr;

    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return None;
    }

    let t = (-qb - disc.sqrt()) / (2.0 * qa);
    if !(0.0..=1.0).contains(&t) {
        return None;
    }

    let hit_center = a + d * t;
    let normal = (hit_center - center).normalize_or_zero();
    Some(SegmentQueryInfo {
        shape: None,
        point: hit_center - normal * query_radius,
        normal,
        alpha: t,
    })
}

/// Hit test of the swept circle against the flat face of a fat segment.
fn fat_segment_face_query(
    ta: Vec2,
    tb: Vec2,
    radius: f32,
    normal: Vec2,
    a: Vec2,
    b: Vec2,
    query_radius: f32,
) -> Option<SegmentQueryInfo> {
    let rr = radius + query_radius;
    let side = (a - ta).dot(normal);
    if side.abs() <= rr {
        // Query already starts inside the fat region.
        return None;
    }
    let outward = if side > 0.0 { normal } else { -normal };

    let denom = (b - a).dot(outward);
    if denom >= 0.0 {
        return None;
    }

    let plane_offset = ta.dot(outward) + rr;
    let t = (plane_offset - a.dot(outward)) / denom;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }

    let hit_center = a + (b - a) * t;
    let along = (hit_center - ta).dot(tb - ta);
    if along < 0.0 || along > (tb - ta).length_squared() {
        return None;
    }

    Some(SegmentQueryInfo {
        shape: None,
        point: hit_center - outward * query_radius,
        normal: outward,
        alpha: t,
    })
}

/// Moment of inertia of a (possibly hollow) circle about its center of mass.
pub fn moment_for_circle(mass: f32, inner_radius: f32, outer_radius: f32, offset: Vec2) -> f32 {
    mass * (0.5 * (inner_radius * inner_radius + outer_radius * outer_radius)
        + offset.length_squared())
}

/// Moment of inertia of a fat segment about the body origin, approximated
/// as a box of `length + 2*radius` by `2*radius`.
pub fn moment_for_segment(mass: f32, a: Vec2, b: Vec2, radius: f32) -> f32 {
    let length = (b - a).length() + 2.0 * radius;
    let offset = (a + b) * 0.5;
    mass * ((length * length + 4.0 * radius * radius) / 12.0 + offset.length_squared())
}

pub fn area_for_circle(inner_radius: f32, outer_radius: f32) -> f32 {
    std::f32::consts::PI * (outer_radius * outer_radius - inner_radius * inner_radius).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_body() -> BodyId {
        Handle::new(0, 0)
    }

    #[test]
    fn filter_rejects_same_nonzero_group() {
        let a = ShapeFilter::new(3, u32::MAX, u32::MAX);
        let b = ShapeFilter::new(3, u32::MAX, u32::MAX);
        assert!(a.reject(&b));
        assert!(!a.reject(&ShapeFilter::default()));
    }

    #[test]
    fn circle_point_query_reports_signed_distance() {
        let mut shape = Shape::circle(dummy_body(), 1.0, Vec2::ZERO);
        shape.cache_bb(Vec2::new(2.0, 0.0), Vec2::X);

        let outside = shape.point_query(Vec2::new(5.0, 0.0));
        assert!((outside.distance - 2.0).abs() < 1e-5);
        assert!((outside.point - Vec2::new(3.0, 0.0)).length() < 1e-5);

        let inside = shape.point_query(Vec2::new(2.2, 0.0));
        assert!(inside.distance < 0.0);
    }

    #[test]
    fn raycast_hits_circle_front_face() {
        let mut shape = Shape::circle(dummy_body(), 1.0, Vec2::ZERO);
        shape.cache_bb(Vec2::new(10.0, 0.0), Vec2::X);

        let info = shape
            .segment_query(Vec2::ZERO, Vec2::new(20.0, 0.0), 0.0)
            .expect("ray should hit the circle");
        assert!((info.alpha - 0.45).abs() < 1e-4);
        assert!((info.normal - Vec2::new(-1.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn raycast_hits_fat_segment_face() {
        let mut shape = Shape::segment(
            dummy_body(),
            Vec2::new(-5.0, 0.0),
            Vec2::new(5.0, 0.0),
            0.5,
        );
        shape.cache_bb(Vec2::ZERO, Vec2::X);

        let info = shape
            .segment_query(Vec2::new(0.0, 4.0), Vec2::new(0.0, -4.0), 0.0)
            .expect("vertical ray should hit the slab");
        assert!((info.point.y - 0.5).abs() < 1e-4);
        assert!(info.normal.y > 0.99);
    }

    #[test]
    fn segment_bb_includes_radius() {
        let shape = Shape::segment(dummy_body(), Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.25);
        assert!((shape.bb().min.y + 0.25).abs() < 1e-6);
        assert!((shape.bb().max.x - 1.25).abs() < 1e-6);
    }

    #[test]
    fn segment_moment_accounts_for_the_radius() {
        // Box approximation: length 2 + 2*0.5 = 3, width 2*0.5, centered.
        let moment = moment_for_segment(2.0, Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.5);
        let expected = 2.0 * (3.0f32 * 3.0 + 4.0 * 0.25) / 12.0;
        assert!((moment - expected).abs() < 1e-5, "moment was {moment}");

        // With zero radius it degenerates to the thin rod m*l²/12.
        let rod = moment_for_segment(3.0, Vec2::new(0.0, -2.0), Vec2::new(0.0, 2.0), 0.0);
        assert!((rod - 4.0).abs() < 1e-5, "rod moment was {rod}");

        // An off-center segment picks up the parallel-axis term.
        let offset = moment_for_segment(1.0, Vec2::new(1.0, 0.0), Vec2::new(3.0, 0.0), 0.0);
        assert!((offset - (4.0 / 12.0 + 4.0)).abs() < 1e-5, "offset moment was {offset}");
    }

    #[test]
    fn circle_area_handles_hollow_and_swapped_radii() {
        use std::f32::consts::PI;

        assert!((area_for_circle(0.0, 2.0) - 4.0 * PI).abs() < 1e-4);
        assert!((area_for_circle(1.0, 2.0) - 3.0 * PI).abs() < 1e-4);
        // Radius order doesn't matter.
        assert_eq!(area_for_circle(2.0, 1.0), area_for_circle(1.0, 2.0));
    }
}
