use glam::Vec2;

use crate::collision::contact::Contact;
use crate::core::math;
use crate::core::shape::{Shape, TransformedShape};

/// Result of generating contacts for one candidate pair.
#[derive(Debug, Clone, Copy)]
pub struct CollisionInfo {
    /// True when the input pair was exchanged to normalize dispatch order.
    /// The swapped order is authoritative: contact normals point from the
    /// first shape of the *returned* order toward the second.
    pub swapped: bool,
    pub count: usize,
    /// Incremental hint threaded back to the spatial index for this pair.
    pub collision_id: u32,
}

fn rank(shape: &Shape) -> u8 {
    match shape.world {
        TransformedShape::Circle { .. } => 0,
        TransformedShape::Segment { .. } => 1,
    }
}

/// Generates contacts for a candidate pair into the head of `slab`.
///
/// `slab` must have room for at least
/// [`MAX_CONTACTS_PER_ARBITER`](crate::config::MAX_CONTACTS_PER_ARBITER)
/// contacts.
pub fn collide(a: &Shape, b: &Shape, collision_id: u32, slab: &mut [Contact]) -> CollisionInfo {
    let swapped = rank(a) > rank(b);
    let (first, second) = if swapped { (b, a) } else { (a, b) };

    let count = match (first.world, second.world) {
        (
            TransformedShape::Circle {
                center: c1,
                radius: r1,
            },
            TransformedShape::Circle {
                center: c2,
                radius: r2,
            },
        ) => circle_to_circle(c1, r1, c2, r2, 0, slab),
        (
            TransformedShape::Circle { center, radius },
            TransformedShape::Segment {
                a: ta,
                b: tb,
                radius: segment_radius,
                ..
            },
        ) => {
            let closest = math::closest_point_on_segment(center, ta, tb);
            circle_to_circle(center, radius, closest, segment_radius, 0, slab)
        }
        // Segments are infinitely thin along their axis; two of them never
        // produce a stable manifold.
        (TransformedShape::Segment { .. }, TransformedShape::Segment { .. }) => 0,
        (TransformedShape::Segment { .. }, TransformedShape::Circle { .. }) => {
            unreachable!("pairs are ordered circle before segment")
        }
    };

    CollisionInfo {
        swapped,
        count,
        collision_id,
    }
}

fn circle_to_circle(
    c1: Vec2,
    r1: f32,
    c2: Vec2,
    r2: f32,
    hash: u32,
    slab: &mut [Contact],
) -> usize {
    let min_dist = r1 + r2;
    let delta = c2 - c1;
    let dist_sq = delta.length_squared();
    if dist_sq >= min_dist * min_dist {
        return 0;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > f32::EPSILON {
        delta / dist
    } else {
        Vec2::X
    };
    let point = c1 + delta * (r1 / min_dist);

    slab[0] = Contact::new(point, normal, dist - min_dist, hash);
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::ShapeGeometry;
    use crate::utils::allocator::Handle;

    fn circle_at(center: Vec2, radius: f32) -> Shape {
        let mut shape = Shape::new(
            Handle::new(0, 0),
            ShapeGeometry::Circle {
                offset: Vec2::ZERO,
                radius,
            },
        );
        shape.cache_bb(center, Vec2::X);
        shape
    }

    fn ground_segment() -> Shape {
        let mut shape = Shape::new(
            Handle::new(1, 0),
            ShapeGeometry::Segment {
                a: Vec2::new(-10.0, 0.0),
                b: Vec2::new(10.0, 0.0),
                radius: 0.0,
            },
        );
        shape.cache_bb(Vec2::ZERO, Vec2::X);
        shape
    }

    #[test]
    fn overlapping_circles_produce_one_contact() {
        let a = circle_at(Vec2::ZERO, 1.0);
        let b = circle_at(Vec2::new(1.5, 0.0), 1.0);
        let mut slab = [Contact::default(); 2];

        let info = collide(&a, &b, 0, &mut slab);
        assert_eq!(info.count, 1);
        assert!(!info.swapped);
        assert!((slab[0].dist + 0.5).abs() < 1e-5, "dist was {}", slab[0].dist);
        assert!((slab[0].normal - Vec2::X).length() < 1e-5);
        assert!((slab[0].point - Vec2::new(1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn separated_circles_produce_nothing() {
        let a = circle_at(Vec2::ZERO, 1.0);
        let b = circle_at(Vec2::new(3.0, 0.0), 1.0);
        let mut slab = [Contact::default(); 2];
        assert_eq!(collide(&a, &b, 0, &mut slab).count, 0);
    }

    #[test]
    fn segment_circle_pair_is_swapped_for_dispatch() {
        let circle = circle_at(Vec2::new(0.0, 0.5), 1.0);
        let segment = ground_segment();
        let mut slab = [Contact::default(); 2];

        let info = collide(&segment, &circle, 0, &mut slab);
        assert!(info.swapped);
        assert_eq!(info.count, 1);
        // Normal points from the circle (first in swapped order) toward the
        // segment below it.
        assert!(slab[0].normal.y < -0.99);
        assert!((slab[0].dist + 0.5).abs() < 1e-5);
    }
}
