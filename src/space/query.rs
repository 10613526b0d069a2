use glam::Vec2;

use crate::core::math::Aabb;
use crate::core::shape::{PointQueryInfo, SegmentQueryInfo, ShapeFilter, ShapeId};
use crate::space::Space;

impl Space {
    /// Nearest shape to `point` within `max_distance`. Misses return a
    /// sentinel info with no shape and `distance == max_distance`. Sensors
    /// and filter-rejected shapes are ignored.
    pub fn point_query_nearest(
        &self,
        point: Vec2,
        max_distance: f32,
        filter: ShapeFilter,
    ) -> PointQueryInfo {
        let mut info = PointQueryInfo {
            shape: None,
            point: Vec2::ZERO,
            distance: max_distance,
            gradient: Vec2::ZERO,
        };

        let bb = Aabb::for_circle(point, max_distance.max(0.0));
        let mut visit = |shape_id: ShapeId| {
            let shape = &self.shapes[shape_id];
            if shape.filter.reject(&filter) || shape.sensor {
                return;
            }
            let hit = shape.point_query(point);
            if hit.distance < info.distance {
                info = PointQueryInfo {
                    shape: Some(shape_id),
                    ..hit
                };
            }
        };

        self.dynamic_shapes.query(bb, &mut visit);
        self.static_shapes.query(bb, &mut visit);
        info
    }

    /// Visits every shape within `max_distance` of `point`. Runs under lock.
    pub fn point_query<F: FnMut(ShapeId, &PointQueryInfo)>(
        &mut self,
        point: Vec2,
        max_distance: f32,
        filter: ShapeFilter,
        mut f: F,
    ) {
        self.lock();

        let bb = Aabb::for_circle(point, max_distance.max(0.0));
        let mut hits = Vec::new();
        {
            let shapes = &self.shapes;
            let mut visit = |shape_id: ShapeId| {
                let shape = &shapes[shape_id];
                if shape.filter.reject(&filter) {
                    return;
                }
                let hit = shape.point_query(point);
                if hit.distance < max_distance {
                    hits.push((shape_id, hit));
                }
            };
            self.dynamic_shapes.query(bb, &mut visit);
            self.static_shapes.query(bb, &mut visit);
        }
        for (shape_id, hit) in &hits {
            f(*shape_id, hit);
        }

        self.unlock(true);
    }

    /// First shape hit by the swept circle from `a` to `b`. Sensors and
    /// filter-rejected shapes are ignored.
    pub fn segment_query_first(
        &self,
        a: Vec2,
        b: Vec2,
        radius: f32,
        filter: ShapeFilter,
    ) -> Option<SegmentQueryInfo> {
        let mut best: Option<SegmentQueryInfo> = None;

        let mut visit = |shape_id: ShapeId| {
            let shape = &self.shapes[shape_id];
            if shape.filter.reject(&filter) || shape.sensor {
                return;
            }
            if let Some(hit) = shape.segment_query(a, b, radius) {
                let closer = match &best {
                    Some(current) => hit.alpha < current.alpha,
                    None => true,
                };
                if closer {
                    best = Some(SegmentQueryInfo {
                        shape: Some(shape_id),
                        ..hit
                    });
                }
            }
        };

        self.dynamic_shapes.segment_query(a, b, &mut visit);
        self.static_shapes.segment_query(a, b, &mut visit);
        best
    }

    /// Visits every shape hit by the swept circle from `a` to `b`, in index
    /// order. Runs under lock.
    pub fn segment_query<F: FnMut(ShapeId, &SegmentQueryInfo)>(
        &mut self,
        a: Vec2,
        b: Vec2,
        radius: f32,
        filter: ShapeFilter,
        mut f: F,
    ) {
        self.lock();

        let mut hits = Vec::new();
        {
            let shapes = &self.shapes;
            let mut visit = |shape_id: ShapeId| {
                let shape = &shapes[shape_id];
                if shape.filter.reject(&filter) {
                    return;
                }
                if let Some(hit) = shape.segment_query(a, b, radius) {
                    hits.push((
                        shape_id,
                        SegmentQueryInfo {
                            shape: Some(shape_id),
                            ..hit
                        },
                    ));
                }
            };
            self.dynamic_shapes.segment_query(a, b, &mut visit);
            self.static_shapes.segment_query(a, b, &mut visit);
        }
        for (shape_id, hit) in &hits {
            f(*shape_id, hit);
        }

        self.unlock(true);
    }

    /// Visits every shape whose bounding box touches `bb`. Runs under lock.
    pub fn bb_query<F: FnMut(ShapeId)>(&mut self, bb: Aabb, filter: ShapeFilter, mut f: F) {
        self.lock();

        let mut hits = Vec::new();
        {
            let shapes = &self.shapes;
            let mut visit = |shape_id: ShapeId| {
                if !shapes[shape_id].filter.reject(&filter) {
                    hits.push(shape_id);
                }
            };
            self.dynamic_shapes.query(bb, &mut visit);
            self.static_shapes.query(bb, &mut visit);
        }
        for shape_id in hits {
            f(shape_id);
        }

        self.unlock(true);
    }
}
