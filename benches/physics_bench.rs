use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use tumble::*;

const DT: f32 = 1.0 / 60.0;

fn prepare_space(ball_count: usize) -> Space {
    let mut space = Space::new();
    space.set_gravity(Vec2::new(0.0, -10.0));
    space.sleep_time_threshold = 0.5;

    // A box of fat segments to keep everything contained.
    let walls = [
        (Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0)),
        (Vec2::new(-20.0, 0.0), Vec2::new(-20.0, 40.0)),
        (Vec2::new(20.0, 0.0), Vec2::new(20.0, 40.0)),
    ];
    for (a, b) in walls {
        let mut wall = Shape::segment(space.static_body(), a, b, 0.5);
        wall.friction = 0.7;
        space.add_shape(wall);
    }

    for i in 0..ball_count {
        let column = (i % 16) as f32;
        let row = (i / 16) as f32;
        let mut body = Body::new(1.0, moment_for_circle(1.0, 0.0, 0.4, Vec2::ZERO));
        body.set_position(Vec2::new(-8.0 + column, 1.0 + row * 1.1));
        let body_id = space.add_body(body);
        let mut shape = Shape::circle(body_id, 0.4, Vec2::ZERO);
        shape.friction = 0.7;
        space.add_shape(shape);
    }

    space
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("space_step");
    for &count in &[64usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("pile", count), &count, |b, &count| {
            let mut space = prepare_space(count);
            // Warm the caches so the bench measures steady-state stepping.
            for _ in 0..30 {
                space.step(DT);
            }
            b.iter(|| space.step(black_box(DT)));
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut space = prepare_space(256);
    for _ in 0..120 {
        space.step(DT);
    }

    c.bench_function("point_query_nearest", |b| {
        b.iter(|| {
            space.point_query_nearest(
                black_box(Vec2::new(0.0, 2.0)),
                5.0,
                ShapeFilter::default(),
            )
        })
    });

    c.bench_function("segment_query_first", |b| {
        b.iter(|| {
            space.segment_query_first(
                black_box(Vec2::new(-15.0, 20.0)),
                black_box(Vec2::new(15.0, 0.5)),
                0.0,
                ShapeFilter::default(),
            )
        })
    });
}

criterion_group!(benches, bench_step, bench_queries);
criterion_main!(benches);
