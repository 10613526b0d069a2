use tumble::*;

fn setup() -> (Space, ShapeId, ShapeId) {
    let mut space = Space::new();

    let ground = space.add_shape(Shape::segment(
        space.static_body(),
        Vec2::new(-10.0, 0.0),
        Vec2::new(10.0, 0.0),
        0.1,
    ));

    let mut body = Body::new(1.0, moment_for_circle(1.0, 0.0, 1.0, Vec2::ZERO));
    body.set_position(Vec2::new(0.0, 5.0));
    let body_id = space.add_body(body);
    let circle = space.add_shape(Shape::circle(body_id, 1.0, Vec2::ZERO));

    (space, ground, circle)
}

#[test]
fn nearest_point_query_picks_the_closer_shape() {
    let (space, ground, circle) = setup();

    let near_circle = space.point_query_nearest(Vec2::new(0.0, 4.5), 10.0, ShapeFilter::default());
    assert_eq!(near_circle.shape, Some(circle));
    assert!(near_circle.distance < 0.0, "query point is inside the circle");

    let near_ground = space.point_query_nearest(Vec2::new(3.0, 1.0), 10.0, ShapeFilter::default());
    assert_eq!(near_ground.shape, Some(ground));
    assert!((near_ground.distance - 0.9).abs() < 1e-4);
    assert!((near_ground.point - Vec2::new(3.0, 0.1)).length() < 1e-4);
}

#[test]
fn nearest_point_query_misses_with_a_sentinel() {
    let (space, _, _) = setup();

    let miss = space.point_query_nearest(Vec2::new(100.0, 100.0), 2.0, ShapeFilter::default());
    assert_eq!(miss.shape, None);
    assert_eq!(miss.distance, 2.0);
}

#[test]
fn nearest_point_query_ignores_sensors_and_filtered_shapes() {
    let (mut space, ground, circle) = setup();

    space.shape_mut(circle).expect("shape exists").sensor = true;
    let hit = space.point_query_nearest(Vec2::new(0.0, 5.0), 100.0, ShapeFilter::default());
    assert_eq!(hit.shape, Some(ground), "sensors are skipped");

    space.shape_mut(circle).expect("shape exists").sensor = false;
    space.shape_mut(circle).expect("shape exists").filter = ShapeFilter::new(0, 0b01, 0b01);
    let rejecting = ShapeFilter::new(0, 0b10, 0b10);
    let hit = space.point_query_nearest(Vec2::new(0.0, 5.0), 100.0, rejecting);
    assert_eq!(hit.shape, Some(ground), "category mismatch is skipped");
}

#[test]
fn point_query_callback_visits_everything_in_range() {
    let (mut space, ground, circle) = setup();

    let mut seen = Vec::new();
    space.point_query(Vec2::new(0.0, 1.0), 100.0, ShapeFilter::default(), |id, info| {
        seen.push((id, info.distance));
    });

    assert_eq!(seen.len(), 2);
    assert!(seen.iter().any(|(id, _)| *id == ground));
    assert!(seen.iter().any(|(id, _)| *id == circle));
}

#[test]
fn first_segment_hit_wins_by_alpha() {
    let (space, _, circle) = setup();

    // Straight down through the circle, then the ground.
    let hit = space
        .segment_query_first(
            Vec2::new(0.0, 10.0),
            Vec2::new(0.0, -1.0),
            0.0,
            ShapeFilter::default(),
        )
        .expect("ray hits something");
    assert_eq!(hit.shape, Some(circle));
    assert!((hit.point.y - 6.0).abs() < 1e-3, "hits the top of the circle");
    assert!(hit.normal.y > 0.99);

    // Off to the side only the ground remains.
    let hit = space
        .segment_query_first(
            Vec2::new(5.0, 10.0),
            Vec2::new(5.0, -1.0),
            0.0,
            ShapeFilter::default(),
        )
        .expect("ray hits the ground");
    assert!((hit.point.y - 0.1).abs() < 1e-3);
}

#[test]
fn segment_query_callback_reports_all_hits() {
    let (mut space, _, _) = setup();

    let mut hits = 0;
    space.segment_query(
        Vec2::new(0.0, 10.0),
        Vec2::new(0.0, -1.0),
        0.0,
        ShapeFilter::default(),
        |_, info| {
            assert!(info.alpha >= 0.0 && info.alpha <= 1.0);
            hits += 1;
        },
    );
    assert_eq!(hits, 2);
}

#[test]
fn bb_query_collects_overlapping_shapes() {
    let (mut space, ground, circle) = setup();

    let mut seen = Vec::new();
    space.bb_query(
        Aabb::new(Vec2::new(-0.5, 4.0), Vec2::new(0.5, 6.0)),
        ShapeFilter::default(),
        |id| seen.push(id),
    );
    assert_eq!(seen, vec![circle]);

    seen.clear();
    space.bb_query(
        Aabb::new(Vec2::new(-20.0, -1.0), Vec2::new(20.0, 10.0)),
        ShapeFilter::default(),
        |id| seen.push(id),
    );
    assert!(seen.contains(&ground) && seen.contains(&circle));
}

#[test]
fn queries_see_sleeping_bodies() {
    let mut space = Space::new();
    space.set_gravity(Vec2::new(0.0, -10.0));
    space.sleep_time_threshold = 0.2;

    space.add_shape(Shape::segment(
        space.static_body(),
        Vec2::new(-10.0, 0.0),
        Vec2::new(10.0, 0.0),
        0.0,
    ));
    let mut body = Body::new(1.0, moment_for_circle(1.0, 0.0, 0.5, Vec2::ZERO));
    body.set_position(Vec2::new(0.0, 0.5));
    let body_id = space.add_body(body);
    let circle = space.add_shape(Shape::circle(body_id, 0.5, Vec2::ZERO));

    for _ in 0..180 {
        space.step(1.0 / 60.0);
    }
    assert!(space.body(body_id).expect("exists").is_sleeping());

    // The sleeping shape lives in the static index but stays queryable.
    let hit = space.point_query_nearest(Vec2::new(0.0, 0.5), 1.0, ShapeFilter::default());
    assert_eq!(hit.shape, Some(circle));
}
