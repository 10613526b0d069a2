use tumble::*;

const DT: f32 = 1.0 / 60.0;

fn ground(space: &mut Space) -> ShapeId {
    let mut shape = Shape::segment(
        space.static_body(),
        Vec2::new(-20.0, 0.0),
        Vec2::new(20.0, 0.0),
        0.0,
    );
    shape.friction = 0.7;
    space.add_shape(shape)
}

fn ball(space: &mut Space, x: f32, y: f32) -> (BodyId, ShapeId) {
    let mut body = Body::new(1.0, moment_for_circle(1.0, 0.0, 0.5, Vec2::ZERO));
    body.set_position(Vec2::new(x, y));
    let body_id = space.add_body(body);
    let mut shape = Shape::circle(body_id, 0.5, Vec2::ZERO);
    shape.friction = 0.7;
    let shape_id = space.add_shape(shape);
    (body_id, shape_id)
}

fn body_count(space: &mut Space) -> usize {
    let mut count = 0;
    space.each_body(|_, _| count += 1);
    count
}

fn shape_count(space: &mut Space) -> usize {
    let mut count = 0;
    space.each_shape(|_, _| count += 1);
    count
}

#[test]
fn add_and_remove_restore_membership() {
    let mut space = Space::new();
    ground(&mut space);

    let bodies_before = body_count(&mut space);
    let shapes_before = shape_count(&mut space);

    let (body_id, shape_id) = ball(&mut space, 0.0, 5.0);
    assert!(space.contains_body(body_id));
    assert!(space.contains_shape(shape_id));
    assert_eq!(body_count(&mut space), bodies_before + 1);
    assert_eq!(shape_count(&mut space), shapes_before + 1);

    space.remove_shape(shape_id);
    space.remove_body(body_id);
    assert!(!space.contains_body(body_id));
    assert!(!space.contains_shape(shape_id));
    assert_eq!(body_count(&mut space), bodies_before);
    assert_eq!(shape_count(&mut space), shapes_before);
}

#[test]
#[should_panic(expected = "remove the body's shapes")]
fn removing_a_body_with_shapes_is_an_error() {
    let mut space = Space::new();
    let (body_id, _) = ball(&mut space, 0.0, 5.0);
    space.remove_body(body_id);
}

#[test]
#[should_panic(expected = "not part of this space")]
fn removing_a_stale_body_is_an_error() {
    let mut space = Space::new();
    let (body_id, shape_id) = ball(&mut space, 0.0, 5.0);
    space.remove_shape(shape_id);
    space.remove_body(body_id);
    space.remove_body(body_id);
}

#[test]
fn constraints_unlink_from_both_bodies() {
    let mut space = Space::new();
    let (a, _) = ball(&mut space, 0.0, 5.0);
    let (b, _) = ball(&mut space, 2.0, 5.0);

    let joint = {
        let body_a = space.body(a).expect("a exists");
        let body_b = space.body(b).expect("b exists");
        PinJoint::new(body_a, body_b, Vec2::ZERO, Vec2::ZERO)
    };
    let c1 = space.add_constraint(Constraint::new(a, b, Box::new(joint)));

    let spring = DampedSpring::new(Vec2::ZERO, Vec2::ZERO, 2.0, 5.0, 0.1);
    let c2 = space.add_constraint(Constraint::new(a, b, Box::new(spring)));

    space.remove_constraint(c1);
    assert!(!space.contains_constraint(c1));
    assert!(space.contains_constraint(c2));

    // The remaining constraint still solves without incident.
    space.set_gravity(Vec2::new(0.0, -10.0));
    for _ in 0..10 {
        space.step(DT);
    }

    space.remove_constraint(c2);
    assert!(!space.contains_constraint(c2));
}

#[test]
fn setting_gravity_wakes_sleeping_islands() {
    let mut space = Space::new();
    space.set_gravity(Vec2::new(0.0, -10.0));
    space.sleep_time_threshold = 0.2;
    ground(&mut space);
    let (body_id, _) = ball(&mut space, 0.0, 0.5);

    for _ in 0..180 {
        space.step(DT);
    }
    assert!(
        space.body(body_id).expect("body exists").is_sleeping(),
        "ball should fall asleep on the ground"
    );

    // Setting gravity to its current value still wakes everything.
    let gravity = space.gravity();
    space.set_gravity(gravity);
    assert!(!space.body(body_id).expect("body exists").is_sleeping());
}

#[test]
fn each_body_visits_dynamic_then_static_then_sleeping() {
    let mut space = Space::new();
    space.set_gravity(Vec2::new(0.0, -10.0));
    space.sleep_time_threshold = 0.2;
    ground(&mut space);

    let (sleeper, _) = ball(&mut space, 0.0, 0.5);
    for _ in 0..180 {
        space.step(DT);
    }
    assert!(space.body(sleeper).expect("exists").is_sleeping());

    let (awake, _) = ball(&mut space, 10.0, 5.0);
    let rock = space.add_body(Body::new_static());

    let mut order = Vec::new();
    space.each_body(|id, _| order.push(id));
    assert_eq!(order, vec![awake, rock, sleeper]);
}

#[test]
fn use_spatial_hash_migrates_all_shapes() {
    let mut space = Space::new();
    ground(&mut space);
    let (_, shape_id) = ball(&mut space, 0.0, 0.5);

    let before = shape_count(&mut space);
    space.use_spatial_hash(2.0, 1024);
    assert_eq!(shape_count(&mut space), before);

    let hit = space.point_query_nearest(Vec2::new(0.0, 0.5), 1.0, ShapeFilter::default());
    assert_eq!(hit.shape, Some(shape_id));
}

#[test]
fn deactivate_then_activate_preserves_contact_impulses() {
    let mut space = Space::new();
    space.set_gravity(Vec2::new(0.0, -10.0));
    space.sleep_time_threshold = 100.0; // enabled, but far away
    ground(&mut space);
    let (body_id, _) = ball(&mut space, 0.0, 0.6);

    for _ in 0..120 {
        space.step(DT);
    }

    let mut impulses_before = Vec::new();
    space.each_arbiter(|id, _| {
        for contact in space.arbiter_contacts(id) {
            impulses_before.push((contact.jn_acc.to_bits(), contact.jt_acc.to_bits()));
        }
    });
    assert!(!impulses_before.is_empty(), "ball should be resting on a contact");

    space.deactivate(body_id);
    assert!(space.body(body_id).expect("exists").is_sleeping());
    assert_eq!(space.arbiter_count(), 0);

    space.activate(body_id);
    assert!(!space.body(body_id).expect("exists").is_sleeping());

    let mut impulses_after = Vec::new();
    space.each_arbiter(|id, _| {
        for contact in space.arbiter_contacts(id) {
            impulses_after.push((contact.jn_acc.to_bits(), contact.jt_acc.to_bits()));
        }
    });
    assert_eq!(impulses_before, impulses_after, "impulses must survive the round trip bit-identically");
}

#[test]
#[should_panic(expected = "at least 1")]
fn zero_iterations_is_rejected() {
    let mut space = Space::new();
    space.set_iterations(0);
}

#[test]
#[should_panic(expected = "damping must be in")]
fn zero_damping_is_rejected() {
    let mut space = Space::new();
    space.set_damping(0.0);
}

#[test]
#[should_panic(expected = "non-dynamic body")]
fn activating_a_static_body_is_an_error() {
    let mut space = Space::new();
    let rock = space.add_body(Body::new_static());
    space.activate(rock);
}

#[test]
#[should_panic(expected = "sleeping is not enabled")]
fn deactivate_requires_sleeping_enabled() {
    let mut space = Space::new();
    let (body_id, _) = ball(&mut space, 0.0, 5.0);
    space.deactivate(body_id);
}

#[test]
#[should_panic(expected = "two different bodies")]
fn self_constraints_are_rejected() {
    let mut space = Space::new();
    let (a, _) = ball(&mut space, 0.0, 5.0);
    let spring = DampedSpring::new(Vec2::ZERO, Vec2::ZERO, 1.0, 1.0, 0.1);
    space.add_constraint(Constraint::new(a, a, Box::new(spring)));
}
