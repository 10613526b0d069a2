use tumble::*;

fn main() {
    env_logger::init();

    let mut space = Space::new();
    space.set_gravity(Vec2::new(0.0, -10.0));

    let mut floor = Shape::segment(
        space.static_body(),
        Vec2::new(-10.0, 0.0),
        Vec2::new(10.0, 0.0),
        0.0,
    );
    floor.friction = 0.8;
    floor.elasticity = 0.4;
    space.add_shape(floor);

    let mut balls = Vec::new();
    for i in 0..5 {
        let mut body = Body::new(1.0, moment_for_circle(1.0, 0.0, 0.5, Vec2::ZERO));
        body.set_position(Vec2::new(i as f32 * 1.2 - 2.4, 4.0 + i as f32));
        let body_id = space.add_body(body);
        let mut shape = Shape::circle(body_id, 0.5, Vec2::ZERO);
        shape.friction = 0.8;
        shape.elasticity = 0.4;
        space.add_shape(shape);
        balls.push(body_id);
    }

    for frame in 0..240 {
        space.step(1.0 / 60.0);
        if frame % 30 == 0 {
            println!("t = {:.2}s", frame as f32 / 60.0);
            for &id in &balls {
                let body = space.body(id).expect("ball exists");
                println!(
                    "  ball at ({:6.2}, {:6.2})  v = ({:6.2}, {:6.2})",
                    body.position().x,
                    body.position().y,
                    body.velocity.x,
                    body.velocity.y
                );
            }
        }
    }
}
