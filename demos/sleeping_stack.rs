use tumble::*;

fn main() {
    env_logger::init();

    let mut space = Space::new();
    space.set_gravity(Vec2::new(0.0, -10.0));
    space.sleep_time_threshold = 0.5;

    let mut floor = Shape::segment(
        space.static_body(),
        Vec2::new(-10.0, 0.0),
        Vec2::new(10.0, 0.0),
        0.0,
    );
    floor.friction = 1.0;
    space.add_shape(floor);

    let mut stack = Vec::new();
    for i in 0..3 {
        let mut body = Body::new(1.0, moment_for_circle(1.0, 0.0, 0.5, Vec2::ZERO));
        body.set_position(Vec2::new(0.0, 0.5 + i as f32));
        let body_id = space.add_body(body);
        let mut shape = Shape::circle(body_id, 0.5, Vec2::ZERO);
        shape.friction = 1.0;
        space.add_shape(shape);
        stack.push(body_id);
    }

    for frame in 0..600 {
        space.step(1.0 / 60.0);

        let asleep = stack
            .iter()
            .filter(|&&id| space.body(id).expect("ball exists").is_sleeping())
            .count();
        if frame % 60 == 0 || asleep == stack.len() {
            println!(
                "t = {:4.2}s  sleeping {}/{}  islands: {:?}",
                frame as f32 / 60.0,
                asleep,
                stack.len(),
                space.sleeping_islands().iter().map(Vec::len).collect::<Vec<_>>()
            );
        }
        if asleep == stack.len() {
            println!("stack fell asleep; nudging the bottom ball");
            space.activate(stack[0]);
            let body = space.body_mut(stack[0]).expect("ball exists");
            body.velocity = Vec2::new(2.0, 0.0);
            break;
        }
    }
}
