use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::arbiter::ArbiterId;
use crate::core::math;
use crate::core::shape::ShapeId;
use crate::dynamics::constraint::ConstraintId;
use crate::utils::allocator::Handle;

pub type BodyId = Handle<Body>;

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Simulated mass responding to forces, collisions and constraints.
    Dynamic,
    /// Infinite mass moved by externally driven velocity. Never sleeps and
    /// keeps everything it touches awake.
    Kinematic,
    /// Infinite mass, zero velocity. Conceptually always asleep.
    Static,
}

/// Integrates a body's velocity from gravity, damping and accumulated forces.
pub type VelocityFn = fn(&mut Body, Vec2, f32, f32);

/// Integrates a body's position from its velocity.
pub type PositionFn = fn(&mut Body, f32);

/// A simulated rigid body.
///
/// Bodies are owned by a [`Space`](crate::space::Space) arena; edges of the
/// contact graph (arbiters and constraints) are threaded through intrusive
/// id-based lists so sleep and wake transitions unlink them in O(1).
pub struct Body {
    pub(crate) body_type: BodyType,

    pub(crate) mass: f32,
    pub(crate) inverse_mass: f32,
    pub(crate) moment: f32,
    pub(crate) inverse_moment: f32,

    pub(crate) position: Vec2,
    pub velocity: Vec2,
    pub force: Vec2,

    pub(crate) angle: f32,
    pub angular_velocity: f32,
    pub torque: f32,
    /// Unit vector form of `angle`, cached for shape transforms.
    pub(crate) rotation: Vec2,

    // Pseudo-velocities accumulated by the position-correction bias; consumed
    // and cleared during position integration.
    pub(crate) v_bias: Vec2,
    pub(crate) w_bias: f32,

    pub velocity_func: VelocityFn,
    pub position_func: PositionFn,

    pub(crate) shapes: Vec<ShapeId>,
    pub(crate) arbiter_list: Option<ArbiterId>,
    pub(crate) constraint_list: Option<ConstraintId>,

    pub(crate) sleeping_root: Option<BodyId>,
    pub(crate) sleeping_next: Option<BodyId>,
    pub(crate) sleeping_idle_time: f32,
}

impl Body {
    /// Creates a dynamic body with the given mass and moment of inertia.
    pub fn new(mass: f32, moment: f32) -> Self {
        let mut body = Self::raw(BodyType::Dynamic);
        body.set_mass(mass);
        body.set_moment(moment);
        body
    }

    /// Creates a kinematic body: infinite mass, externally driven velocity.
    pub fn new_kinematic() -> Self {
        Self::raw(BodyType::Kinematic)
    }

    /// Creates a static body.
    pub fn new_static() -> Self {
        Self::raw(BodyType::Static)
    }

    fn raw(body_type: BodyType) -> Self {
        Self {
            body_type,
            mass: f32::INFINITY,
            inverse_mass: 0.0,
            moment: f32::INFINITY,
            inverse_moment: 0.0,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            force: Vec2::ZERO,
            angle: 0.0,
            angular_velocity: 0.0,
            torque: 0.0,
            rotation: Vec2::X,
            v_bias: Vec2::ZERO,
            w_bias: 0.0,
            velocity_func: update_velocity,
            position_func: update_position,
            shapes: Vec::new(),
            arbiter_list: None,
            constraint_list: None,
            sleeping_root: None,
            sleeping_next: None,
            sleeping_idle_time: 0.0,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn set_mass(&mut self, mass: f32) {
        assert!(
            self.body_type == BodyType::Dynamic,
            "only dynamic bodies have finite mass"
        );
        assert!(
            mass > 0.0 && mass.is_finite(),
            "mass must be positive and finite"
        );
        self.mass = mass;
        self.inverse_mass = 1.0 / mass;
    }

    pub fn moment(&self) -> f32 {
        self.moment
    }

    pub fn set_moment(&mut self, moment: f32) {
        assert!(
            self.body_type == BodyType::Dynamic,
            "only dynamic bodies have a finite moment"
        );
        assert!(
            moment > 0.0 && moment.is_finite(),
            "moment must be positive and finite"
        );
        self.moment = moment;
        self.inverse_moment = 1.0 / moment;
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Moves the body. Static bodies must be reindexed afterwards
    /// ([`Space::reindex_shapes_for_body`](crate::space::Space::reindex_shapes_for_body)).
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
        self.rotation = Vec2::from_angle(angle);
    }

    /// Unit rotation vector `(cos angle, sin angle)`.
    pub fn rotation(&self) -> Vec2 {
        self.rotation
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping_root.is_some()
    }

    pub fn idle_time(&self) -> f32 {
        self.sleeping_idle_time
    }

    pub fn local_to_world(&self, point: Vec2) -> Vec2 {
        self.position + math::rotate(point, self.rotation)
    }

    pub fn world_to_local(&self, point: Vec2) -> Vec2 {
        math::unrotate(point - self.position, self.rotation)
    }

    pub fn apply_force_at_world_point(&mut self, force: Vec2, point: Vec2) {
        self.force += force;
        self.torque += math::cross(point - self.position, force);
    }

    pub fn apply_force_at_local_point(&mut self, force: Vec2, point: Vec2) {
        self.apply_force_at_world_point(math::rotate(force, self.rotation), self.local_to_world(point));
    }

    pub fn apply_impulse_at_world_point(&mut self, impulse: Vec2, point: Vec2) {
        self.velocity += impulse * self.inverse_mass;
        self.angular_velocity += self.inverse_moment * math::cross(point - self.position, impulse);
    }

    pub fn apply_impulse_at_local_point(&mut self, impulse: Vec2, point: Vec2) {
        self.apply_impulse_at_world_point(
            math::rotate(impulse, self.rotation),
            self.local_to_world(point),
        );
    }

    /// Velocity of the material point of the body at a world-space location.
    pub fn velocity_at_world_point(&self, point: Vec2) -> Vec2 {
        let r = point - self.position;
        self.velocity + math::perp(r) * self.angular_velocity
    }

    /// Kinetic energy, written so infinite-mass bodies at rest stay at zero
    /// instead of producing `inf * 0`.
    pub fn kinetic_energy(&self) -> f32 {
        let vsq = self.velocity.length_squared();
        let wsq = self.angular_velocity * self.angular_velocity;
        let linear = if vsq != 0.0 { vsq * self.mass } else { 0.0 };
        let angular = if wsq != 0.0 { wsq * self.moment } else { 0.0 };
        linear + angular
    }
}

/// Default `velocity_func`: semi-implicit Euler with exponential damping.
pub fn update_velocity(body: &mut Body, gravity: Vec2, damping: f32, dt: f32) {
    // Kinematic bodies keep whatever velocity they were given.
    if body.body_type == BodyType::Kinematic {
        return;
    }

    assert!(
        body.mass > 0.0 && body.moment > 0.0,
        "integrating a dynamic body with non-positive mass or moment"
    );

    body.velocity = body.velocity * damping + (gravity + body.force * body.inverse_mass) * dt;
    body.angular_velocity =
        body.angular_velocity * damping + body.torque * body.inverse_moment * dt;

    body.force = Vec2::ZERO;
    body.torque = 0.0;
}

/// Default `position_func`: advances the transform and consumes the
/// accumulated bias pseudo-velocities.
pub fn update_position(body: &mut Body, dt: f32) {
    body.position += (body.velocity + body.v_bias) * dt;
    body.set_angle(body.angle + (body.angular_velocity + body.w_bias) * dt);

    body.v_bias = Vec2::ZERO;
    body.w_bias = 0.0;
}

/// Denominator of the impulse along `n` for the anchor offsets `r1`/`r2`.
#[inline]
pub(crate) fn k_scalar(a: &Body, b: &Body, r1: Vec2, r2: Vec2, n: Vec2) -> f32 {
    let rcn_a = math::cross(r1, n);
    let rcn_b = math::cross(r2, n);
    a.inverse_mass
        + b.inverse_mass
        + a.inverse_moment * rcn_a * rcn_a
        + b.inverse_moment * rcn_b * rcn_b
}

#[inline]
pub(crate) fn relative_velocity(a: &Body, b: &Body, r1: Vec2, r2: Vec2) -> Vec2 {
    (b.velocity + math::perp(r2) * b.angular_velocity)
        - (a.velocity + math::perp(r1) * a.angular_velocity)
}

#[inline]
pub(crate) fn normal_relative_velocity(a: &Body, b: &Body, r1: Vec2, r2: Vec2, n: Vec2) -> f32 {
    relative_velocity(a, b, r1, r2).dot(n)
}

/// Applies `j` to `b` and `-j` to `a` at the given anchor offsets.
#[inline]
pub(crate) fn apply_impulses(a: &mut Body, b: &mut Body, r1: Vec2, r2: Vec2, j: Vec2) {
    a.velocity -= j * a.inverse_mass;
    a.angular_velocity -= a.inverse_moment * math::cross(r1, j);
    b.velocity += j * b.inverse_mass;
    b.angular_velocity += b.inverse_moment * math::cross(r2, j);
}

/// Bias-impulse twin of [`apply_impulses`], feeding the pseudo-velocities.
#[inline]
pub(crate) fn apply_bias_impulses(a: &mut Body, b: &mut Body, r1: Vec2, r2: Vec2, j: Vec2) {
    a.v_bias -= j * a.inverse_mass;
    a.w_bias -= a.inverse_moment * math::cross(r1, j);
    b.v_bias += j * b.inverse_mass;
    b.w_bias += b.inverse_moment * math::cross(r2, j);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_integration_applies_gravity_then_moves() {
        let mut body = Body::new(2.0, 1.0);
        update_velocity(&mut body, Vec2::new(0.0, -10.0), 1.0, 0.5);
        assert!((body.velocity.y + 5.0).abs() < 1e-6);

        update_position(&mut body, 0.5);
        assert!((body.position.y + 2.5).abs() < 1e-6);
    }

    #[test]
    fn kinematic_bodies_ignore_gravity() {
        let mut body = Body::new_kinematic();
        body.velocity = Vec2::new(3.0, 0.0);
        update_velocity(&mut body, Vec2::new(0.0, -10.0), 1.0, 1.0);
        assert_eq!(body.velocity, Vec2::new(3.0, 0.0));
    }

    #[test]
    fn kinetic_energy_of_resting_infinite_mass_is_zero() {
        let body = Body::new_static();
        assert_eq!(body.kinetic_energy(), 0.0);
    }

    #[test]
    fn impulses_spin_offset_bodies() {
        let mut body = Body::new(1.0, 2.0);
        body.apply_impulse_at_world_point(Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0));
        assert!((body.velocity.y - 1.0).abs() < 1e-6);
        assert!((body.angular_velocity - 0.5).abs() < 1e-6);
    }
}
