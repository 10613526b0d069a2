use glam::Vec2;

use crate::core::body::{apply_impulses, k_scalar, normal_relative_velocity, Body};
use crate::core::math;
use crate::dynamics::constraint::ConstraintKind;

/// Holds two anchor points at a fixed distance, solved with a warm-started
/// impulse along the anchor axis.
pub struct PinJoint {
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    /// Target distance; captured from the anchors' world positions at
    /// construction time unless overridden.
    pub dist: f32,

    pub max_force: f32,
    /// Fraction of positional error left unresolved after one second.
    pub error_bias: f32,
    pub max_bias: f32,

    r1: Vec2,
    r2: Vec2,
    n: Vec2,
    n_mass: f32,
    jn_acc: f32,
    bias: f32,
}

impl PinJoint {
    /// `dist` is measured between the world positions of the anchors on the
    /// two bodies at creation time.
    pub fn new(a: &Body, b: &Body, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        let world_a = a.local_to_world(anchor_a);
        let world_b = b.local_to_world(anchor_b);
        let dist = (world_b - world_a).length();

        if dist <= 0.0 {
            log::warn!("pin joint created with coincident anchors; it will be unstable");
        }

        Self {
            anchor_a,
            anchor_b,
            dist,
            max_force: f32::INFINITY,
            error_bias: (1.0f32 - 0.1).powi(60),
            max_bias: f32::INFINITY,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            n: Vec2::ZERO,
            n_mass: 0.0,
            jn_acc: 0.0,
            bias: 0.0,
        }
    }

    /// Impulse applied by the joint in the last solve.
    pub fn impulse(&self) -> f32 {
        self.jn_acc
    }
}

impl ConstraintKind for PinJoint {
    fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f32) {
        self.r1 = math::rotate(self.anchor_a, a.rotation());
        self.r2 = math::rotate(self.anchor_b, b.rotation());

        let delta = (b.position() + self.r2) - (a.position() + self.r1);
        let dist = delta.length();
        self.n = if dist > f32::EPSILON {
            delta / dist
        } else {
            Vec2::ZERO
        };

        self.n_mass = 1.0 / k_scalar(a, b, self.r1, self.r2, self.n);

        let max_bias = self.max_bias;
        let bias_coef = 1.0 - self.error_bias.powf(dt);
        self.bias = (-bias_coef * (dist - self.dist) / dt).clamp(-max_bias, max_bias);
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f32) {
        apply_impulses(a, b, self.r1, self.r2, self.n * (self.jn_acc * dt_coef));
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f32) {
        let vrn = normal_relative_velocity(a, b, self.r1, self.r2, self.n);

        let jn_max = self.max_force * dt;
        let jn = (self.bias - vrn) * self.n_mass;
        let jn_old = self.jn_acc;
        self.jn_acc = (jn_old + jn).clamp(-jn_max, jn_max);

        apply_impulses(a, b, self.r1, self.r2, self.n * (self.jn_acc - jn_old));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_pulls_separating_bodies_back_together() {
        let mut a = Body::new(1.0, 1.0);
        let mut b = Body::new(1.0, 1.0);
        b.set_position(Vec2::new(2.0, 0.0));

        let mut joint = PinJoint::new(&a, &b, Vec2::ZERO, Vec2::ZERO);
        assert!((joint.dist - 2.0).abs() < 1e-6);

        // Move the endpoints apart and let the joint react.
        b.velocity = Vec2::new(1.0, 0.0);
        let dt = 1.0 / 60.0;
        joint.pre_step(&mut a, &mut b, dt);
        joint.apply_cached_impulse(&mut a, &mut b, 0.0);
        for _ in 0..10 {
            joint.apply_impulse(&mut a, &mut b, dt);
        }

        let relative = (b.velocity - a.velocity).dot(Vec2::X);
        assert!(
            relative.abs() < 1e-3,
            "joint should cancel separating velocity, got {relative}"
        );
        assert!(joint.impulse() != 0.0);
    }
}
