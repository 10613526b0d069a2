use glam::Vec2;

use crate::core::body::{apply_impulses, k_scalar, normal_relative_velocity, Body};
use crate::core::math;
use crate::dynamics::constraint::ConstraintKind;

/// A spring with velocity damping between two anchor points.
///
/// The spring force is applied directly during pre-step; the per-iteration
/// solve only removes relative velocity along the axis, so the spring never
/// fights the contact solver.
pub struct DampedSpring {
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,

    r1: Vec2,
    r2: Vec2,
    n: Vec2,
    n_mass: f32,
    target_vrn: f32,
    v_coef: f32,
}

impl DampedSpring {
    pub fn new(
        anchor_a: Vec2,
        anchor_b: Vec2,
        rest_length: f32,
        stiffness: f32,
        damping: f32,
    ) -> Self {
        Self {
            anchor_a,
            anchor_b,
            rest_length,
            stiffness,
            damping,
            r1: Vec2::ZERO,
            r2: Vec2::ZERO,
            n: Vec2::ZERO,
            n_mass: 0.0,
            target_vrn: 0.0,
            v_coef: 0.0,
        }
    }
}

impl ConstraintKind for DampedSpring {
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

        let k = k_scalar(a, b, self.r1, self.r2, self.n);
        assert!(k != 0.0, "spring connects two unmoving bodies");
        self.n_mass = 1.0 / k;

        self.target_vrn = 0.0;
        self.v_coef = 1.0 - (-self.damping * dt * k).exp();

        // Apply the spring force as an impulse over this step.
        let f_spring = (self.rest_length - dist) * self.stiffness;
        apply_impulses(a, b, self.r1, self.r2, self.n * (f_spring * dt));
    }

    fn apply_cached_impulse(&mut self, _a: &mut Body, _b: &mut Body, _dt_coef: f32) {
        // The spring force is recomputed every step; nothing to warm-start.
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, _dt: f32) {
        let vrn = normal_relative_velocity(a, b, self.r1, self.r2, self.n);

        let v_damp = (self.target_vrn - vrn) * self.v_coef;
        self.target_vrn = vrn + v_damp;

        apply_impulses(a, b, self.r1, self.r2, self.n * (v_damp * self.n_mass));
    }
}
