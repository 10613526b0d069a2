//! tumble – a 2D rigid body physics engine core.
//!
//! The crate is built around a [`Space`]: add bodies, attach shapes, then
//! call [`Space::step`] at a fixed rate. Contacts are resolved with a
//! persistent, warm-started impulse solver; connected islands of idle bodies
//! are put to sleep and woken through the contact graph.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod space;
pub mod utils;

pub use glam::Vec2;

pub use crate::collision::arbiter::{Arbiter, ArbiterId, ArbiterState};
pub use crate::collision::contact::Contact;
pub use crate::collision::handler::{
    CollisionBeginFn, CollisionHandler, CollisionPostSolveFn, CollisionPreSolveFn,
    CollisionSeparateFn, CollisionType,
};
pub use crate::collision::spatial_index::{ShapeList, SpatialHashGrid, SpatialIndex};
pub use crate::config::WILDCARD_COLLISION_TYPE;
pub use crate::core::body::{Body, BodyId, BodyType};
pub use crate::core::math::Aabb;
pub use crate::core::shape::{
    area_for_circle, moment_for_circle, moment_for_segment, PointQueryInfo, SegmentQueryInfo,
    Shape, ShapeFilter, ShapeGeometry, ShapeId,
};
pub use crate::dynamics::constraint::{Constraint, ConstraintId, ConstraintKind, ConstraintSolveFn};
pub use crate::dynamics::damped_spring::DampedSpring;
pub use crate::dynamics::pin_joint::PinJoint;
pub use crate::space::Space;
