use crate::core::body::{Body, BodyId};
use crate::space::Space;
use crate::utils::allocator::Handle;

pub type ConstraintId = Handle<Constraint>;

/// Per-kind solver hooks invoked by the step pipeline.
///
/// A kind receives both endpoint bodies with the same ordering the
/// constraint was created with; `pre_step` runs once per step before
/// velocity integration, `apply_cached_impulse` warm-starts, and
/// `apply_impulse` runs once per solver iteration.
pub trait ConstraintKind: Send + Sync {
    fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f32);
    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f32);
    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f32);
}

/// User hook run around the solve; receives the space and the constraint id.
pub type ConstraintSolveFn = fn(&mut Space, ConstraintId);

/// A constraint connecting two bodies, delegating its math to a
/// [`ConstraintKind`].
pub struct Constraint {
    pub(crate) a: BodyId,
    pub(crate) b: BodyId,
    // Singly-linked membership in each endpoint's constraint list.
    pub(crate) next_a: Option<ConstraintId>,
    pub(crate) next_b: Option<ConstraintId>,

    /// When false, contact generation between the two endpoint bodies is
    /// suppressed entirely.
    pub collide_bodies: bool,
    pub pre_solve: Option<ConstraintSolveFn>,
    pub post_solve: Option<ConstraintSolveFn>,

    pub(crate) kind: Box<dyn ConstraintKind>,
}

impl Constraint {
    pub fn new(a: BodyId, b: BodyId, kind: Box<dyn ConstraintKind>) -> Self {
        assert!(a != b, "a constraint must connect two different bodies");
        Self {
            a,
            b,
            next_a: None,
            next_b: None,
            collide_bodies: true,
            pre_solve: None,
            post_solve: None,
            kind,
        }
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        (self.a, self.b)
    }

    /// Next constraint in `body`'s membership list.
    pub(crate) fn next(&self, body: BodyId) -> Option<ConstraintId> {
        if body == self.a {
            self.next_a
        } else {
            assert!(body == self.b, "body is not an endpoint of this constraint");
            self.next_b
        }
    }

    pub(crate) fn set_next(&mut self, body: BodyId, next: Option<ConstraintId>) {
        if body == self.a {
            self.next_a = next;
        } else {
            assert!(body == self.b, "body is not an endpoint of this constraint");
            self.next_b = next;
        }
    }

    /// True when this constraint connects exactly the given unordered body
    /// pair.
    pub(crate) fn connects(&self, x: BodyId, y: BodyId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    pub fn kind_mut(&mut self) -> &mut dyn ConstraintKind {
        self.kind.as_mut()
    }
}
