use glam::Vec2;

/// A single contact point between two shapes.
///
/// Fresh contacts live in the shared
/// [`ContactBufferRing`](crate::collision::contact_buffer::ContactBufferRing);
/// the solver fields are filled in during the arbiter pre-step, and the
/// accumulated impulses survive into the next frame for warm-starting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Contact {
    /// Contact position in world space.
    pub point: Vec2,
    /// Contact normal, pointing from the first shape toward the second.
    pub normal: Vec2,
    /// Separation along the normal; negative while penetrating.
    pub dist: f32,

    // Anchor offsets from each body's position, set during pre-step.
    pub(crate) r1: Vec2,
    pub(crate) r2: Vec2,
    pub(crate) n_mass: f32,
    pub(crate) t_mass: f32,
    pub(crate) bounce: f32,
    pub(crate) bias: f32,

    /// Accumulated normal impulse.
    pub jn_acc: f32,
    /// Accumulated tangent (friction) impulse.
    pub jt_acc: f32,
    pub(crate) j_bias: f32,

    /// Feature id used to match this contact against last frame's set when
    /// warm-starting.
    pub hash: u32,
}

impl Contact {
    pub(crate) fn new(point: Vec2, normal: Vec2, dist: f32, hash: u32) -> Self {
        Self {
            point,
            normal,
            dist,
            hash,
            ..Self::default()
        }
    }
}
