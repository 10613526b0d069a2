use glam::Vec2;

use crate::collision::contact::Contact;
use crate::config::POOLED_ARBITER_CAPACITY;
use crate::core::body::{
    apply_bias_impulses, apply_impulses, k_scalar, normal_relative_velocity, relative_velocity,
    Body, BodyId,
};
use crate::core::math;
use crate::core::shape::ShapeId;
use crate::utils::allocator::{Arena, Handle};

pub type ArbiterId = Handle<Arbiter>;

/// Lifecycle state of a persistent arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    /// The pair started touching this frame; the begin callback fires.
    FirstCollision,
    /// Touching and processed normally.
    Normal,
    /// Rejected by a begin or pre-solve callback; stays rejected until the
    /// shapes separate.
    Ignore,
    /// Not touching this frame, retained for warm-starting within the
    /// persistence window.
    Cached,
    /// One of its shapes or bodies was removed; evicted on sight.
    Invalidated,
}

/// Links an arbiter into one body's contact-graph edge list.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ArbiterThread {
    pub next: Option<ArbiterId>,
    pub prev: Option<ArbiterId>,
}

/// Where an arbiter's contacts currently live.
#[derive(Debug, Clone)]
pub(crate) enum ContactStorage {
    /// No contacts.
    Empty,
    /// A committed range in the shared contact ring. Valid while the slab is
    /// younger than the persistence window; the cache filter evicts the
    /// arbiter before the slab can be recycled underneath it.
    Buffered {
        slab: usize,
        start: usize,
        count: usize,
    },
    /// Private clone taken when the owning bodies went to sleep, so the
    /// cached impulses survive ring recycling.
    Private(Vec<Contact>),
}

impl ContactStorage {
    pub(crate) fn len(&self) -> usize {
        match self {
            ContactStorage::Empty => 0,
            ContactStorage::Buffered { count, .. } => *count,
            ContactStorage::Private(contacts) => contacts.len(),
        }
    }
}

/// Persistent record for an unordered pair of colliding shapes.
///
/// Arbiters carry contact identity across frames: as long as a pair keeps
/// touching, the same arbiter accumulates impulses, which warm-starts the
/// solver and keeps begin/separate callbacks properly paired.
pub struct Arbiter {
    pub(crate) a: ShapeId,
    pub(crate) b: ShapeId,
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,

    /// Combined restitution of the two shapes.
    pub(crate) e: f32,
    /// Combined friction of the two shapes.
    pub(crate) u: f32,
    pub(crate) surface_vr: Vec2,

    pub(crate) contacts: ContactStorage,

    pub(crate) thread_a: ArbiterThread,
    pub(crate) thread_b: ArbiterThread,

    /// Last frame this pair was observed by narrowphase.
    pub(crate) stamp: u32,
    pub(crate) state: ArbiterState,
    /// Collision types of (a, b) at the last update; handler records are
    /// resolved from these at dispatch time so user mutation of a handler is
    /// always observed.
    pub(crate) handler_types: (u64, u64),
}

impl Arbiter {
    fn empty() -> Self {
        let null_shape: ShapeId = Handle::new(u32::MAX, u32::MAX);
        let null_body: BodyId = Handle::new(u32::MAX, u32::MAX);
        Self {
            a: null_shape,
            b: null_shape,
            body_a: null_body,
            body_b: null_body,
            e: 0.0,
            u: 0.0,
            surface_vr: Vec2::ZERO,
            contacts: ContactStorage::Empty,
            thread_a: ArbiterThread::default(),
            thread_b: ArbiterThread::default(),
            stamp: 0,
            state: ArbiterState::FirstCollision,
            handler_types: (0, 0),
        }
    }

    fn init(&mut self, a: ShapeId, b: ShapeId, body_a: BodyId, body_b: BodyId) {
        self.a = a;
        self.b = b;
        self.body_a = body_a;
        self.body_b = body_b;
        self.e = 0.0;
        self.u = 0.0;
        self.surface_vr = Vec2::ZERO;
        self.contacts = ContactStorage::Empty;
        self.thread_a = ArbiterThread::default();
        self.thread_b = ArbiterThread::default();
        self.stamp = 0;
        self.state = ArbiterState::FirstCollision;
        self.handler_types = (0, 0);
    }

    pub fn shapes(&self) -> (ShapeId, ShapeId) {
        (self.a, self.b)
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        (self.body_a, self.body_b)
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    /// True during the first frame a pair touches; only meaningful inside
    /// begin and pre-solve callbacks.
    pub fn is_first_contact(&self) -> bool {
        self.state == ArbiterState::FirstCollision
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Rejects this collision until the shapes separate. Callable from begin
    /// and pre-solve callbacks.
    pub fn ignore(&mut self) {
        self.state = ArbiterState::Ignore;
    }

    pub(crate) fn thread_for(&self, body: BodyId) -> &ArbiterThread {
        if body == self.body_a {
            &self.thread_a
        } else {
            assert!(body == self.body_b, "body is not an endpoint of this arbiter");
            &self.thread_b
        }
    }

    pub(crate) fn thread_for_mut(&mut self, body: BodyId) -> &mut ArbiterThread {
        if body == self.body_a {
            &mut self.thread_a
        } else {
            assert!(body == self.body_b, "body is not an endpoint of this arbiter");
            &mut self.thread_b
        }
    }

    /// Next arbiter in `body`'s contact-graph edge list.
    pub(crate) fn next(&self, body: BodyId) -> Option<ArbiterId> {
        self.thread_for(body).next
    }

    /// Transfers a freshly generated contact set in, warm-starting each
    /// contact from last frame's accumulated impulses when its feature hash
    /// matches, and re-binds the shape order and material properties.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn update(
        &mut self,
        a: ShapeId,
        b: ShapeId,
        body_a: BodyId,
        body_b: BodyId,
        elasticity: f32,
        friction: f32,
        surface_vr: Vec2,
        handler_types: (u64, u64),
        storage: ContactStorage,
        old_contacts: &[Contact],
        new_contacts: &mut [Contact],
    ) {
        for contact in new_contacts.iter_mut() {
            contact.jn_acc = 0.0;
            contact.jt_acc = 0.0;
            for old in old_contacts {
                if old.hash == contact.hash {
                    contact.jn_acc = old.jn_acc;
                    contact.jt_acc = old.jt_acc;
                }
            }
        }

        self.a = a;
        self.b = b;
        self.body_a = body_a;
        self.body_b = body_b;
        self.contacts = storage;
        self.e = elasticity;
        self.u = friction;
        self.surface_vr = surface_vr;
        self.handler_types = handler_types;

        // A cached pair that starts touching again counts as a new collision.
        if self.state == ArbiterState::Cached {
            self.state = ArbiterState::FirstCollision;
        }
    }
}

/// Sum of the impulses applied by this arbiter's contacts last solve.
pub(crate) fn total_impulse(contacts: &[Contact]) -> Vec2 {
    contacts.iter().fold(Vec2::ZERO, |sum, con| {
        sum + math::rotate(con.normal, Vec2::new(con.jn_acc, con.jt_acc))
    })
}

/// Fills in the solver fields of each contact for this step.
pub(crate) fn pre_step(
    arb: &Arbiter,
    contacts: &mut [Contact],
    a: &Body,
    b: &Body,
    dt: f32,
    slop: f32,
    bias_coef: f32,
) {
    for con in contacts {
        con.r1 = con.point - a.position();
        con.r2 = con.point - b.position();

        con.n_mass = 1.0 / k_scalar(a, b, con.r1, con.r2, con.normal);
        con.t_mass = 1.0 / k_scalar(a, b, con.r1, con.r2, math::perp(con.normal));

        con.bias = -bias_coef * (con.dist + slop).min(0.0) / dt;
        con.j_bias = 0.0;

        con.bounce = normal_relative_velocity(a, b, con.r1, con.r2, con.normal) * arb.e;
    }
}

/// Re-applies last frame's impulses, scaled by the timestep ratio.
pub(crate) fn apply_cached_impulse(
    contacts: &[Contact],
    a: &mut Body,
    b: &mut Body,
    dt_coef: f32,
) {
    for con in contacts {
        let j = math::rotate(con.normal, Vec2::new(con.jn_acc, con.jt_acc));
        apply_impulses(a, b, con.r1, con.r2, j * dt_coef);
    }
}

/// One velocity-solver iteration over this arbiter's contacts.
pub(crate) fn apply_impulse(arb: &Arbiter, contacts: &mut [Contact], a: &mut Body, b: &mut Body) {
    for con in contacts {
        let n = con.normal;

        // Penetration correction through the bias pseudo-velocities.
        let vb1 = a.v_bias + math::perp(con.r1) * a.w_bias;
        let vb2 = b.v_bias + math::perp(con.r2) * b.w_bias;
        let vbn = (vb2 - vb1).dot(n);

        let jbn = (con.bias - vbn) * con.n_mass;
        let jbn_old = con.j_bias;
        con.j_bias = (jbn_old + jbn).max(0.0);
        apply_bias_impulses(a, b, con.r1, con.r2, n * (con.j_bias - jbn_old));

        // Normal impulse with restitution, clamped to stay repulsive.
        let vrn = normal_relative_velocity(a, b, con.r1, con.r2, n);
        let jn = -(con.bounce + vrn) * con.n_mass;
        let jn_old = con.jn_acc;
        con.jn_acc = (jn_old + jn).max(0.0);

        // Friction impulse clamped to the friction cone.
        let vrt = (relative_velocity(a, b, con.r1, con.r2) + arb.surface_vr).dot(math::perp(n));
        let jt_max = arb.u * con.jn_acc;
        let jt = -vrt * con.t_mass;
        let jt_old = con.jt_acc;
        con.jt_acc = (jt_old + jt).clamp(-jt_max, jt_max);

        apply_impulses(
            a,
            b,
            con.r1,
            con.r2,
            math::rotate(n, Vec2::new(con.jn_acc - jn_old, con.jt_acc - jt_old)),
        );
    }
}

/// Threads `arb_id` onto the head of `body_id`'s edge list.
///
/// Arbiters restored from a sleeping island keep their links, so threading
/// an already-linked arbiter is a no-op rather than a list corruption.
pub(crate) fn push_to_body(
    arbiters: &mut Arena<Arbiter>,
    bodies: &mut Arena<Body>,
    arb_id: ArbiterId,
    body_id: BodyId,
) {
    {
        let thread = arbiters[arb_id].thread_for(body_id);
        if thread.prev.is_some()
            || thread.next.is_some()
            || bodies[body_id].arbiter_list == Some(arb_id)
        {
            return;
        }
    }

    let old_head = bodies[body_id].arbiter_list;
    {
        let thread = arbiters[arb_id].thread_for_mut(body_id);
        thread.prev = None;
        thread.next = old_head;
    }
    if let Some(head) = old_head {
        arbiters[head].thread_for_mut(body_id).prev = Some(arb_id);
    }
    bodies[body_id].arbiter_list = Some(arb_id);
}

fn unthread_side(
    arbiters: &mut Arena<Arbiter>,
    bodies: &mut Arena<Body>,
    arb_id: ArbiterId,
    body_id: BodyId,
) {
    let thread = *arbiters[arb_id].thread_for(body_id);

    // Unthreading an arbiter that is not linked (e.g. one that went stale
    // while awake) is a no-op rather than an error.
    match thread.prev {
        Some(prev) => arbiters[prev].thread_for_mut(body_id).next = thread.next,
        None => {
            if bodies[body_id].arbiter_list == Some(arb_id) {
                bodies[body_id].arbiter_list = thread.next;
            }
        }
    }
    if let Some(next) = thread.next {
        arbiters[next].thread_for_mut(body_id).prev = thread.prev;
    }

    let thread = arbiters[arb_id].thread_for_mut(body_id);
    thread.prev = None;
    thread.next = None;
}

/// Unlinks `arb_id` from both endpoint bodies' edge lists in O(1).
pub(crate) fn unthread(arbiters: &mut Arena<Arbiter>, bodies: &mut Arena<Body>, arb_id: ArbiterId) {
    let (body_a, body_b) = arbiters[arb_id].bodies();
    unthread_side(arbiters, bodies, arb_id, body_a);
    unthread_side(arbiters, bodies, arb_id, body_b);
}

/// Bounded pool of recycled arbiter records; overflow falls through to the
/// allocator.
pub(crate) struct ArbiterPool {
    free: Vec<Arbiter>,
}

impl ArbiterPool {
    pub fn new() -> Self {
        Self {
            free: Vec::with_capacity(POOLED_ARBITER_CAPACITY),
        }
    }

    pub fn take(&mut self, a: ShapeId, b: ShapeId, body_a: BodyId, body_b: BodyId) -> Arbiter {
        let mut arb = self.free.pop().unwrap_or_else(Arbiter::empty);
        arb.init(a, b, body_a, body_b);
        arb
    }

    pub fn give(&mut self, arb: Arbiter) {
        if self.free.len() < POOLED_ARBITER_CAPACITY {
            self.free.push(arb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Arena<Arbiter>, Arena<Body>, ArbiterId, BodyId, BodyId) {
        let mut bodies = Arena::new();
        let body_a = bodies.insert(Body::new(1.0, 1.0));
        let body_b = bodies.insert(Body::new(1.0, 1.0));

        let mut arbiters = Arena::new();
        let mut pool = ArbiterPool::new();
        let arb = pool.take(Handle::new(0, 0), Handle::new(1, 0), body_a, body_b);
        let arb_id = arbiters.insert(arb);
        (arbiters, bodies, arb_id, body_a, body_b)
    }

    #[test]
    fn threading_links_and_unlinks_both_bodies() {
        let (mut arbiters, mut bodies, arb_id, body_a, body_b) = pair();

        push_to_body(&mut arbiters, &mut bodies, arb_id, body_a);
        push_to_body(&mut arbiters, &mut bodies, arb_id, body_b);
        assert_eq!(bodies[body_a].arbiter_list, Some(arb_id));
        assert_eq!(bodies[body_b].arbiter_list, Some(arb_id));

        unthread(&mut arbiters, &mut bodies, arb_id);
        assert_eq!(bodies[body_a].arbiter_list, None);
        assert_eq!(bodies[body_b].arbiter_list, None);
    }

    #[test]
    fn threading_prepends_preserving_earlier_edges() {
        let (mut arbiters, mut bodies, first, body_a, body_b) = pair();
        let second = {
            let mut pool = ArbiterPool::new();
            let arb = pool.take(Handle::new(2, 0), Handle::new(3, 0), body_a, body_b);
            arbiters.insert(arb)
        };

        push_to_body(&mut arbiters, &mut bodies, first, body_a);
        push_to_body(&mut arbiters, &mut bodies, second, body_a);

        assert_eq!(bodies[body_a].arbiter_list, Some(second));
        assert_eq!(arbiters[second].next(body_a), Some(first));
        assert_eq!(arbiters[first].next(body_a), None);

        // Removing a non-head entry keeps the head intact.
        unthread_side(&mut arbiters, &mut bodies, first, body_a);
        assert_eq!(bodies[body_a].arbiter_list, Some(second));
        assert_eq!(arbiters[second].next(body_a), None);
    }

    #[test]
    fn update_matches_warm_start_impulses_by_hash() {
        let (mut arbiters, _bodies, arb_id, body_a, body_b) = pair();

        let mut old = Contact::new(Vec2::ZERO, Vec2::X, -0.1, 7);
        old.jn_acc = 2.5;
        old.jt_acc = -0.5;

        let mut fresh = [Contact::new(Vec2::ZERO, Vec2::X, -0.05, 7)];
        let arb = &mut arbiters[arb_id];
        arb.state = ArbiterState::Cached;
        arb.update(
            Handle::new(0, 0),
            Handle::new(1, 0),
            body_a,
            body_b,
            0.5,
            0.9,
            Vec2::ZERO,
            (0, 0),
            ContactStorage::Empty,
            &[old],
            &mut fresh,
        );

        assert_eq!(fresh[0].jn_acc, 2.5);
        assert_eq!(fresh[0].jt_acc, -0.5);
        assert_eq!(arb.state, ArbiterState::FirstCollision);
        assert_eq!(arb.e, 0.5);
    }

    #[test]
    fn pool_reuses_records_up_to_capacity() {
        let mut pool = ArbiterPool::new();
        let arb = pool.take(Handle::new(0, 0), Handle::new(1, 0), Handle::new(0, 0), Handle::new(1, 0));
        pool.give(arb);
        assert_eq!(pool.free.len(), 1);
    }
}
