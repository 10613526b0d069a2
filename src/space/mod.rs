mod component;
mod query;
mod step;

use std::collections::HashMap;
use std::mem;

use glam::Vec2;

use crate::collision::arbiter::{self, Arbiter, ArbiterId, ArbiterPool, ArbiterState, ContactStorage};
use crate::collision::contact::Contact;
use crate::collision::contact_buffer::ContactBufferRing;
use crate::collision::handler::{CollisionHandler, CollisionType, HandlerRegistry};
use crate::collision::spatial_index::{SpatialHashGrid, SpatialIndex};
use crate::config::{DEFAULT_COLLISION_BIAS, DEFAULT_COLLISION_PERSISTENCE, DEFAULT_COLLISION_SLOP, DEFAULT_GRID_CELL_SIZE, DEFAULT_ITERATIONS};
use crate::core::body::{Body, BodyId, BodyType};
use crate::core::shape::{Shape, ShapeId};
use crate::dynamics::constraint::{Constraint, ConstraintId};
use crate::utils::allocator::Arena;

/// Unordered pair of shape hash ids keying the arbiter cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ShapePair(u32, u32);

impl ShapePair {
    pub(crate) fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

struct PostStepCallback {
    key: u64,
    func: fn(&mut Space, u64),
}

/// The root simulation aggregate: bodies, shapes, constraints, the arbiter
/// cache, both spatial indices, and the step pipeline that ties them
/// together.
///
/// A space is strictly single-threaded. During a step (or a callback-driven
/// query) the space is *locked*: structural mutation halts with a diagnostic,
/// and [`activate`](Space::activate) defers the list surgery until the lock
/// releases.
pub struct Space {
    iterations: u32,
    gravity: Vec2,
    damping: f32,

    /// Speed below which a body accumulates idle time. Zero derives a
    /// threshold from gravity instead.
    pub idle_speed_threshold: f32,
    /// Idle time after which a whole island may sleep. `INFINITY` disables
    /// sleeping.
    pub sleep_time_threshold: f32,
    /// Penetration depth tolerated before position correction kicks in.
    pub collision_slop: f32,
    /// Fraction of penetration left unresolved after one second.
    pub collision_bias: f32,
    /// Frames a contact survives after its pair was last observed.
    pub collision_persistence: u32,

    pub(crate) stamp: u32,
    curr_dt: f32,

    pub(crate) bodies: Arena<Body>,
    pub(crate) shapes: Arena<Shape>,
    pub(crate) constraints: Arena<Constraint>,
    pub(crate) arbiters: Arena<Arbiter>,

    pub(crate) dynamic_bodies: Vec<BodyId>,
    pub(crate) static_bodies: Vec<BodyId>,
    pub(crate) roused_bodies: Vec<BodyId>,
    pub(crate) sleeping_components: Vec<BodyId>,

    shape_id_counter: u32,
    pub(crate) static_shapes: Box<dyn SpatialIndex>,
    pub(crate) dynamic_shapes: Box<dyn SpatialIndex>,

    pub(crate) active_constraints: Vec<ConstraintId>,
    pub(crate) active_arbiters: Vec<ArbiterId>,

    pub(crate) contact_ring: ContactBufferRing,
    pub(crate) cached_arbiters: HashMap<ShapePair, ArbiterId>,
    pub(crate) arbiter_pool: ArbiterPool,
    pub(crate) handlers: HandlerRegistry,

    locked: i32,
    post_step_callbacks: Vec<PostStepCallback>,
    skip_post_step: bool,

    static_body: BodyId,
}

impl Default for Space {
    fn default() -> Self {
        Self::new()
    }
}

impl Space {
    pub fn new() -> Self {
        let mut bodies = Arena::new();
        let static_body = bodies.insert(Body::new_static());

        Self {
            iterations: DEFAULT_ITERATIONS,
            gravity: Vec2::ZERO,
            damping: 1.0,
            idle_speed_threshold: 0.0,
            sleep_time_threshold: f32::INFINITY,
            collision_slop: DEFAULT_COLLISION_SLOP,
            collision_bias: DEFAULT_COLLISION_BIAS,
            collision_persistence: DEFAULT_COLLISION_PERSISTENCE,
            stamp: 0,
            curr_dt: 0.0,
            bodies,
            shapes: Arena::new(),
            constraints: Arena::new(),
            arbiters: Arena::new(),
            dynamic_bodies: Vec::new(),
            static_bodies: Vec::new(),
            roused_bodies: Vec::new(),
            sleeping_components: Vec::new(),
            shape_id_counter: 0,
            static_shapes: Box::new(SpatialHashGrid::new(DEFAULT_GRID_CELL_SIZE, 64)),
            dynamic_shapes: Box::new(SpatialHashGrid::new(DEFAULT_GRID_CELL_SIZE, 64)),
            active_constraints: Vec::new(),
            active_arbiters: Vec::new(),
            contact_ring: ContactBufferRing::new(),
            cached_arbiters: HashMap::new(),
            arbiter_pool: ArbiterPool::new(),
            handlers: HandlerRegistry::new(),
            locked: 0,
            post_step_callbacks: Vec::new(),
            skip_post_step: false,
            static_body,
        }
    }

    // ---------------------------------------------------------------------
    // Configuration

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn set_iterations(&mut self, iterations: u32) {
        assert!(iterations >= 1, "iterations must be at least 1");
        self.iterations = iterations;
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    /// Sets gravity and wakes every sleeping island, unconditionally.
    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
        for root in self.sleeping_components.clone() {
            self.activate(root);
        }
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn set_damping(&mut self, damping: f32) {
        assert!(
            damping > 0.0 && damping <= 1.0,
            "damping must be in (0, 1]"
        );
        self.damping = damping;
    }

    /// Frame counter, advanced once per non-empty step.
    pub fn stamp(&self) -> u32 {
        self.stamp
    }

    /// Duration of the step currently being (or last) simulated.
    pub fn current_dt(&self) -> f32 {
        self.curr_dt
    }

    pub(crate) fn set_curr_dt(&mut self, dt: f32) -> f32 {
        let prev = self.curr_dt;
        self.curr_dt = dt;
        prev
    }

    pub fn is_locked(&self) -> bool {
        self.locked > 0
    }

    /// The designated static body owned by this space.
    pub fn static_body(&self) -> BodyId {
        self.static_body
    }

    /// Re-designates the static body. The old one must no longer own shapes.
    pub fn set_static_body(&mut self, body: BodyId) {
        assert!(
            self.bodies[self.static_body].shapes.is_empty(),
            "changing the designated static body while the old one still has shapes attached"
        );
        assert!(
            self.bodies[body].body_type() == BodyType::Static,
            "the designated static body must be static"
        );
        self.static_body = body;
    }

    // ---------------------------------------------------------------------
    // Accessors

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    pub fn shape_mut(&mut self, id: ShapeId) -> Option<&mut Shape> {
        self.shapes.get_mut(id)
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(id)
    }

    pub fn constraint_mut(&mut self, id: ConstraintId) -> Option<&mut Constraint> {
        self.constraints.get_mut(id)
    }

    pub fn arbiter(&self, id: ArbiterId) -> Option<&Arbiter> {
        self.arbiters.get(id)
    }

    pub fn arbiter_mut(&mut self, id: ArbiterId) -> Option<&mut Arbiter> {
        self.arbiters.get_mut(id)
    }

    /// Contacts of an arbiter, wherever they currently live.
    pub fn arbiter_contacts(&self, id: ArbiterId) -> &[Contact] {
        match &self.arbiters[id].contacts {
            ContactStorage::Empty => &[],
            ContactStorage::Buffered { slab, start, count } => {
                self.contact_ring.contacts(*slab, *start, *count)
            }
            ContactStorage::Private(contacts) => contacts,
        }
    }

    /// Sum of the impulses this arbiter applied in the last solve.
    pub fn arbiter_total_impulse(&self, id: ArbiterId) -> Vec2 {
        arbiter::total_impulse(self.arbiter_contacts(id))
    }

    /// Energy dissipated by this arbiter in the last solve.
    pub fn arbiter_total_ke(&self, id: ArbiterId) -> f32 {
        let arb = &self.arbiters[id];
        let e_coef = (1.0 - arb.e) / (1.0 + arb.e);
        self.arbiter_contacts(id).iter().fold(0.0, |sum, con| {
            if con.n_mass == 0.0 || con.t_mass == 0.0 {
                return sum;
            }
            sum + e_coef * con.jn_acc * con.jn_acc / con.n_mass
                + con.jt_acc * con.jt_acc / con.t_mass
        })
    }

    /// Contact normal of the arbiter's first contact, if any.
    pub fn arbiter_normal(&self, id: ArbiterId) -> Option<Vec2> {
        self.arbiter_contacts(id).first().map(|con| con.normal)
    }

    pub fn arbiter_count(&self) -> usize {
        self.active_arbiters.len()
    }

    /// Visits the active arbiters in solve order.
    pub fn each_arbiter<F: FnMut(ArbiterId, &Arbiter)>(&self, mut f: F) {
        for &id in &self.active_arbiters {
            f(id, &self.arbiters[id]);
        }
    }

    /// Sleeping islands, one vector of members per island root.
    pub fn sleeping_islands(&self) -> Vec<Vec<BodyId>> {
        self.sleeping_components
            .iter()
            .map(|&root| {
                let mut island = Vec::new();
                let mut cur = Some(root);
                while let Some(id) = cur {
                    island.push(id);
                    cur = self.bodies[id].sleeping_next;
                }
                island
            })
            .collect()
    }

    // ---------------------------------------------------------------------
    // Membership

    pub(crate) fn assert_unlocked(&self) {
        assert!(
            self.locked == 0,
            "this operation cannot be done safely during a step or query; \
             use a post-step callback instead"
        );
    }

    pub fn add_body(&mut self, body: Body) -> BodyId {
        self.assert_unlocked();
        let body_type = body.body_type();
        let id = self.bodies.insert(body);
        if body_type == BodyType::Static {
            self.static_bodies.push(id);
        } else {
            self.dynamic_bodies.push(id);
        }
        id
    }

    pub fn remove_body(&mut self, id: BodyId) -> Body {
        self.assert_unlocked();
        assert!(self.bodies.contains(id), "body is not part of this space");
        assert!(
            id != self.static_body,
            "the designated static body cannot be removed"
        );

        if self.bodies[id].body_type() == BodyType::Dynamic {
            self.activate(id);
        }

        assert!(
            self.bodies[id].shapes.is_empty(),
            "remove the body's shapes before removing the body"
        );
        assert!(
            self.bodies[id].constraint_list.is_none(),
            "remove the body's constraints before removing the body"
        );

        let list = if self.bodies[id].body_type() == BodyType::Static {
            &mut self.static_bodies
        } else {
            &mut self.dynamic_bodies
        };
        if let Some(pos) = list.iter().position(|&b| b == id) {
            list.remove(pos);
        }

        self.bodies
            .remove(id)
            .expect("body presence was just asserted")
    }

    pub fn contains_body(&self, id: BodyId) -> bool {
        self.bodies.contains(id)
    }

    pub fn add_shape(&mut self, shape: Shape) -> ShapeId {
        self.assert_unlocked();
        let body_id = shape.body();
        assert!(
            self.bodies.contains(body_id),
            "the shape's body is not part of this space"
        );

        let body_type = self.bodies[body_id].body_type();
        if body_type == BodyType::Dynamic {
            self.activate(body_id);
        }

        let mut shape = shape;
        shape.hashid = self.shape_id_counter;
        self.shape_id_counter = self.shape_id_counter.wrapping_add(1);

        let (position, rotation) = {
            let body = &self.bodies[body_id];
            (body.position(), body.rotation())
        };
        let bb = shape.cache_bb(position, rotation);
        let hashid = shape.hashid;

        let id = self.shapes.insert(shape);
        self.bodies[body_id].shapes.push(id);

        if body_type == BodyType::Static {
            self.static_shapes.insert(id, hashid, bb);
        } else {
            self.dynamic_shapes.insert(id, hashid, bb);
        }
        id
    }

    pub fn remove_shape(&mut self, id: ShapeId) -> Shape {
        self.assert_unlocked();
        assert!(self.shapes.contains(id), "shape is not part of this space");

        let body_id = self.shapes[id].body();
        let hashid = self.shapes[id].hashid;

        if self.bodies[body_id].body_type() == BodyType::Dynamic {
            self.activate(body_id);
        }

        self.bodies[body_id].shapes.retain(|&s| s != id);
        self.filter_arbiters(body_id, Some(id));

        if self.dynamic_shapes.contains(id, hashid) {
            self.dynamic_shapes.remove(id, hashid);
        } else {
            self.static_shapes.remove(id, hashid);
        }

        self.shapes
            .remove(id)
            .expect("shape presence was just asserted")
    }

    pub fn contains_shape(&self, id: ShapeId) -> bool {
        self.shapes.contains(id)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> ConstraintId {
        self.assert_unlocked();
        let (a, b) = constraint.bodies();
        assert!(
            self.bodies.contains(a) && self.bodies.contains(b),
            "a constraint endpoint is not part of this space"
        );

        if self.bodies[a].body_type() == BodyType::Dynamic {
            self.activate(a);
        }
        if self.bodies[b].body_type() == BodyType::Dynamic {
            self.activate(b);
        }

        let id = self.constraints.insert(constraint);
        self.active_constraints.push(id);

        // Push onto the heads of both bodies' constraint lists.
        let next_a = self.bodies[a].constraint_list;
        let next_b = self.bodies[b].constraint_list;
        {
            let c = &mut self.constraints[id];
            c.next_a = next_a;
            c.next_b = next_b;
        }
        self.bodies[a].constraint_list = Some(id);
        self.bodies[b].constraint_list = Some(id);

        id
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Constraint {
        self.assert_unlocked();
        assert!(
            self.constraints.contains(id),
            "constraint is not part of this space"
        );

        let (a, b) = self.constraints[id].bodies();
        if self.bodies[a].body_type() == BodyType::Dynamic {
            self.activate(a);
        }
        if self.bodies[b].body_type() == BodyType::Dynamic {
            self.activate(b);
        }

        if let Some(pos) = self.active_constraints.iter().position(|&c| c == id) {
            self.active_constraints.remove(pos);
        }

        self.unlink_constraint(a, id);
        self.unlink_constraint(b, id);

        self.constraints
            .remove(id)
            .expect("constraint presence was just asserted")
    }

    pub fn contains_constraint(&self, id: ConstraintId) -> bool {
        self.constraints.contains(id)
    }

    /// Removes `id` from `body`'s singly-linked constraint list, stopping at
    /// the first match (the list holds each constraint at most once).
    fn unlink_constraint(&mut self, body: BodyId, id: ConstraintId) {
        let mut prev: Option<ConstraintId> = None;
        let mut cur = self.bodies[body].constraint_list;
        while let Some(c) = cur {
            let next = self.constraints[c].next(body);
            if c == id {
                match prev {
                    Some(p) => self.constraints[p].set_next(body, next),
                    None => self.bodies[body].constraint_list = next,
                }
                self.constraints[c].set_next(body, None);
                return;
            }
            prev = Some(c);
            cur = next;
        }
    }

    /// Changes a body's type, reclassifying its shapes between the static and
    /// dynamic indices and fixing up the membership lists.
    pub fn set_body_type(&mut self, id: BodyId, body_type: BodyType) {
        self.assert_unlocked();
        let old = self.bodies[id].body_type();
        if old == body_type {
            return;
        }

        if old == BodyType::Dynamic {
            self.activate(id);
        }

        {
            let body = &mut self.bodies[id];
            if body_type != BodyType::Dynamic {
                body.mass = f32::INFINITY;
                body.inverse_mass = 0.0;
                body.moment = f32::INFINITY;
                body.inverse_moment = 0.0;
            }
            if body_type == BodyType::Static {
                body.velocity = Vec2::ZERO;
                body.angular_velocity = 0.0;
            }
            body.body_type = body_type;
        }

        // Membership lists; the designated static body sits in neither.
        let old_list = if old == BodyType::Static {
            &mut self.static_bodies
        } else {
            &mut self.dynamic_bodies
        };
        if let Some(pos) = old_list.iter().position(|&b| b == id) {
            old_list.remove(pos);
            if body_type == BodyType::Static {
                self.static_bodies.push(id);
            } else {
                self.dynamic_bodies.push(id);
            }
        }

        // Index classification only changes across the static boundary.
        if (old == BodyType::Static) != (body_type == BodyType::Static) {
            for shape_id in self.bodies[id].shapes.clone() {
                let hashid = self.shapes[shape_id].hashid;
                let bb = self.shapes[shape_id].bb();
                if body_type == BodyType::Static {
                    self.dynamic_shapes.remove(shape_id, hashid);
                    self.static_shapes.insert(shape_id, hashid, bb);
                } else {
                    self.static_shapes.remove(shape_id, hashid);
                    self.dynamic_shapes.insert(shape_id, hashid, bb);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Spatial index maintenance

    /// Re-caches one shape's world coordinates and updates its index entry.
    pub fn reindex_shape(&mut self, id: ShapeId) {
        self.assert_unlocked();
        let body_id = self.shapes[id].body();
        let (position, rotation) = {
            let body = &self.bodies[body_id];
            (body.position(), body.rotation())
        };
        let bb = self.shapes[id].cache_bb(position, rotation);
        let hashid = self.shapes[id].hashid;
        self.dynamic_shapes.update(id, hashid, bb);
        self.static_shapes.update(id, hashid, bb);
    }

    pub fn reindex_shapes_for_body(&mut self, body: BodyId) {
        for shape_id in self.bodies[body].shapes.clone() {
            self.reindex_shape(shape_id);
        }
    }

    /// Re-caches every shape in the static index; call after moving static
    /// bodies around.
    pub fn reindex_static(&mut self) {
        let mut ids = Vec::new();
        self.static_shapes.each(&mut |s| ids.push(s));
        for id in ids {
            self.reindex_shape(id);
        }
    }

    /// Replaces both spatial indices with hash grids of the given cell size
    /// and table capacity, migrating all shapes.
    pub fn use_spatial_hash(&mut self, dim: f32, count: usize) {
        self.assert_unlocked();

        let mut statics: Box<dyn SpatialIndex> = Box::new(SpatialHashGrid::new(dim, count));
        let mut dynamics: Box<dyn SpatialIndex> = Box::new(SpatialHashGrid::new(dim, count));

        let mut ids = Vec::new();
        self.static_shapes.each(&mut |s| ids.push(s));
        for id in ids {
            let shape = &self.shapes[id];
            statics.insert(id, shape.hashid, shape.bb());
        }

        let mut ids = Vec::new();
        self.dynamic_shapes.each(&mut |s| ids.push(s));
        for id in ids {
            let shape = &self.shapes[id];
            dynamics.insert(id, shape.hashid, shape.bb());
        }

        self.static_shapes = statics;
        self.dynamic_shapes = dynamics;
    }

    // ---------------------------------------------------------------------
    // Iteration

    /// Visits every body: dynamic first, then static, then each sleeping
    /// island in order. Runs under lock.
    pub fn each_body<F: FnMut(BodyId, &Body)>(&mut self, mut f: F) {
        self.lock();

        for id in self.dynamic_bodies.clone() {
            f(id, &self.bodies[id]);
        }
        for id in self.static_bodies.clone() {
            f(id, &self.bodies[id]);
        }
        for root in self.sleeping_components.clone() {
            let mut cur = Some(root);
            while let Some(id) = cur {
                let next = self.bodies[id].sleeping_next;
                f(id, &self.bodies[id]);
                cur = next;
            }
        }

        self.unlock(true);
    }

    /// Visits every shape in both indices. Runs under lock.
    pub fn each_shape<F: FnMut(ShapeId, &Shape)>(&mut self, mut f: F) {
        self.lock();

        let mut ids = Vec::new();
        self.dynamic_shapes.each(&mut |s| ids.push(s));
        self.static_shapes.each(&mut |s| ids.push(s));
        for id in ids {
            f(id, &self.shapes[id]);
        }

        self.unlock(true);
    }

    /// Visits every active constraint. Runs under lock.
    pub fn each_constraint<F: FnMut(ConstraintId, &Constraint)>(&mut self, mut f: F) {
        self.lock();

        for id in self.active_constraints.clone() {
            f(id, &self.constraints[id]);
        }

        self.unlock(true);
    }

    // ---------------------------------------------------------------------
    // Collision handlers

    /// Creates (or returns) the handler for an unordered type pair; mutate
    /// the returned record to install callbacks.
    pub fn new_collision_handler(
        &mut self,
        type_a: CollisionType,
        type_b: CollisionType,
    ) -> &mut CollisionHandler {
        self.handlers.new_pair_handler(type_a, type_b)
    }

    /// Creates (or returns) the wildcard handler for one type, latching the
    /// wildcard-composing default handler.
    pub fn new_wildcard_collision_handler(
        &mut self,
        collision_type: CollisionType,
    ) -> &mut CollisionHandler {
        self.handlers.new_wildcard_handler(collision_type)
    }

    pub fn use_wildcard_default_handler(&mut self) {
        self.handlers.use_wildcard_default();
    }

    pub(crate) fn handler_for_arbiter(&self, id: ArbiterId) -> CollisionHandler {
        let (type_a, type_b) = self.arbiters[id].handler_types;
        self.handlers.lookup(type_a, type_b)
    }

    pub(crate) fn wildcard_handlers_for(
        &self,
        id: ArbiterId,
    ) -> (CollisionHandler, CollisionHandler) {
        let (type_a, type_b) = self.arbiters[id].handler_types;
        (
            self.handlers.lookup_wildcard(type_a),
            self.handlers.lookup_wildcard(type_b),
        )
    }

    // ---------------------------------------------------------------------
    // Lock

    pub(crate) fn lock(&mut self) {
        self.locked += 1;
    }

    pub(crate) fn unlock(&mut self, run_post_step: bool) {
        self.locked -= 1;
        assert!(self.locked >= 0, "space lock underflow");
        if self.locked != 0 {
            return;
        }

        // Deferred activations drain in insertion order.
        let roused = mem::take(&mut self.roused_bodies);
        for body in roused {
            self.activate_body(body);
        }

        if run_post_step && !self.skip_post_step {
            self.skip_post_step = true;
            let callbacks = mem::take(&mut self.post_step_callbacks);
            for callback in callbacks {
                (callback.func)(self, callback.key);
            }
            self.skip_post_step = false;
        }
    }

    /// Schedules `func` to run once the current step finishes, keyed for
    /// deduplication. Returns false when the key is already scheduled.
    pub fn add_post_step_callback(&mut self, key: u64, func: fn(&mut Space, u64)) -> bool {
        if self.post_step_callbacks.iter().any(|cb| cb.key == key) {
            return false;
        }
        if self.locked == 0 {
            log::warn!("post-step callback registered outside a step; it runs after the next one");
        }
        self.post_step_callbacks.push(PostStepCallback { key, func });
        true
    }

    // ---------------------------------------------------------------------
    // Arbiter cache maintenance shared by the removal paths

    pub(crate) fn uncache_arbiter(&mut self, id: ArbiterId) {
        let (a, b) = self.arbiters[id].shapes();
        let key = ShapePair::new(self.shapes[a].hashid, self.shapes[b].hashid);
        self.cached_arbiters.remove(&key);
        if let Some(pos) = self.active_arbiters.iter().position(|&x| x == id) {
            self.active_arbiters.remove(pos);
        }
    }

    /// Evicts every cached arbiter touching `body` (optionally narrowed to
    /// one shape), firing separate callbacks for pairs that were touching.
    pub(crate) fn filter_arbiters(&mut self, body: BodyId, filter_shape: Option<ShapeId>) {
        let entries: Vec<(ShapePair, ArbiterId)> =
            self.cached_arbiters.iter().map(|(&k, &v)| (k, v)).collect();

        for (key, arb_id) in entries {
            let arb = &self.arbiters[arb_id];
            let matches_a = arb.body_a == body
                && (filter_shape == Some(arb.a) || filter_shape.is_none());
            let matches_b = arb.body_b == body
                && (filter_shape == Some(arb.b) || filter_shape.is_none());
            if !matches_a && !matches_b {
                continue;
            }

            // Fire separate for pairs that were actually touching.
            if filter_shape.is_some() && arb.state != ArbiterState::Cached {
                self.arbiters[arb_id].state = ArbiterState::Invalidated;
                let handler = self.handler_for_arbiter(arb_id);
                (handler.separate)(self, arb_id);
            }

            arbiter::unthread(&mut self.arbiters, &mut self.bodies, arb_id);
            if let Some(pos) = self.active_arbiters.iter().position(|&x| x == arb_id) {
                self.active_arbiters.remove(pos);
            }
            self.cached_arbiters.remove(&key);
            if let Some(arb) = self.arbiters.remove(arb_id) {
                self.arbiter_pool.give(arb);
            }
        }
    }
}
