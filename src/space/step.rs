use std::mem;

use crate::collision::arbiter::{self, ArbiterId, ArbiterState, ContactStorage};
use crate::collision::contact::Contact;
use crate::collision::narrowphase;
use crate::collision::spatial_index::NullIndex;
use crate::config::MAX_CONTACTS_PER_ARBITER;
use crate::core::body::{BodyId, BodyType};
use crate::core::shape::ShapeId;
use crate::dynamics::constraint::ConstraintId;
use crate::space::{ShapePair, Space};
use crate::utils::logging::PhaseTimer;

impl Space {
    /// Advances the simulation by `dt` seconds. `dt == 0` is a no-op.
    ///
    /// Phase order: integrate positions → broadphase → narrowphase → island
    /// sleep pass → cache filter → pre-step → integrate velocities →
    /// warm-start → impulse iterations → post-solve callbacks. Structural
    /// mutation from inside any callback halts; `activate` defers.
    pub fn step(&mut self, dt: f32) {
        if dt == 0.0 {
            return;
        }
        assert!(dt > 0.0, "time step must be positive");
        let _timer = PhaseTimer::new("step");

        self.stamp = self.stamp.wrapping_add(1);
        let prev_dt = self.set_curr_dt(dt);

        // Reset last frame's arbiters; the sleep pass rebuilds the contact
        // graph, so unthread the ones whose bodies are both awake.
        let last_frame = mem::take(&mut self.active_arbiters);
        for arb_id in last_frame {
            self.arbiters[arb_id].state = ArbiterState::Normal;
            let (a, b) = self.arbiters[arb_id].bodies();
            if !self.bodies[a].is_sleeping() && !self.bodies[b].is_sleeping() {
                arbiter::unthread(&mut self.arbiters, &mut self.bodies, arb_id);
            }
        }

        self.lock();
        {
            let _timer = PhaseTimer::new("integrate+broadphase");

            // Integrate positions, in list order.
            for body_id in self.dynamic_bodies.clone() {
                let body = &mut self.bodies[body_id];
                let integrate = body.position_func;
                integrate(body, dt);
            }

            self.contact_ring
                .push_fresh(self.stamp, self.collision_persistence);
            self.update_dynamic_bbs();
            self.run_broadphase();
        }
        self.unlock(false);

        // Rebuild the contact graph and put idle islands to sleep.
        self.process_components(dt);

        self.lock();
        {
            let _timer = PhaseTimer::new("solve");

            self.filter_cached_arbiters();

            let arbiters_list = self.active_arbiters.clone();
            let constraints_list = self.active_constraints.clone();

            // Pre-step.
            let slop = self.collision_slop;
            let bias_coef = 1.0 - self.collision_bias.powf(dt);
            for &arb_id in &arbiters_list {
                self.pre_step_arbiter(arb_id, dt, slop, bias_coef);
            }
            for &c_id in &constraints_list {
                if let Some(pre_solve) = self.constraints[c_id].pre_solve {
                    pre_solve(self, c_id);
                }
                self.pre_step_constraint(c_id, dt);
            }

            // Integrate velocities.
            let damping = self.damping().powf(dt);
            let gravity = self.gravity();
            for body_id in self.dynamic_bodies.clone() {
                let body = &mut self.bodies[body_id];
                let integrate = body.velocity_func;
                integrate(body, gravity, damping, dt);
            }

            // Warm-start from last frame's impulses.
            let dt_coef = if prev_dt == 0.0 { 0.0 } else { dt / prev_dt };
            for &arb_id in &arbiters_list {
                self.apply_cached_arbiter_impulse(arb_id, dt_coef);
            }
            for &c_id in &constraints_list {
                self.apply_cached_constraint_impulse(c_id, dt_coef);
            }

            // Impulse solver: arbiters before constraints, every iteration.
            for _ in 0..self.iterations() {
                for &arb_id in &arbiters_list {
                    self.apply_arbiter_impulse(arb_id);
                }
                for &c_id in &constraints_list {
                    self.apply_constraint_impulse(c_id, dt);
                }
            }

            // Post-solve callbacks fire after all iterations complete.
            for &c_id in &constraints_list {
                if let Some(post_solve) = self.constraints[c_id].post_solve {
                    post_solve(self, c_id);
                }
            }
            for &arb_id in &arbiters_list {
                let handler = self.handler_for_arbiter(arb_id);
                (handler.post_solve)(self, arb_id);
            }
        }
        self.unlock(true);
    }

    /// Re-caches every dynamic shape's world coordinates and index entry.
    fn update_dynamic_bbs(&mut self) {
        let mut ids = Vec::new();
        self.dynamic_shapes.each(&mut |s| ids.push(s));
        for id in ids {
            let body_id = self.shapes[id].body();
            let (position, rotation) = {
                let body = &self.bodies[body_id];
                (body.position(), body.rotation())
            };
            let bb = self.shapes[id].cache_bb(position, rotation);
            let hashid = self.shapes[id].hashid;
            self.dynamic_shapes.update(id, hashid, bb);
        }
    }

    /// Drives the dynamic index's pair stream through narrowphase. Both
    /// indices are swapped out for the duration, so index-touching calls
    /// from collision callbacks see an empty space.
    fn run_broadphase(&mut self) {
        let mut dynamic_index = mem::replace(&mut self.dynamic_shapes, Box::new(NullIndex));
        let static_index = mem::replace(&mut self.static_shapes, Box::new(NullIndex));

        dynamic_index.reindex_query(Some(static_index.as_ref()), &mut |a, b, collision_id| {
            self.collide_pair(a, b, collision_id)
        });

        self.static_shapes = static_index;
        self.dynamic_shapes = dynamic_index;
    }

    /// Cheap rejections before narrowphase ever runs.
    fn query_reject(&self, a: ShapeId, b: ShapeId) -> bool {
        let sa = &self.shapes[a];
        let sb = &self.shapes[b];

        sa.body() == sb.body()
            || sa.filter.reject(&sb.filter)
            || !sa.bb().intersects(&sb.bb())
            || self.query_reject_constraints(sa.body(), sb.body())
    }

    /// True when a `collide_bodies = false` constraint joins the two bodies.
    fn query_reject_constraints(&self, a: BodyId, b: BodyId) -> bool {
        let mut cur = self.bodies[a].constraint_list;
        while let Some(c_id) = cur {
            let constraint = &self.constraints[c_id];
            if !constraint.collide_bodies && constraint.connects(a, b) {
                return true;
            }
            cur = constraint.next(a);
        }
        false
    }

    /// Narrowphase for one candidate pair: generate contacts, update the
    /// cached arbiter, run begin/pre-solve dispatch, and decide whether the
    /// pair enters the solve list.
    pub(crate) fn collide_pair(&mut self, a: ShapeId, b: ShapeId, collision_id: u32) -> u32 {
        if self.query_reject(a, b) {
            return collision_id;
        }

        let info = {
            let Space {
                contact_ring,
                shapes,
                stamp,
                collision_persistence,
                ..
            } = self;
            let slab = contact_ring.free_slab(*stamp, *collision_persistence);
            narrowphase::collide(&shapes[a], &shapes[b], collision_id, slab)
        };

        if info.count == 0 {
            return info.collision_id;
        }

        let (slab_idx, start) = self.contact_ring.head_mark();
        self.contact_ring.push(info.count);

        // The collide routine may have swapped the pair; its order is
        // authoritative.
        let (shape_a, shape_b) = if info.swapped { (b, a) } else { (a, b) };
        let body_a = self.shapes[shape_a].body();
        let body_b = self.shapes[shape_b].body();

        let key = ShapePair::new(self.shapes[shape_a].hashid, self.shapes[shape_b].hashid);
        let arb_id = match self.cached_arbiters.get(&key) {
            Some(&id) => id,
            None => {
                let arb = self.arbiter_pool.take(shape_a, shape_b, body_a, body_b);
                let id = self.arbiters.insert(arb);
                self.cached_arbiters.insert(key, id);
                id
            }
        };

        // Snapshot last frame's contacts for warm-start matching before the
        // new set replaces them.
        let mut old = [Contact::default(); MAX_CONTACTS_PER_ARBITER];
        let old_count = {
            let contacts = self.arbiter_contacts(arb_id);
            let count = contacts.len().min(MAX_CONTACTS_PER_ARBITER);
            old[..count].copy_from_slice(&contacts[..count]);
            count
        };

        let (elasticity, friction, surface_vr) = {
            let sa = &self.shapes[shape_a];
            let sb = &self.shapes[shape_b];
            (
                sa.elasticity * sb.elasticity,
                sa.friction * sb.friction,
                sb.surface_velocity - sa.surface_velocity,
            )
        };
        let handler_types = (
            self.shapes[shape_a].collision_type,
            self.shapes[shape_b].collision_type,
        );

        {
            let Space {
                contact_ring,
                arbiters,
                ..
            } = self;
            let new_contacts = contact_ring.contacts_mut(slab_idx, start, info.count);
            arbiters[arb_id].update(
                shape_a,
                shape_b,
                body_a,
                body_b,
                elasticity,
                friction,
                surface_vr,
                handler_types,
                ContactStorage::Buffered {
                    slab: slab_idx,
                    start,
                    count: info.count,
                },
                &old[..old_count],
                new_contacts,
            );
        }

        assert!(
            body_a != body_b,
            "internal error: arbiter connects a body to itself"
        );

        let handler = self.handler_for_arbiter(arb_id);
        if self.arbiters[arb_id].state == ArbiterState::FirstCollision
            && !(handler.begin)(self, arb_id)
        {
            self.arbiters[arb_id].ignore();
        }

        let sensor = self.shapes[shape_a].sensor || self.shapes[shape_b].sensor;
        let both_infinite = self.bodies[body_a].mass() == f32::INFINITY
            && self.bodies[body_b].mass() == f32::INFINITY;

        let accepted = self.arbiters[arb_id].state != ArbiterState::Ignore
            && (handler.pre_solve)(self, arb_id)
            // pre-solve may have flagged the arbiter ignored
            && self.arbiters[arb_id].state != ArbiterState::Ignore
            // sensors generate callbacks but never impulses
            && !sensor
            // two infinite-mass bodies exchange no impulses either
            && !both_infinite;

        if accepted {
            self.active_arbiters.push(arb_id);
        } else {
            self.contact_ring.pop(info.count);
            self.arbiters[arb_id].contacts = ContactStorage::Empty;

            // Post-solve never fires for rejected pairs, so don't leave them
            // looking freshly collided; ignored pairs keep their flag.
            if self.arbiters[arb_id].state != ArbiterState::Ignore {
                self.arbiters[arb_id].state = ArbiterState::Normal;
            }
        }

        self.arbiters[arb_id].stamp = self.stamp;
        info.collision_id
    }

    /// Classifies every cached arbiter: keep fresh and sleeping pairs, fire
    /// separate on the ones that just stopped touching, evict the stale.
    pub(crate) fn filter_cached_arbiters(&mut self) {
        let entries: Vec<(ShapePair, ArbiterId)> =
            self.cached_arbiters.iter().map(|(&k, &v)| (k, v)).collect();

        for (key, arb_id) in entries {
            let (body_a, body_b) = self.arbiters[arb_id].bodies();

            // Sleeping pairs are preserved untouched; their contacts live in
            // private clones and their separate must not fire while asleep.
            let a_idle = self.bodies[body_a].body_type() == BodyType::Static
                || self.bodies[body_a].is_sleeping();
            let b_idle = self.bodies[body_b].body_type() == BodyType::Static
                || self.bodies[body_b].is_sleeping();
            if a_idle && b_idle {
                continue;
            }

            let ticks = self.stamp.wrapping_sub(self.arbiters[arb_id].stamp);

            // Observed last frame but not this one: the pair separated.
            if ticks >= 1 && self.arbiters[arb_id].state != ArbiterState::Cached {
                self.arbiters[arb_id].state = ArbiterState::Cached;
                let handler = self.handler_for_arbiter(arb_id);
                (handler.separate)(self, arb_id);
            }

            if ticks >= self.collision_persistence {
                self.cached_arbiters.remove(&key);
                if let Some(arb) = self.arbiters.remove(arb_id) {
                    self.arbiter_pool.give(arb);
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Solver plumbing: split borrows across the space's arenas.

    fn pre_step_arbiter(&mut self, arb_id: ArbiterId, dt: f32, slop: f32, bias_coef: f32) {
        let Space {
            arbiters,
            bodies,
            contact_ring,
            ..
        } = self;
        let arb = &arbiters[arb_id];
        if let ContactStorage::Buffered { slab, start, count } = arb.contacts {
            let contacts = contact_ring.contacts_mut(slab, start, count);
            let (a, b) = bodies
                .get2_mut(arb.body_a, arb.body_b)
                .expect("arbiter endpoints are distinct live bodies");
            arbiter::pre_step(arb, contacts, a, b, dt, slop, bias_coef);
        }
    }

    fn apply_cached_arbiter_impulse(&mut self, arb_id: ArbiterId, dt_coef: f32) {
        let Space {
            arbiters,
            bodies,
            contact_ring,
            ..
        } = self;
        let arb = &arbiters[arb_id];
        if let ContactStorage::Buffered { slab, start, count } = arb.contacts {
            let contacts = contact_ring.contacts(slab, start, count);
            let (a, b) = bodies
                .get2_mut(arb.body_a, arb.body_b)
                .expect("arbiter endpoints are distinct live bodies");
            arbiter::apply_cached_impulse(contacts, a, b, dt_coef);
        }
    }

    fn apply_arbiter_impulse(&mut self, arb_id: ArbiterId) {
        let Space {
            arbiters,
            bodies,
            contact_ring,
            ..
        } = self;
        let arb = &arbiters[arb_id];
        if let ContactStorage::Buffered { slab, start, count } = arb.contacts {
            let contacts = contact_ring.contacts_mut(slab, start, count);
            let (a, b) = bodies
                .get2_mut(arb.body_a, arb.body_b)
                .expect("arbiter endpoints are distinct live bodies");
            arbiter::apply_impulse(arb, contacts, a, b);
        }
    }

    fn pre_step_constraint(&mut self, c_id: ConstraintId, dt: f32) {
        let Space {
            constraints,
            bodies,
            ..
        } = self;
        let constraint = &mut constraints[c_id];
        let (a, b) = bodies
            .get2_mut(constraint.a, constraint.b)
            .expect("constraint endpoints are distinct live bodies");
        constraint.kind.pre_step(a, b, dt);
    }

    fn apply_cached_constraint_impulse(&mut self, c_id: ConstraintId, dt_coef: f32) {
        let Space {
            constraints,
            bodies,
            ..
        } = self;
        let constraint = &mut constraints[c_id];
        let (a, b) = bodies
            .get2_mut(constraint.a, constraint.b)
            .expect("constraint endpoints are distinct live bodies");
        constraint.kind.apply_cached_impulse(a, b, dt_coef);
    }

    fn apply_constraint_impulse(&mut self, c_id: ConstraintId, dt: f32) {
        let Space {
            constraints,
            bodies,
            ..
        } = self;
        let constraint = &mut constraints[c_id];
        let (a, b) = bodies
            .get2_mut(constraint.a, constraint.b)
            .expect("constraint endpoints are distinct live bodies");
        constraint.kind.apply_impulse(a, b, dt);
    }
}
