use std::mem;

use crate::collision::arbiter::{self, ContactStorage};
use crate::core::body::{BodyId, BodyType};
use crate::space::{ShapePair, Space};

impl Space {
    /// Wakes a dynamic body and, if it was sleeping, its whole island.
    ///
    /// Safe to call during a step: the island bookkeeping is torn down
    /// immediately, while the per-body list surgery defers until the lock
    /// releases.
    pub fn activate(&mut self, body: BodyId) {
        assert!(
            self.bodies[body].body_type() == BodyType::Dynamic,
            "attempting to activate a non-dynamic body"
        );
        self.bodies[body].sleeping_idle_time = 0.0;

        if let Some(root) = self.bodies[body].sleeping_root {
            let mut chain = Vec::new();
            let mut cur = Some(root);
            while let Some(id) = cur {
                chain.push(id);
                cur = self.bodies[id].sleeping_next;
            }

            if let Some(pos) = self.sleeping_components.iter().position(|&r| r == root) {
                self.sleeping_components.remove(pos);
            }

            for member in chain {
                {
                    let b = &mut self.bodies[member];
                    b.sleeping_root = None;
                    b.sleeping_next = None;
                    b.sleeping_idle_time = 0.0;
                }
                self.activate_body(member);
            }
        }

        // Reset the idle timer of everything this body touches, so resting
        // neighbours don't drift straight back to sleep.
        let mut cur = self.bodies[body].arbiter_list;
        while let Some(arb_id) = cur {
            let arb = &self.arbiters[arb_id];
            let other = if arb.body_a == body {
                arb.body_b
            } else {
                arb.body_a
            };
            let next = arb.next(body);
            if self.bodies[other].body_type() != BodyType::Static {
                self.bodies[other].sleeping_idle_time = 0.0;
            }
            cur = next;
        }
    }

    /// Puts a dynamic body to sleep immediately as a one-body island.
    pub fn deactivate(&mut self, body: BodyId) {
        assert!(
            self.sleep_time_threshold != f32::INFINITY,
            "sleeping is not enabled on this space"
        );
        assert!(
            self.bodies[body].body_type() == BodyType::Dynamic,
            "attempting to deactivate a non-dynamic body"
        );
        self.assert_unlocked();

        if self.bodies[body].is_sleeping() {
            return;
        }

        {
            let b = &mut self.bodies[body];
            b.sleeping_root = Some(body);
            b.sleeping_next = None;
            b.sleeping_idle_time = f32::INFINITY;
        }
        self.sleeping_components.push(body);
        self.deactivate_body(body);
    }

    /// Restores a woken body into the live structures: the dynamic body
    /// list, the dynamic shape index, the arbiter cache and solve lists.
    /// Defers itself while the space is locked.
    pub(crate) fn activate_body(&mut self, body: BodyId) {
        assert!(
            self.bodies[body].body_type() == BodyType::Dynamic,
            "attempting to activate a non-dynamic body"
        );

        if self.is_locked() {
            if !self.roused_bodies.contains(&body) {
                self.roused_bodies.push(body);
            }
            return;
        }

        {
            let b = &self.bodies[body];
            assert!(
                b.sleeping_root.is_none() && b.sleeping_next.is_none(),
                "activating a body with dangling island pointers"
            );
        }

        self.dynamic_bodies.push(body);

        for shape_id in self.bodies[body].shapes.clone() {
            let hashid = self.shapes[shape_id].hashid;
            let bb = self.shapes[shape_id].bb();
            self.static_shapes.remove(shape_id, hashid);
            self.dynamic_shapes.insert(shape_id, hashid, bb);
        }

        // Each arbiter is shared by two bodies that wake together, so restore
        // it exactly once: body_a arbitrarily owns it, except when body_a is
        // static (static bodies never slept in the first place).
        let mut cur = self.bodies[body].arbiter_list;
        while let Some(arb_id) = cur {
            let next = self.arbiters[arb_id].next(body);
            let body_a = self.arbiters[arb_id].body_a;
            if body == body_a || self.bodies[body_a].body_type() == BodyType::Static {
                let storage =
                    mem::replace(&mut self.arbiters[arb_id].contacts, ContactStorage::Empty);
                match storage {
                    ContactStorage::Private(contacts) => {
                        // Move the private clone back into the live ring.
                        let count = contacts.len();
                        {
                            let slab =
                                self.contact_ring
                                    .free_slab(self.stamp, self.collision_persistence);
                            slab[..count].copy_from_slice(&contacts);
                        }
                        let (slab, start) = self.contact_ring.head_mark();
                        self.contact_ring.push(count);
                        self.arbiters[arb_id].contacts =
                            ContactStorage::Buffered { slab, start, count };
                    }
                    other => self.arbiters[arb_id].contacts = other,
                }

                let (a, b) = self.arbiters[arb_id].shapes();
                let key = ShapePair::new(self.shapes[a].hashid, self.shapes[b].hashid);
                self.cached_arbiters.insert(key, arb_id);

                self.arbiters[arb_id].stamp = self.stamp;
                self.active_arbiters.push(arb_id);
            }
            cur = next;
        }

        let mut cur = self.bodies[body].constraint_list;
        while let Some(c_id) = cur {
            let next = self.constraints[c_id].next(body);
            let a = self.constraints[c_id].a;
            if body == a || self.bodies[a].body_type() == BodyType::Static {
                self.active_constraints.push(c_id);
            }
            cur = next;
        }
    }

    /// Removes a sleeping body from the live structures, serializing its
    /// edges: contacts are cloned out of the shared ring so they survive
    /// recycling, and its shapes move to the static index.
    pub(crate) fn deactivate_body(&mut self, body: BodyId) {
        assert!(
            self.bodies[body].body_type() == BodyType::Dynamic,
            "attempting to deactivate a non-dynamic body"
        );

        if let Some(pos) = self.dynamic_bodies.iter().position(|&b| b == body) {
            self.dynamic_bodies.remove(pos);
        }

        for shape_id in self.bodies[body].shapes.clone() {
            let hashid = self.shapes[shape_id].hashid;
            let bb = self.shapes[shape_id].bb();
            self.dynamic_shapes.remove(shape_id, hashid);
            self.static_shapes.insert(shape_id, hashid, bb);
        }

        let mut cur = self.bodies[body].arbiter_list;
        while let Some(arb_id) = cur {
            let next = self.arbiters[arb_id].next(body);
            let body_a = self.arbiters[arb_id].body_a;
            if body == body_a || self.bodies[body_a].body_type() == BodyType::Static {
                self.uncache_arbiter(arb_id);

                let storage = match &self.arbiters[arb_id].contacts {
                    ContactStorage::Buffered { slab, start, count } => ContactStorage::Private(
                        self.contact_ring.contacts(*slab, *start, *count).to_vec(),
                    ),
                    ContactStorage::Private(contacts) => {
                        ContactStorage::Private(contacts.clone())
                    }
                    ContactStorage::Empty => ContactStorage::Empty,
                };
                self.arbiters[arb_id].contacts = storage;
            }
            cur = next;
        }

        let mut cur = self.bodies[body].constraint_list;
        while let Some(c_id) = cur {
            let next = self.constraints[c_id].next(body);
            let a = self.constraints[c_id].a;
            if body == a || self.bodies[a].body_type() == BodyType::Static {
                if let Some(pos) = self.active_constraints.iter().position(|&c| c == c_id) {
                    self.active_constraints.remove(pos);
                }
            }
            cur = next;
        }
    }

    /// The sleep pass: idle accounting, kinematic wake-ups, contact graph
    /// threading, and island flood-fill. Runs between the two locked
    /// sections of every step.
    pub(crate) fn process_components(&mut self, dt: f32) {
        let sleep = self.sleep_time_threshold != f32::INFINITY;

        for &body in &self.dynamic_bodies {
            let b = &self.bodies[body];
            assert!(
                b.sleeping_next.is_none(),
                "dangling island pointer in the contact graph (next)"
            );
            assert!(
                b.sleeping_root.is_none(),
                "dangling island pointer in the contact graph (root)"
            );
        }

        if sleep {
            // Idle accounting against a kinetic energy threshold; with no
            // explicit idle speed, derive one from gravity and the timestep.
            let dv = self.idle_speed_threshold;
            let dvsq = if dv != 0.0 {
                dv * dv
            } else {
                self.gravity().length_squared() * dt * dt
            };

            for body_id in self.dynamic_bodies.clone() {
                let body = &mut self.bodies[body_id];
                if body.body_type() != BodyType::Dynamic {
                    continue;
                }

                let ke_threshold = if dvsq != 0.0 { body.mass() * dvsq } else { 0.0 };
                if body.kinetic_energy() > ke_threshold {
                    body.sleeping_idle_time = 0.0;
                } else {
                    body.sleeping_idle_time += dt;
                }
            }
        }

        // Wake bodies touched by kinematics or by awake partners, then
        // thread every live arbiter back into the contact graph.
        for arb_id in self.active_arbiters.clone() {
            let (a, b) = self.arbiters[arb_id].bodies();

            if sleep {
                let a_type = self.bodies[a].body_type();
                let b_type = self.bodies[b].body_type();

                if a_type == BodyType::Dynamic
                    && (b_type == BodyType::Kinematic || self.bodies[a].is_sleeping())
                {
                    self.activate(a);
                }
                if b_type == BodyType::Dynamic
                    && (a_type == BodyType::Kinematic || self.bodies[b].is_sleeping())
                {
                    self.activate(b);
                }
            }

            arbiter::push_to_body(&mut self.arbiters, &mut self.bodies, arb_id, a);
            arbiter::push_to_body(&mut self.arbiters, &mut self.bodies, arb_id, b);
        }

        if sleep {
            // Constraints to kinematic bodies hold their partner awake too.
            for c_id in self.active_constraints.clone() {
                let (a, b) = self.constraints[c_id].bodies();
                if self.bodies[b].body_type() == BodyType::Kinematic
                    && self.bodies[a].body_type() == BodyType::Dynamic
                {
                    self.activate(a);
                }
                if self.bodies[a].body_type() == BodyType::Kinematic
                    && self.bodies[b].body_type() == BodyType::Dynamic
                {
                    self.activate(b);
                }
            }

            let threshold = self.sleep_time_threshold;
            let mut i = 0;
            while i < self.dynamic_bodies.len() {
                let body = self.dynamic_bodies[i];

                if self.bodies[body].sleeping_root.is_none() {
                    self.flood_fill_component(body);

                    if !self.component_active(body, threshold) {
                        // The whole island is idle: put it to sleep.
                        self.sleeping_components.push(body);
                        let mut chain = Vec::new();
                        let mut cur = Some(body);
                        while let Some(id) = cur {
                            chain.push(id);
                            cur = self.bodies[id].sleeping_next;
                        }
                        for member in chain {
                            self.deactivate_body(member);
                        }

                        // deactivate_body removed the current body from the
                        // list; don't advance the index.
                        continue;
                    }
                }

                i += 1;

                // Only sleeping bodies keep their island pointers.
                let b = &mut self.bodies[body];
                b.sleeping_root = None;
                b.sleeping_next = None;
            }
        }
    }

    /// Depth-first flood fill attaching every dynamic body reachable through
    /// contacts and constraints to `root`'s island. Kinematic and static
    /// bodies are barriers: never attached, never crossed.
    fn flood_fill_component(&mut self, root: BodyId) {
        let mut stack = vec![root];
        while let Some(body) = stack.pop() {
            if self.bodies[body].body_type() != BodyType::Dynamic {
                continue;
            }

            if let Some(existing) = self.bodies[body].sleeping_root {
                assert!(
                    existing == root,
                    "inconsistency detected in the contact graph during flood fill"
                );
                continue;
            }

            // Attach to the island, inserting after the root.
            self.bodies[body].sleeping_root = Some(root);
            if body != root {
                let next = self.bodies[root].sleeping_next;
                self.bodies[body].sleeping_next = next;
                self.bodies[root].sleeping_next = Some(body);
            }

            let mut cur = self.bodies[body].arbiter_list;
            while let Some(arb_id) = cur {
                let arb = &self.arbiters[arb_id];
                stack.push(if arb.body_a == body {
                    arb.body_b
                } else {
                    arb.body_a
                });
                cur = arb.next(body);
            }

            let mut cur = self.bodies[body].constraint_list;
            while let Some(c_id) = cur {
                let constraint = &self.constraints[c_id];
                stack.push(if constraint.a == body {
                    constraint.b
                } else {
                    constraint.a
                });
                cur = constraint.next(body);
            }
        }
    }

    /// An island may sleep only when every member has been idle long enough.
    fn component_active(&self, root: BodyId, threshold: f32) -> bool {
        let mut cur = Some(root);
        while let Some(id) = cur {
            if self.bodies[id].sleeping_idle_time < threshold {
                return true;
            }
            cur = self.bodies[id].sleeping_next;
        }
        false
    }
}
