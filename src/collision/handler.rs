use std::collections::HashMap;

use crate::collision::arbiter::ArbiterId;
use crate::config::WILDCARD_COLLISION_TYPE;
use crate::space::Space;

/// User collision category used for handler dispatch.
pub type CollisionType = u64;

pub type CollisionBeginFn = fn(&mut Space, ArbiterId) -> bool;
pub type CollisionPreSolveFn = fn(&mut Space, ArbiterId) -> bool;
pub type CollisionPostSolveFn = fn(&mut Space, ArbiterId);
pub type CollisionSeparateFn = fn(&mut Space, ArbiterId);

/// Callback bundle dispatched for an unordered pair of collision types.
///
/// Records live in the space's registry and are looked up at dispatch time,
/// so mutating a handler after creation is always observed. `user_data` is an
/// opaque tag the core never reads.
#[derive(Debug, Clone, Copy)]
pub struct CollisionHandler {
    pub type_a: CollisionType,
    pub type_b: CollisionType,
    pub begin: CollisionBeginFn,
    pub pre_solve: CollisionPreSolveFn,
    pub post_solve: CollisionPostSolveFn,
    pub separate: CollisionSeparateFn,
    pub user_data: u64,
}

pub fn always_collide(_space: &mut Space, _arb: ArbiterId) -> bool {
    true
}

pub fn do_nothing(_space: &mut Space, _arb: ArbiterId) {}

// The wildcard-composing defaults: a pair handler (or the space default once
// wildcards are in use) falls through to the one-sided wildcard handlers,
// ANDing the boolean results. Both sides are always invoked, matching the
// begin/separate pairing guarantee.

fn wildcard_begin(space: &mut Space, arb: ArbiterId) -> bool {
    let (handler_a, handler_b) = space.wildcard_handlers_for(arb);
    let accept_a = (handler_a.begin)(space, arb);
    let accept_b = (handler_b.begin)(space, arb);
    accept_a && accept_b
}

fn wildcard_pre_solve(space: &mut Space, arb: ArbiterId) -> bool {
    let (handler_a, handler_b) = space.wildcard_handlers_for(arb);
    let accept_a = (handler_a.pre_solve)(space, arb);
    let accept_b = (handler_b.pre_solve)(space, arb);
    accept_a && accept_b
}

fn wildcard_post_solve(space: &mut Space, arb: ArbiterId) {
    let (handler_a, handler_b) = space.wildcard_handlers_for(arb);
    (handler_a.post_solve)(space, arb);
    (handler_b.post_solve)(space, arb);
}

fn wildcard_separate(space: &mut Space, arb: ArbiterId) {
    let (handler_a, handler_b) = space.wildcard_handlers_for(arb);
    (handler_a.separate)(space, arb);
    (handler_b.separate)(space, arb);
}

impl CollisionHandler {
    /// The inert default: accept every collision, run nothing.
    pub(crate) fn do_nothing_handler() -> Self {
        Self {
            type_a: WILDCARD_COLLISION_TYPE,
            type_b: WILDCARD_COLLISION_TYPE,
            begin: always_collide,
            pre_solve: always_collide,
            post_solve: do_nothing,
            separate: do_nothing,
            user_data: 0,
        }
    }

    /// The default installed once wildcards are in use: compose both
    /// one-sided wildcard handlers.
    pub(crate) fn wildcard_default_handler() -> Self {
        Self {
            type_a: WILDCARD_COLLISION_TYPE,
            type_b: WILDCARD_COLLISION_TYPE,
            begin: wildcard_begin,
            pre_solve: wildcard_pre_solve,
            post_solve: wildcard_post_solve,
            separate: wildcard_separate,
            user_data: 0,
        }
    }

    fn new_pair(type_a: CollisionType, type_b: CollisionType) -> Self {
        // Pair handlers default their unset callbacks to the wildcard
        // composition, so one-sided wildcard handlers still run underneath.
        Self {
            type_a,
            type_b,
            begin: wildcard_begin,
            pre_solve: wildcard_pre_solve,
            post_solve: wildcard_post_solve,
            separate: wildcard_separate,
            user_data: 0,
        }
    }

    fn new_wildcard(collision_type: CollisionType) -> Self {
        Self {
            type_a: collision_type,
            type_b: WILDCARD_COLLISION_TYPE,
            begin: always_collide,
            pre_solve: always_collide,
            post_solve: do_nothing,
            separate: do_nothing,
            user_data: 0,
        }
    }
}

fn pair_key(a: CollisionType, b: CollisionType) -> (CollisionType, CollisionType) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Registry of collision handlers keyed by unordered type pair.
pub(crate) struct HandlerRegistry {
    handlers: HashMap<(CollisionType, CollisionType), CollisionHandler>,
    pub(crate) default: CollisionHandler,
    /// One-way latch; set the first time a wildcard handler is created.
    pub(crate) uses_wildcards: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: CollisionHandler::do_nothing_handler(),
            uses_wildcards: false,
        }
    }

    /// Exact-pair lookup falling back to the space default.
    pub fn lookup(&self, a: CollisionType, b: CollisionType) -> CollisionHandler {
        self.handlers
            .get(&pair_key(a, b))
            .copied()
            .unwrap_or(self.default)
    }

    /// One-sided wildcard lookup; missing wildcards behave as do-nothing.
    pub fn lookup_wildcard(&self, collision_type: CollisionType) -> CollisionHandler {
        self.handlers
            .get(&pair_key(collision_type, WILDCARD_COLLISION_TYPE))
            .copied()
            .unwrap_or_else(CollisionHandler::do_nothing_handler)
    }

    pub fn new_pair_handler(
        &mut self,
        a: CollisionType,
        b: CollisionType,
    ) -> &mut CollisionHandler {
        self.handlers
            .entry(pair_key(a, b))
            .or_insert_with(|| CollisionHandler::new_pair(a, b))
    }

    pub fn new_wildcard_handler(&mut self, collision_type: CollisionType) -> &mut CollisionHandler {
        self.use_wildcard_default();
        self.handlers
            .entry(pair_key(collision_type, WILDCARD_COLLISION_TYPE))
            .or_insert_with(|| CollisionHandler::new_wildcard(collision_type))
    }

    pub fn use_wildcard_default(&mut self) {
        if !self.uses_wildcards {
            self.uses_wildcards = true;
            self.default = CollisionHandler::wildcard_default_handler();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_symmetric_in_the_type_pair() {
        let mut registry = HandlerRegistry::new();
        registry.new_pair_handler(3, 7).user_data = 42;

        assert_eq!(registry.lookup(7, 3).user_data, 42);
        assert_eq!(registry.lookup(3, 7).user_data, 42);
        assert_eq!(registry.lookup(3, 8).user_data, 0);
    }

    #[test]
    fn wildcard_creation_latches_the_composite_default() {
        let mut registry = HandlerRegistry::new();
        assert!(!registry.uses_wildcards);

        registry.new_wildcard_handler(5);
        assert!(registry.uses_wildcards);
        assert_eq!(
            registry.lookup_wildcard(5).type_b,
            WILDCARD_COLLISION_TYPE
        );

        // Latch is one-way.
        registry.use_wildcard_default();
        assert!(registry.uses_wildcards);
    }
}
