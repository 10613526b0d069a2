//! Global configuration constants for the tumble engine.

/// Maximum number of contact points a single arbiter can carry.
pub const MAX_CONTACTS_PER_ARBITER: usize = 2;

/// Number of contact slots in one contact buffer slab.
pub const CONTACT_BUFFER_SIZE: usize = 1024;

/// Capacity of the arbiter recycling pool; overflow is released to the
/// allocator instead.
pub const POOLED_ARBITER_CAPACITY: usize = 100;

/// Default number of impulse solver iterations performed per step.
pub const DEFAULT_ITERATIONS: u32 = 10;

/// Default allowed penetration depth before position correction kicks in.
pub const DEFAULT_COLLISION_SLOP: f32 = 0.1;

/// Default fraction of overlap left unresolved after 1/60th of a second,
/// i.e. `0.9.powf(60.0)`.
pub const DEFAULT_COLLISION_BIAS: f32 = 0.001_797_038_2;

/// Default number of frames a contact stays usable after its pair was last
/// observed.
pub const DEFAULT_COLLISION_PERSISTENCE: u32 = 3;

/// Default cell size for the spatial hash grid.
pub const DEFAULT_GRID_CELL_SIZE: f32 = 5.0;

/// Collision type value that matches any other type during handler lookup.
pub const WILDCARD_COLLISION_TYPE: u64 = u64::MAX;
