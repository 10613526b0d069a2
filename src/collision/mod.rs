pub mod arbiter;
pub mod contact;
pub mod contact_buffer;
pub mod handler;
pub mod narrowphase;
pub mod spatial_index;
