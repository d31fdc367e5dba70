//! Cache policies: read-through, flat eviction, grouped hash fields.

pub mod evict;
pub mod hash;
pub mod read_through;

pub use evict::Evictor;
pub use hash::HashCache;
pub use read_through::ReadThroughCache;
