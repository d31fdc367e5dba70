pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::InMemoryStore;
pub use redis::RedisStore;
pub use traits::{KeyTtl, KvStore, StorageError, StoreMessage};
