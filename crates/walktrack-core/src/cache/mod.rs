//! Progress cache.
//!
//! Person records are projected into a key-value cache with a fixed TTL
//! (20 minutes by default). The cache is never authoritative: every write
//! goes to the store of record, and a cache that is empty, stale or down
//! only costs a store read.
//!
//! - `KeyValueCache`: the cache collaborator interface
//! - `MemoryCache`: in-process TTL cache
//! - `CacheAside`: the read-through / write-through discipline

pub mod aside;
pub mod store;

pub use aside::{CacheAside, CachedData};
pub use store::{CacheError, KeyValueCache, MemoryCache};
