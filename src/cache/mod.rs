//! Caching primitives shared by the stores.

pub mod entity_cache;
pub mod request_cache;
pub mod single_flight;

pub use entity_cache::{DEFAULT_ENTITY_TTL, EntityCachePatch, EntityCacheState, SingletonEntityCache};
pub use request_cache::RequestCache;
pub use single_flight::{Flight, SingleFlight};
