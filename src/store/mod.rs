//! Session-aware stores built on the caching primitives.

pub mod paginated;
pub mod reference;
pub mod resources;
pub mod workers;

pub use paginated::{FetchMode, FetchOutcome, PagedCollectionState, PaginatedStore, StoreOptions};
pub use reference::ReferenceData;
pub use resources::{Faults, Operations, Resource, Users};
pub use workers::WorkerDirectory;
