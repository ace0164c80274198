// ============================================================================
// Opsboard data layer
// ============================================================================

pub mod cache;
pub mod config;
pub mod core;
pub mod facade;
pub mod session;
pub mod store;
pub mod transport;

// Re-export main types for convenience
pub use config::DashboardConfig;
pub use core::{
    Area, ClientError, Clock, Customer, EntityId, EntityStatus, Fault, FaultFilters, FilterMap,
    FilterSet, ManualClock, Operation, OperationFilters, Result, ServiceLine, SystemClock, User,
    Worker,
};
pub use facade::{Dashboard, DashboardBuilder};

// Re-export caching primitives
pub use cache::{RequestCache, SingleFlight, SingletonEntityCache};

// Re-export session and stores
pub use session::{AuthEvent, AuthEventBus, AuthListener, Session};
pub use store::{
    FetchMode, FetchOutcome, PagedCollectionState, PaginatedStore, ReferenceData, StoreOptions,
    WorkerDirectory,
};
pub use transport::{ApiRequest, HttpMethod, HttpTransport, PageResponse, ServiceHealth, Transport};
