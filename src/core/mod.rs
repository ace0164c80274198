pub mod clock;
pub mod error;
pub mod filters;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ClientError, Result};
pub use filters::{FaultFilters, FilterMap, FilterSet, OperationFilters, cache_key, request_key};
pub use types::{Area, Customer, EntityId, EntityStatus, Fault, Operation, ServiceLine, User, Worker};
