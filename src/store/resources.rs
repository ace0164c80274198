use crate::core::{Fault, FaultFilters, FilterMap, FilterSet, Operation, OperationFilters, User};
use serde::de::DeserializeOwned;

/// Binds a backend collection to its record and filter types.
pub trait Resource: Send + Sync + 'static {
    type Item: DeserializeOwned + Clone + Send + Sync + 'static;
    type Filters: FilterSet;

    /// Collection path under the API root, e.g. `operations`.
    const PATH: &'static str;
}

pub struct Operations;

impl Resource for Operations {
    type Item = Operation;
    type Filters = OperationFilters;
    const PATH: &'static str = "operations";
}

pub struct Faults;

impl Resource for Faults {
    type Item = Fault;
    type Filters = FaultFilters;
    const PATH: &'static str = "faults";
}

pub struct Users;

impl Resource for Users {
    type Item = User;
    type Filters = FilterMap;
    const PATH: &'static str = "users";
}
