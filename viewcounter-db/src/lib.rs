pub mod lease;
pub mod pool;
pub mod schema;
pub mod sql;
pub mod store;
pub mod views;

pub use lease::{LeaseError, LeaseLimits, LeasedConnection};

pub use pool::{
    DatabasePool,
    PoolStatus,
    initialize_dbpool,
};

pub use schema::ensure_schema;

pub use store::{
    REFERENCE_ZONE,
    ViewRecord,
    ViewStore,
    reference_now,
};

pub use views::{ViewRepository, validate_view};
