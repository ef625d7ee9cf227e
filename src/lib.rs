//! Tenant-scoped extraction from the K3 Cloud bill-query service:
//! paginated fetch, fixed-precision numeric normalization, per-tenant
//! JSON snapshots, and a stored-procedure hand-off that retires each
//! snapshot once it is consumed.

pub mod config;
pub mod db;
pub mod error;
pub mod k3;
pub mod snapshot;
pub mod sync;
pub mod transform;

pub use config::{load_config, SyncConfig};
pub use error::SyncError;
pub use sync::{RunSummary, SyncRunner};
