//! K3 Cloud Web API client and bill-query pagination.
//!
//! This module provides the HTTP session client and the paginated
//! bill-query layer on top of it. Key features:
//!
//! - **Session auth** via `LoginByAppSecret`, carried on a cookie store
//! - **Safe logging** that never leaks the app secret
//! - **Encoding fallback** - requests are retried once with a
//!   string-serialized payload when the structured form is rejected

pub mod client;
pub mod query;

pub use client::K3Client;
pub use query::{BillQueryClient, QuerySpec};
