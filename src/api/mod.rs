//! HTTP Transport
//!
//! Thin adapter between HTTP and the [`TransactionStore`](crate::store::TransactionStore).
//! No business rules live here: routes translate requests into store calls
//! and store results into status codes and JSON.
//!
//! # Status mapping
//!
//! - success → 200 with the record or page as JSON
//! - absent record → 404
//! - `Validation` / malformed input → 400
//! - `Overloaded` → 503 with `Retry-After`

mod health;
mod routes;
mod server;

pub use health::{HealthCheck, HealthCheckResult, HealthResponse, HealthStatus};
pub use routes::{error_response, handle, json_response, PageQuery, Route, MAX_BODY_BYTES};
pub use server::{bind, ops_handler, run_api_server, run_ops_server};
