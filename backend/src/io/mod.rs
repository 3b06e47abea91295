//! # IO Module
//!
//! Interface layer between HTTP clients (guardian app, child device, bracelet
//! bridge) and the domain services.
//!
//! ## Key Responsibilities
//!
//! - **API Endpoints**: REST endpoints under `/api`
//! - **Live Queries**: server-sent event streams backed by store subscriptions
//! - **Authentication**: resolving bearer tokens to the signed-in user
//! - **Error Translation**: mapping `GuardianError` to HTTP status codes
//!
//! ## Design Patterns
//!
//! - **Handler Pattern**: one handler function per endpoint, grouped by resource
//! - **Dependency Injection**: services injected via Axum state
//! - **Result Mapping**: every handler matches on the service result and logs failures

pub mod rest;

pub use rest::*;
