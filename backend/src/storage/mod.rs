//! # Storage Layer
//!
//! Document persistence for the guardian backend. Domain services talk to
//! the typed repositories in [`repositories`], which sit on top of the
//! [`DocumentStore`] trait. The production store is SQLite via sqlx; tests
//! use either an in-memory SQLite database or a scripted fake.

pub mod document_store;
pub mod paths;
pub mod query;
pub mod repositories;
pub mod sqlite;
pub mod subscription;

pub use document_store::{Document, DocumentStore, Snapshot, StoreError};
pub use query::{Direction, Query};
pub use sqlite::DbConnection;
pub use subscription::{Subscription, TypedSubscription};
