//! # Document Store Abstraction
//!
//! The guardian backend persists everything as JSON documents addressed by a
//! slash-separated collection path plus a document id, mirroring the layout of
//! a hosted realtime database. Live queries are exposed as [`Subscription`]s.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::query::Query;
use super::subscription::Subscription;

/// Errors raised by a document store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("document {path}/{id} not found")]
    NotFound { path: String, id: String },

    #[error("live query failed: {0}")]
    Listener(String),
}

/// A stored document: its id within the collection and its JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// One emission of a live query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Storage interface for collection/document persistence with live queries
///
/// Implementations must notify open listeners on every write to a collection
/// they observe. Listener failures are delivered as a terminal `Err` item.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a single document
    async fn get(&self, path: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create or overwrite a document with a known id
    async fn set(&self, path: &str, id: &str, data: Value) -> Result<(), StoreError>;

    /// Create a document with a generated id, returning the id
    async fn add(&self, path: &str, data: Value) -> Result<String, StoreError>;

    /// Merge top-level fields into an existing document
    async fn update_fields(&self, path: &str, id: &str, fields: Value) -> Result<(), StoreError>;

    /// Delete a document; returns whether it existed
    async fn delete(&self, path: &str, id: &str) -> Result<bool, StoreError>;

    /// One-shot query
    async fn query(&self, path: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Open a live query. The first emission is the current result set;
    /// closing or dropping the handle detaches the listener.
    fn listen(&self, path: &str, query: Query) -> Subscription<Snapshot>;
}
