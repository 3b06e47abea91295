use shared::GeofenceTransitionRecord;
use std::sync::Arc;

use crate::storage::document_store::{DocumentStore, StoreError};
use crate::storage::paths;
use crate::storage::query::{Direction, Query};
use crate::storage::subscription::{decode_body, decode_documents};

/// Append-only log of processed geofence transitions
#[derive(Clone)]
pub struct TransitionRepository {
    store: Arc<dyn DocumentStore>,
}

impl TransitionRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, record: &GeofenceTransitionRecord) -> Result<String, StoreError> {
        self.store
            .add(paths::GEOFENCE_TRANSITIONS, serde_json::to_value(record)?)
            .await
    }

    /// Records for the given children, newest first
    pub async fn list_for_children(
        &self,
        child_ids: &[String],
        limit: usize,
    ) -> Result<Vec<GeofenceTransitionRecord>, StoreError> {
        let documents = self
            .store
            .query(
                paths::GEOFENCE_TRANSITIONS,
                &Query::new().order_by("timestamp", Direction::Descending),
            )
            .await?;
        let mut records = decode_documents(&documents, decode_body::<GeofenceTransitionRecord>, "transition");
        records.retain(|r| r.child_id.as_ref().map(|c| child_ids.contains(c)).unwrap_or(false));
        records.truncate(limit);
        Ok(records)
    }

    pub async fn list_for_child(&self, child_id: &str, limit: usize) -> Result<Vec<GeofenceTransitionRecord>, StoreError> {
        let query = Query::new()
            .where_eq("child_id", child_id)
            .order_by("timestamp", Direction::Descending)
            .limit(limit);
        let documents = self.store.query(paths::GEOFENCE_TRANSITIONS, &query).await?;
        Ok(decode_documents(&documents, decode_body::<GeofenceTransitionRecord>, "transition"))
    }
}
