use shared::GeofenceArea;
use std::sync::Arc;

use crate::storage::document_store::{DocumentStore, StoreError};
use crate::storage::paths;
use crate::storage::query::{Direction, Query};
use crate::storage::subscription::{decode_body, decode_documents, TypedSubscription};

/// Repository for per-child geofence documents
#[derive(Clone)]
pub struct GeofenceRepository {
    store: Arc<dyn DocumentStore>,
}

impl GeofenceRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn store_geofence(&self, guardian_id: &str, area: &GeofenceArea) -> Result<(), StoreError> {
        self.store
            .set(&paths::geofences(guardian_id, &area.child_id), &area.id, serde_json::to_value(area)?)
            .await
    }

    pub async fn get_geofence(
        &self,
        guardian_id: &str,
        child_id: &str,
        geofence_id: &str,
    ) -> Result<Option<GeofenceArea>, StoreError> {
        match self.store.get(&paths::geofences(guardian_id, child_id), geofence_id).await? {
            Some(doc) => Ok(Some(decode_body(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn list_geofences(&self, guardian_id: &str, child_id: &str) -> Result<Vec<GeofenceArea>, StoreError> {
        let documents = self
            .store
            .query(&paths::geofences(guardian_id, child_id), &Self::for_child(child_id))
            .await?;
        Ok(decode_documents(&documents, decode_body::<GeofenceArea>, "geofence"))
    }

    pub async fn delete_geofence(&self, guardian_id: &str, child_id: &str, geofence_id: &str) -> Result<bool, StoreError> {
        self.store.delete(&paths::geofences(guardian_id, child_id), geofence_id).await
    }

    pub fn listen_geofences(&self, guardian_id: &str, child_id: &str) -> TypedSubscription<GeofenceArea> {
        let sub = self
            .store
            .listen(&paths::geofences(guardian_id, child_id), Self::for_child(child_id));
        TypedSubscription::new(sub, decode_body::<GeofenceArea>, "geofence")
    }

    fn for_child(child_id: &str) -> Query {
        Query::new()
            .where_eq("child_id", child_id)
            .order_by("creation_time", Direction::Ascending)
    }
}
