use serde_json::json;
use shared::{ChildProfile, ChildThresholds};
use std::sync::Arc;

use crate::storage::document_store::{DocumentStore, StoreError};
use crate::storage::paths;
use crate::storage::query::{Direction, Query};
use crate::storage::subscription::{decode_body, decode_documents, TypedSubscription};

/// Repository for guardian-owned child profiles
#[derive(Clone)]
pub struct ChildProfileRepository {
    store: Arc<dyn DocumentStore>,
}

impl ChildProfileRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn store_profile(&self, guardian_id: &str, profile: &ChildProfile) -> Result<(), StoreError> {
        self.store
            .set(&paths::children_profiles(guardian_id), &profile.child_id, serde_json::to_value(profile)?)
            .await
    }

    pub async fn get_profile(&self, guardian_id: &str, child_id: &str) -> Result<Option<ChildProfile>, StoreError> {
        match self.store.get(&paths::children_profiles(guardian_id), child_id).await? {
            Some(doc) => Ok(Some(decode_body(&doc)?)),
            None => Ok(None),
        }
    }

    /// All profiles for a guardian; malformed entries are skipped
    pub async fn list_profiles(&self, guardian_id: &str) -> Result<Vec<ChildProfile>, StoreError> {
        let documents = self
            .store
            .query(&paths::children_profiles(guardian_id), &Self::ordered())
            .await?;
        Ok(decode_documents(&documents, decode_body::<ChildProfile>, "child profile"))
    }

    pub async fn update_thresholds(
        &self,
        guardian_id: &str,
        child_id: &str,
        thresholds: &ChildThresholds,
    ) -> Result<(), StoreError> {
        self.store
            .update_fields(
                &paths::children_profiles(guardian_id),
                child_id,
                json!({ "thresholds": serde_json::to_value(thresholds)? }),
            )
            .await
    }

    pub async fn delete_profile(&self, guardian_id: &str, child_id: &str) -> Result<bool, StoreError> {
        self.store.delete(&paths::children_profiles(guardian_id), child_id).await
    }

    pub fn listen_profiles(&self, guardian_id: &str) -> TypedSubscription<ChildProfile> {
        let sub = self.store.listen(&paths::children_profiles(guardian_id), Self::ordered());
        TypedSubscription::new(sub, decode_body::<ChildProfile>, "child profile")
    }

    fn ordered() -> Query {
        Query::new().order_by("name", Direction::Ascending)
    }
}
