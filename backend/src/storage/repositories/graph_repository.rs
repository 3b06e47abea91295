use shared::UserGraph;
use std::sync::Arc;

use crate::storage::document_store::{DocumentStore, StoreError};
use crate::storage::paths;
use crate::storage::query::{Direction, Query};
use crate::storage::subscription::{decode_documents, decode_with_id, TypedSubscription};

/// Repository for saved chart references under `users/{guardian}/user_graphs`
#[derive(Clone)]
pub struct GraphRepository {
    store: Arc<dyn DocumentStore>,
}

impl GraphRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn add_graph(&self, graph: &UserGraph) -> Result<String, StoreError> {
        let mut data = serde_json::to_value(graph)?;
        if let Some(object) = data.as_object_mut() {
            object.remove("id");
        }
        self.store.add(&paths::user_graphs(&graph.user_id), data).await
    }

    /// Newest first
    pub async fn list_graphs(&self, guardian_id: &str) -> Result<Vec<UserGraph>, StoreError> {
        let documents = self.store.query(&paths::user_graphs(guardian_id), &Self::newest_first()).await?;
        Ok(decode_documents(&documents, decode_with_id::<UserGraph>, "user graph"))
    }

    pub async fn delete_graph(&self, guardian_id: &str, graph_id: &str) -> Result<bool, StoreError> {
        self.store.delete(&paths::user_graphs(guardian_id), graph_id).await
    }

    pub fn listen_graphs(&self, guardian_id: &str) -> TypedSubscription<UserGraph> {
        let sub = self.store.listen(&paths::user_graphs(guardian_id), Self::newest_first());
        TypedSubscription::new(sub, decode_with_id::<UserGraph>, "user graph")
    }

    fn newest_first() -> Query {
        Query::new().order_by("generated_at", Direction::Descending)
    }
}
