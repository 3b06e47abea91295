use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::storage::document_store::{Document, DocumentStore, Snapshot, StoreError};
use crate::storage::query::Query;
use crate::storage::subscription::Subscription;

/// Capacity of the change-notification channel feeding live queries
const CHANGE_BUFFER: usize = 256;

/// DbConnection stores JSON documents in SQLite and fans out change
/// notifications to live queries
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
    changes: broadcast::Sender<String>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_max_connections(url, 5).await
    }

    async fn with_max_connections(url: &str, max_connections: u32) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .connect(url)
            .await?;

        Self::setup_schema(&pool).await?;

        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self {
            pool: Arc::new(pool),
            changes,
        })
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        // A single connection keeps the shared-cache database free of table locks
        Self::with_max_connections(&db_url, 1).await
    }

    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, doc_id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn notify(&self, path: &str) {
        // No receivers simply means no live queries are open
        let _ = self.changes.send(path.to_string());
    }

    async fn write(&self, path: &str, id: &str, data: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(data)?;
        sqlx::query(
            "INSERT OR REPLACE INTO documents (collection, doc_id, data, updated_at) VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
        )
        .bind(path)
        .bind(id)
        .bind(body)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for DbConnection {
    async fn get(&self, path: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND doc_id = ?")
            .bind(path)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        match row {
            Some(r) => {
                let body: String = r.get("data");
                Ok(Some(Document {
                    id: id.to_string(),
                    data: serde_json::from_str(&body)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, path: &str, id: &str, data: Value) -> Result<(), StoreError> {
        self.write(path, id, &data).await?;
        self.notify(path);
        Ok(())
    }

    async fn add(&self, path: &str, data: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.set(path, &id, data).await?;
        Ok(id)
    }

    async fn update_fields(&self, path: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        let existing = self.get(path, id).await?.ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
            id: id.to_string(),
        })?;

        let mut merged = existing.data;
        if let (Some(target), Value::Object(updates)) = (merged.as_object_mut(), fields) {
            for (key, value) in updates {
                target.insert(key, value);
            }
        }

        self.set(path, id, merged).await
    }

    async fn delete(&self, path: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND doc_id = ?")
            .bind(path)
            .bind(id)
            .execute(&*self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify(path);
        }
        Ok(deleted)
    }

    async fn query(&self, path: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query("SELECT doc_id, data FROM documents WHERE collection = ? ORDER BY rowid")
            .bind(path)
            .fetch_all(&*self.pool)
            .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.get("data");
            documents.push(Document {
                id: row.get("doc_id"),
                data: serde_json::from_str(&body)?,
            });
        }

        Ok(query.apply(documents))
    }

    fn listen(&self, path: &str, query: Query) -> Subscription<Snapshot> {
        let token = CancellationToken::new();
        let (tx, subscription) = Subscription::channel({
            let token = token.clone();
            move || token.cancel()
        });

        // Subscribe before spawning so writes issued right after `listen` are seen
        let mut changes = self.changes.subscribe();
        let store = self.clone();
        let path = path.to_string();

        tokio::spawn(async move {
            debug!("Live query opened on {}", path);
            loop {
                if token.is_cancelled() {
                    break;
                }

                match store.query(&path, &query).await {
                    Ok(documents) => {
                        if tx.send(Ok(Snapshot::new(documents))).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Live query on {} failed: {}", path, e);
                        let _ = tx.send(Err(StoreError::Listener(e.to_string()))).await;
                        break;
                    }
                }

                // Wait for a write to this collection
                let keep_going = loop {
                    tokio::select! {
                        _ = token.cancelled() => break false,
                        changed = changes.recv() => match changed {
                            Ok(changed_path) if changed_path == path => break true,
                            Ok(_) => continue,
                            Err(RecvError::Lagged(skipped)) => {
                                debug!("Live query on {} lagged by {} changes", path, skipped);
                                break true;
                            }
                            Err(RecvError::Closed) => break false,
                        },
                    }
                };
                if !keep_going {
                    break;
                }
            }
            debug!("Live query closed on {}", path);
        });

        subscription
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup_test() -> DbConnection {
        DbConnection::init_test().await.expect("Failed to create test database")
    }

    #[tokio::test]
    async fn test_set_and_get_document() {
        let db = setup_test().await;

        db.set("users", "g1", json!({"email": "a@b.com"})).await.expect("Failed to set");
        let doc = db.get("users", "g1").await.expect("Failed to get").expect("missing document");
        assert_eq!(doc.id, "g1");
        assert_eq!(doc.data["email"], "a@b.com");

        assert!(db.get("users", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_generates_unique_ids() {
        let db = setup_test().await;

        let a = db.add("samples", json!({"n": 1})).await.unwrap();
        let b = db.add("samples", json!({"n": 2})).await.unwrap();
        assert_ne!(a, b);

        let all = db.query("samples", &Query::new()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_update_fields_merges_and_requires_existing() {
        let db = setup_test().await;

        db.set("users", "g1", json!({"email": "a@b.com", "name": "Old"})).await.unwrap();
        db.update_fields("users", "g1", json!({"name": "New"})).await.unwrap();

        let doc = db.get("users", "g1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "New");
        assert_eq!(doc.data["email"], "a@b.com");

        let missing = db.update_fields("users", "nobody", json!({"name": "x"})).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_document() {
        let db = setup_test().await;

        db.set("geofences", "f1", json!({"name": "School"})).await.unwrap();
        assert!(db.delete("geofences", "f1").await.unwrap());
        assert!(db.get("geofences", "f1").await.unwrap().is_none());
        assert!(!db.delete("geofences", "f1").await.unwrap());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let db = setup_test().await;

        db.set("users/g1/children_profiles/c1/geofences", "f1", json!({"name": "A"})).await.unwrap();
        db.set("users/g1/children_profiles/c2/geofences", "f2", json!({"name": "B"})).await.unwrap();

        let c1 = db.query("users/g1/children_profiles/c1/geofences", &Query::new()).await.unwrap();
        assert_eq!(c1.len(), 1);
        assert_eq!(c1[0].id, "f1");
    }

    #[tokio::test]
    async fn test_listen_emits_initial_snapshot_and_updates() {
        let db = setup_test().await;
        let path = "users/g1/children_profiles/c1/geofences";

        let mut sub = db.listen(path, Query::new());
        let initial = sub.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        db.set(path, "f1", json!({"name": "Park"})).await.unwrap();
        let updated = sub.next().await.unwrap().unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated.documents[0].id, "f1");

        db.delete(path, "f1").await.unwrap();
        let after_delete = sub.next().await.unwrap().unwrap();
        assert!(after_delete.is_empty());

        sub.close();
    }

    #[tokio::test]
    async fn test_listen_applies_query_filters() {
        let db = setup_test().await;
        let path = "readings";

        db.set(path, "r1", json!({"child_id": "c1"})).await.unwrap();
        db.set(path, "r2", json!({"child_id": "c2"})).await.unwrap();

        let mut sub = db.listen(path, Query::new().where_eq("child_id", "c1"));
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.documents[0].id, "r1");
    }
}
