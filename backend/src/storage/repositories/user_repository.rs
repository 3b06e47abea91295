use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::User;
use std::sync::Arc;

use crate::storage::document_store::{DocumentStore, StoreError};
use crate::storage::paths;
use crate::storage::query::Query;
use crate::storage::subscription::{decode_body, decode_documents};

/// Credential record stored at `auth_accounts/{email}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthAccount {
    pub email: String,
    pub user_id: String,
    pub password_hash: String,
}

/// Repository for account documents and credentials
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn store_user(&self, user: &User) -> Result<(), StoreError> {
        self.store.set(paths::USERS, &user.user_id, serde_json::to_value(user)?).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        match self.store.get(paths::USERS, user_id).await? {
            Some(doc) => Ok(Some(decode_body(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn list_guardians(&self) -> Result<Vec<User>, StoreError> {
        let documents = self
            .store
            .query(paths::USERS, &Query::new().where_eq("role", "guardian"))
            .await?;
        Ok(decode_documents(&documents, decode_body::<User>, "user"))
    }

    /// Rewrite the guardian's `associated_children` list, keeping it free of duplicates
    pub async fn add_associated_child(&self, guardian_id: &str, child_id: &str) -> Result<(), StoreError> {
        let mut children = self.associated_children(guardian_id).await?;
        if !children.iter().any(|c| c == child_id) {
            children.push(child_id.to_string());
        }
        self.store
            .update_fields(paths::USERS, guardian_id, json!({ "associated_children": children }))
            .await
    }

    pub async fn remove_associated_child(&self, guardian_id: &str, child_id: &str) -> Result<(), StoreError> {
        let mut children = self.associated_children(guardian_id).await?;
        children.retain(|c| c != child_id);
        self.store
            .update_fields(paths::USERS, guardian_id, json!({ "associated_children": children }))
            .await
    }

    pub async fn set_guardian(&self, child_id: &str, guardian_id: Option<&str>) -> Result<(), StoreError> {
        let value = guardian_id.map(|g| Value::String(g.to_string())).unwrap_or(Value::Null);
        self.store
            .update_fields(paths::USERS, child_id, json!({ "guardian_id": value }))
            .await
    }

    async fn associated_children(&self, guardian_id: &str) -> Result<Vec<String>, StoreError> {
        let user = self.get_user(guardian_id).await?.ok_or_else(|| StoreError::NotFound {
            path: paths::USERS.to_string(),
            id: guardian_id.to_string(),
        })?;
        Ok(user.associated_children)
    }

    pub async fn store_account(&self, account: &AuthAccount) -> Result<(), StoreError> {
        self.store
            .set(paths::AUTH_ACCOUNTS, &account_key(&account.email), serde_json::to_value(account)?)
            .await
    }

    pub async fn get_account(&self, email: &str) -> Result<Option<AuthAccount>, StoreError> {
        match self.store.get(paths::AUTH_ACCOUNTS, &account_key(email)).await? {
            Some(doc) => Ok(Some(decode_body(&doc)?)),
            None => Ok(None),
        }
    }
}

/// Emails are matched case-insensitively
fn account_key(email: &str) -> String {
    email.trim().to_lowercase()
}
