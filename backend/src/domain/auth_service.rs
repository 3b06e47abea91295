//! Account registration, credential checks and bearer sessions.
//!
//! Passwords are hashed with Argon2id and stored in PHC format next to the
//! account id under `auth_accounts/{email}`. Session tokens live in memory
//! and do not survive a restart.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use shared::{LoginRequest, RegisterRequest, Role, SessionResponse, User};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::errors::{GuardianError, Result};
use crate::storage::repositories::{AuthAccount, UserRepository};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    sessions: Arc<RwLock<HashMap<String, String>>>,
    /// Held from the duplicate-email check until both documents are written
    registrations: Arc<Mutex<()>>,
}

impl AuthService {
    pub fn new(users: UserRepository) -> Self {
        Self {
            users,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            registrations: Arc::new(Mutex::new(())),
        }
    }

    /// Create an account and open a session for it
    pub async fn register(&self, request: RegisterRequest) -> Result<SessionResponse> {
        let email = request.email.trim().to_string();
        info!("Registering {} account for {}", request.role, email);

        validate_email(&email)?;
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(GuardianError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        let password_hash = hash_password(&request.password)?;

        let _registering = self.registrations.lock().await;
        if self.users.get_account(&email).await?.is_some() {
            warn!("Registration rejected, email already in use: {}", email);
            return Err(GuardianError::Conflict(format!("email {} is already registered", email)));
        }

        let user = User {
            user_id: uuid::Uuid::new_v4().to_string(),
            email: email.clone(),
            role: request.role,
            name: request.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            associated_children: Vec::new(),
            guardian_id: None,
            created_at: Utc::now(),
        };
        let account = AuthAccount {
            email,
            user_id: user.user_id.clone(),
            password_hash,
        };

        self.users.store_user(&user).await?;
        self.users.store_account(&account).await?;
        info!("Registered user {} ({})", user.user_id, user.role);

        Ok(self.open_session(user))
    }

    pub async fn login(&self, request: LoginRequest) -> Result<SessionResponse> {
        let email = request.email.trim();
        info!("Login attempt for {}", email);

        let account = match self.users.get_account(email).await? {
            Some(account) => account,
            None => {
                warn!("Login failed, unknown email: {}", email);
                return Err(GuardianError::NotAuthenticated);
            }
        };
        if !verify_password(&request.password, &account.password_hash)? {
            warn!("Login failed, wrong password for {}", email);
            return Err(GuardianError::NotAuthenticated);
        }

        let user = self
            .users
            .get_user(&account.user_id)
            .await?
            .ok_or_else(|| GuardianError::NotFound(format!("user {}", account.user_id)))?;
        Ok(self.open_session(user))
    }

    /// Ending an unknown session is not an error
    pub fn logout(&self, token: &str) {
        let removed = self.write_sessions().remove(token);
        if let Some(user_id) = removed {
            info!("Logged out user {}", user_id);
        }
    }

    /// Resolve a bearer token to the signed-in user
    pub async fn current_user(&self, token: &str) -> Result<User> {
        let user_id = {
            let sessions = match self.sessions.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            sessions.get(token).cloned()
        };
        let user_id = user_id.ok_or(GuardianError::NotAuthenticated)?;

        self.users.get_user(&user_id).await?.ok_or(GuardianError::NotAuthenticated)
    }

    fn open_session(&self, user: User) -> SessionResponse {
        let token = uuid::Uuid::new_v4().to_string();
        self.write_sessions().insert(token.clone(), user.user_id.clone());
        SessionResponse { token, user }
    }

    fn write_sessions(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Reject anyone who is not a guardian
pub fn require_guardian(user: &User) -> Result<()> {
    match user.role {
        Role::Guardian => Ok(()),
        Role::Child => Err(GuardianError::PermissionDenied("guardian account required".to_string())),
    }
}

/// Reject anyone who is not a child account
pub fn require_child(user: &User) -> Result<()> {
    match user.role {
        Role::Child => Ok(()),
        Role::Guardian => Err(GuardianError::PermissionDenied("child account required".to_string())),
    }
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(GuardianError::Validation(format!("invalid email address: {}", email)))
    }
}

/// Hash a password using Argon2id, returning the PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| GuardianError::Other(anyhow::anyhow!("password hash failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| GuardianError::MalformedDocument(format!("invalid password hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(GuardianError::Other(anyhow::anyhow!("password verification failed: {}", e))),
    }
}
