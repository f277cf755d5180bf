/// Identity directory: user records keyed by email, with argon2id
/// credential hashing.
///
/// The gateway only talks to the `UserDirectory` trait so the in-memory
/// implementation can be swapped for a shared store when more than one
/// instance runs.
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string, never the raw credential.
    pub password_hash: String,
    /// Unix seconds.
    pub created_at: u64,
}

impl User {
    pub fn new(name: &str, email: &str, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            created_at: crate::token::now_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User already exists with this email")]
    AlreadyExists,

    #[error("User not found")]
    NotFound,

    #[error("Credential hashing failed")]
    Hashing,
}

/// Narrow interface over whatever owns the user records.
pub trait UserDirectory: Send + Sync {
    fn find_by_email(&self, email: &str) -> Option<User>;
    fn get(&self, id: &str) -> Option<User>;
    /// Insert a new user. Fails if the email is already taken.
    fn insert(&self, user: User) -> Result<(), UserError>;
}

/// In-memory user storage.
pub struct InMemoryUsers {
    /// user_id -> User
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryUsers {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDirectory for InMemoryUsers {
    fn find_by_email(&self, email: &str) -> Option<User> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.values().find(|u| u.email == email).cloned()
    }

    fn get(&self, id: &str) -> Option<User> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.get(id).cloned()
    }

    fn insert(&self, user: User) -> Result<(), UserError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if users.values().any(|u| u.email == user.email) {
            return Err(UserError::AlreadyExists);
        }
        log::info!("[users] Registered user: {} ({})", user.name, user.id);
        users.insert(user.id.clone(), user);
        Ok(())
    }
}

/// Hash a password using argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, UserError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| UserError::Hashing)
}

/// Verify a password against a stored argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
