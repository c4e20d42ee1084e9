use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

use super::principal::Principal;

const DEMO_USER: &str = "demo";
const DEMO_PASSWORD: &str = "demo";

/// One entry of a users file. Either `password_hash` (Argon2 PHC string) or a
/// plaintext `password`, which is hashed on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AppError::internal("rng_unavailable", e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::internal("salt_encoding", e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("hash_failed", e.to_string()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

#[derive(Debug, Clone)]
struct StoredUser {
    username: String,
    display_name: Option<String>,
    password_hash: String,
}

/// Credential store keyed by lower-cased username.
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: Arc<RwLock<HashMap<String, StoredUser>>>,
}

impl UserStore {
    pub fn new() -> Self { Self::default() }

    pub fn load_json(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::config("users_unreadable", format!("{}: {}", path.display(), e)))?;
        let records: Vec<UserRecord> = serde_json::from_str(&text)
            .map_err(|e| AppError::config("users_invalid", format!("{}: {}", path.display(), e)))?;
        let store = Self::new();
        for rec in records {
            store.insert_record(rec)?;
        }
        Ok(store)
    }

    pub fn insert_record(&self, rec: UserRecord) -> AppResult<()> {
        if rec.username.trim().is_empty() {
            return Err(AppError::user("invalid_username", "username is empty"));
        }
        let password_hash = match (rec.password_hash, rec.password) {
            (Some(h), _) => {
                PasswordHash::new(&h).map_err(|e| AppError::config("invalid_password_hash", format!("{}: {}", rec.username, e)))?;
                h
            }
            (None, Some(p)) => hash_password(&p)?,
            (None, None) => return Err(AppError::config("missing_password", format!("{}: no password or password_hash", rec.username))),
        };
        let user = StoredUser { username: rec.username.clone(), display_name: rec.display_name, password_hash };
        self.users.write().insert(rec.username.to_lowercase(), user);
        Ok(())
    }

    pub fn add_user(&self, username: &str, password: &str, display_name: Option<&str>) -> AppResult<()> {
        self.insert_record(UserRecord {
            username: username.to_string(),
            display_name: display_name.map(|s| s.to_string()),
            password_hash: None,
            password: Some(password.to_string()),
        })
    }

    /// Verify credentials; the principal carries the username as stored.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let user = self.users.read().get(&username.to_lowercase()).cloned()?;
        if !verify_password(&user.password_hash, password) {
            return None;
        }
        Some(Principal { user_id: user.username, display_name: user.display_name, ..Default::default() })
    }

    pub fn len(&self) -> usize { self.users.read().len() }
    pub fn is_empty(&self) -> bool { self.users.read().is_empty() }

    /// Seed a demo account into an empty store. Returns true when seeded.
    pub fn ensure_default_user(&self) -> AppResult<bool> {
        if !self.is_empty() { return Ok(false); }
        self.add_user(DEMO_USER, DEMO_PASSWORD, Some("Demo Adopter"))?;
        warn!(target: "pethaven::identity", "no users configured; seeded demo account '{}' with the default password", DEMO_USER);
        Ok(true)
    }
}
