use crate::error::AppResult;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const ACCESS_TOKEN_KEY: &str = "spotify_access_token";
pub const TOKEN_EXPIRATION_KEY: &str = "spotify_token_expiration";
pub const CODE_VERIFIER_KEY: &str = "spotify_code_verifier";
pub const USER_NAME_KEY: &str = "spotify_user_name";
pub const ORIGINAL_URL_KEY: &str = "original_url";
pub const FORCE_LOGIN_KEY: &str = "force_login";

const ALL_KEYS: [&str; 6] = [
    ACCESS_TOKEN_KEY,
    TOKEN_EXPIRATION_KEY,
    CODE_VERIFIER_KEY,
    USER_NAME_KEY,
    ORIGINAL_URL_KEY,
    FORCE_LOGIN_KEY,
];

/// String-valued durable storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// JSON file store, written through on every mutation.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, entries: &HashMap<String, String>) -> AppResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub pkce_verifier: Option<String>,
    pub display_name: Option<String>,
}

impl Credential {
    /// Lifetimes too large to represent saturate at the latest instant.
    pub fn new(access_token: impl Into<String>, expires_in_secs: u64) -> Self {
        let now = Utc::now();
        let expires_at = i64::try_from(expires_in_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            access_token: access_token.into(),
            expires_at,
            pkce_verifier: None,
            display_name: None,
        }
    }
}

/// Persisted credential state on top of a [`KeyValueStore`].
///
/// An expired token reads as absent; nothing here refreshes it.
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get(&self) -> Option<Credential> {
        let access_token = self.store.get(ACCESS_TOKEN_KEY)?;
        let expires_ms: i64 = self.store.get(TOKEN_EXPIRATION_KEY)?.trim().parse().ok()?;
        let expires_at = DateTime::<Utc>::from_timestamp_millis(expires_ms)?;

        if Utc::now() >= expires_at {
            return None;
        }

        Some(Credential {
            access_token,
            expires_at,
            pkce_verifier: self.store.get(CODE_VERIFIER_KEY),
            display_name: self.store.get(USER_NAME_KEY),
        })
    }

    /// Latest valid access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.get().map(|c| c.access_token)
    }

    pub fn put(&self, credential: &Credential) -> AppResult<()> {
        self.store.set(ACCESS_TOKEN_KEY, &credential.access_token)?;
        self.store.set(
            TOKEN_EXPIRATION_KEY,
            &credential.expires_at.timestamp_millis().to_string(),
        )?;
        if let Some(name) = &credential.display_name {
            self.store.set(USER_NAME_KEY, name)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> AppResult<()> {
        for key in ALL_KEYS {
            self.store.remove(key)?;
        }
        Ok(())
    }

    /// Drops only the access token, leaving the rest of the session flags.
    pub fn forget_token(&self) -> AppResult<()> {
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(TOKEN_EXPIRATION_KEY)
    }

    pub fn set_verifier(&self, verifier: &str) -> AppResult<()> {
        self.store.set(CODE_VERIFIER_KEY, verifier)
    }

    pub fn verifier(&self) -> Option<String> {
        self.store.get(CODE_VERIFIER_KEY)
    }

    pub fn take_verifier(&self) -> AppResult<Option<String>> {
        let verifier = self.store.get(CODE_VERIFIER_KEY);
        if verifier.is_some() {
            self.store.remove(CODE_VERIFIER_KEY)?;
        }
        Ok(verifier)
    }

    pub fn display_name(&self) -> Option<String> {
        self.store.get(USER_NAME_KEY)
    }

    pub fn set_display_name(&self, name: &str) -> AppResult<()> {
        self.store.set(USER_NAME_KEY, name)
    }

    pub fn origin(&self) -> Option<String> {
        self.store.get(ORIGINAL_URL_KEY)
    }

    pub fn set_origin(&self, url: &str) -> AppResult<()> {
        self.store.set(ORIGINAL_URL_KEY, url)
    }

    pub fn force_login(&self) -> bool {
        self.store.get(FORCE_LOGIN_KEY).as_deref() == Some("true")
    }

    pub fn set_force_login(&self) -> AppResult<()> {
        self.store.set(FORCE_LOGIN_KEY, "true")
    }
}
