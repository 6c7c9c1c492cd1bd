use crate::error::AppResult;
use crate::storage::TokenStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle events a playback session reports.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    InitializationError { message: String },
    AuthenticationError { message: String },
    AccountError { message: String },
    PlaybackError { message: String },
    PlayerStateChanged(Option<SdkPlaybackState>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SdkPlaybackState {
    pub paused: bool,
    pub current_track_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    #[error("Player not initialized")]
    NotInitialized,
    #[error("Player initialization failed: {0}")]
    Initialization(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Account error: {0}")]
    Account(String),
    #[error("Playback error: {0}")]
    Playback(String),
    #[error("Failed to connect to Spotify")]
    ConnectFailed,
}

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub name: String,
    pub volume: f32,
    /// Preferred output device, by name.
    pub device_name: Option<String>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            name: "Mystery Music Player".to_string(),
            volume: 0.5,
            device_name: None,
        }
    }
}

/// Hands the session the current token each time it asks.
///
/// Reads the store on every call, so a token replaced after the session was
/// created is picked up on the next request.
#[derive(Clone)]
pub struct TokenProvider {
    tokens: Arc<TokenStore>,
}

impl TokenProvider {
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        Self { tokens }
    }

    pub fn token(&self) -> Option<String> {
        self.tokens.access_token()
    }
}

/// A remote playback session. Events arrive on the channel handed to
/// [`SdkFactory::create`].
#[async_trait]
pub trait PlayerSdk: Send + Sync {
    /// `Ok(false)` when the session could not be established.
    async fn connect(&self) -> AppResult<bool>;

    fn disconnect(&self);

    /// Unlocks audio output after a user gesture.
    async fn activate_element(&self) -> AppResult<()>;

    /// Snapshot query. Reports nothing on the event channel.
    async fn current_state(&self) -> AppResult<Option<SdkPlaybackState>>;

    async fn resume(&self) -> AppResult<()>;

    async fn pause(&self) -> AppResult<()>;
}

pub trait SdkFactory: Send + Sync {
    fn create(
        &self,
        options: PlayerOptions,
        token: TokenProvider,
        events: mpsc::UnboundedSender<SdkEvent>,
    ) -> AppResult<Arc<dyn PlayerSdk>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Credential;

    #[test]
    fn provider_returns_the_latest_token() {
        let tokens = Arc::new(TokenStore::in_memory());
        let provider = TokenProvider::new(tokens.clone());
        assert_eq!(provider.token(), None);

        tokens.put(&Credential::new("first", 3600)).unwrap();
        assert_eq!(provider.token().as_deref(), Some("first"));

        tokens.put(&Credential::new("second", 3600)).unwrap();
        assert_eq!(provider.token().as_deref(), Some("second"));

        tokens.clear().unwrap();
        assert_eq!(provider.token(), None);
    }
}
