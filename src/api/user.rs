use crate::api::client::{SpotifyClient, WebApi};
use crate::api::models::{ProfileResponse, ProfileSnapshot};
use crate::error::AppResult;
use crate::storage::TokenStore;
use std::sync::Arc;

/// Tier string the provider reports for paid accounts.
pub const PREMIUM_TIER: &str = "premium";

impl SpotifyClient {
    pub async fn get_profile(&self, token: &str) -> AppResult<ProfileSnapshot> {
        let response = self.get("/me", token).await?;
        let raw: ProfileResponse = response.json().await?;
        Ok(raw.into())
    }
}

pub fn is_premium(snapshot: &ProfileSnapshot) -> bool {
    snapshot.tier.as_deref() == Some(PREMIUM_TIER)
}

/// Name shown as "Signed in as …": display name, else the account id.
pub fn visible_name(snapshot: &ProfileSnapshot) -> &str {
    snapshot.display_name.as_deref().unwrap_or(&snapshot.id)
}

/// Fetches the signed-in profile and keeps the cached display name current.
///
/// Errors are returned untouched; the caller decides whether an auth error
/// should clear the stored credential.
pub struct ProfileClient {
    api: Arc<dyn WebApi>,
    tokens: Arc<TokenStore>,
}

impl ProfileClient {
    pub fn new(api: Arc<dyn WebApi>, tokens: Arc<TokenStore>) -> Self {
        Self { api, tokens }
    }

    pub async fn fetch_profile(&self, token: &str) -> AppResult<ProfileSnapshot> {
        let snapshot = self.api.profile(token).await?;
        let name = visible_name(&snapshot);
        if !name.is_empty() {
            if let Err(e) = self.tokens.set_display_name(name) {
                log::warn!("Failed to cache display name: {}", e);
            }
        }
        Ok(snapshot)
    }
}
