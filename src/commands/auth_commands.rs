use super::Output;
use crate::api::client::WebApi;
use crate::api::user::{self, ProfileClient};
use crate::callback::{CallbackListener, CALLBACK_TIMEOUT};
use crate::diagnostics::token_preview;
use crate::error::{AppError, AppResult};
use crate::AppState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub display_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_preview: Option<String>,
    pub premium: Option<bool>,
}

impl AuthStatus {
    fn describe(&self) -> String {
        if !self.authenticated {
            return "Not connected".to_string();
        }
        let mut text = format!(
            "Signed in as {}",
            self.display_name.as_deref().unwrap_or("unknown user")
        );
        if let Some(expires_at) = self.expires_at {
            text.push_str(&format!(
                "\nToken expires {}",
                expires_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
            ));
        }
        if let Some(preview) = &self.token_preview {
            text.push_str(&format!("\nToken {}", preview));
        }
        match self.premium {
            Some(true) => text.push_str("\nAccount type: premium"),
            Some(false) => text.push_str("\nAccount type: not premium (playback unavailable)"),
            None => {}
        }
        text
    }
}

/// PKCE login through the system browser and the loopback redirect.
pub async fn login(state: &AppState, out: Output) -> AppResult<()> {
    let listener = CallbackListener::bind(&state.config.redirect_uri).await?;

    let url = state.auth.login(&state.config.redirect_uri)?;
    out.line("Opening Spotify login in your browser...");
    out.line(format!("If nothing opened, visit:\n{}", url));

    let redirect = listener.wait(CALLBACK_TIMEOUT).await?;
    let credential = state
        .auth
        .complete_from_redirect(&redirect)
        .await?
        .ok_or_else(|| AppError::Auth("No credential found in redirect".into()))?;

    let api: Arc<dyn WebApi> = state.client.clone();
    let profiles = ProfileClient::new(api, Arc::clone(&state.tokens));
    let profile = match profiles.fetch_profile(&credential.access_token).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            log::warn!("Failed to fetch user profile: {}", e);
            None
        }
    };

    let status = AuthStatus {
        authenticated: true,
        display_name: profile
            .as_ref()
            .map(|p| user::visible_name(p).to_string())
            .or_else(|| state.tokens.display_name()),
        expires_at: Some(credential.expires_at),
        token_preview: Some(token_preview(&credential.access_token)),
        premium: profile.as_ref().map(user::is_premium),
    };
    out.value(&status, || status.describe());
    Ok(())
}

pub async fn logout(state: &AppState, out: Output) -> AppResult<()> {
    let done = state.auth.logout(None)?;
    out.line("Signed out. Ending the Spotify web session...");
    if let Err(e) = done.await {
        log::warn!("Logout task failed: {}", e);
    }
    out.value(&serde_json::json!({ "authenticated": false }), || {
        "Logged out".to_string()
    });
    Ok(())
}

pub async fn status(state: &AppState, out: Output) -> AppResult<()> {
    let Some(credential) = state.tokens.get() else {
        let status = AuthStatus {
            authenticated: false,
            display_name: None,
            expires_at: None,
            token_preview: None,
            premium: None,
        };
        out.value(&status, || status.describe());
        return Ok(());
    };

    let api: Arc<dyn WebApi> = state.client.clone();
    let profiles = ProfileClient::new(api, Arc::clone(&state.tokens));
    let (display_name, premium) = match profiles.fetch_profile(&credential.access_token).await {
        Ok(profile) => (
            Some(user::visible_name(&profile).to_string()),
            Some(user::is_premium(&profile)),
        ),
        Err(e) if e.is_auth() => {
            log::warn!("Stored token was rejected: {}", e);
            state.tokens.forget_token()?;
            return Err(e);
        }
        Err(e) => {
            log::warn!("Failed to fetch user profile: {}", e);
            (credential.display_name.clone(), None)
        }
    };

    let status = AuthStatus {
        authenticated: true,
        display_name,
        expires_at: Some(credential.expires_at),
        token_preview: Some(token_preview(&credential.access_token)),
        premium,
    };
    out.value(&status, || status.describe());
    Ok(())
}

/// Removes every stored key, including the PKCE verifier and flags.
pub fn clear(state: &AppState, out: Output) -> AppResult<()> {
    state.tokens.clear()?;
    out.value(&serde_json::json!({ "cleared": true }), || {
        "Stored credentials cleared".to_string()
    });
    Ok(())
}
