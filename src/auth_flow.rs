use crate::api::auth::{self, PkceChallenge, TokenExchange};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::playback::sdk::PlayerSdk;
use crate::storage::{Credential, TokenStore};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// How long the logout confirmation is given before logout counts as done.
pub const LOGOUT_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the user goes: the system browser for a CLI, a mock in tests.
pub trait Navigator: Send + Sync {
    /// Full navigation away from the current location.
    fn navigate(&self, url: &str) -> AppResult<()>;

    /// Opens a secondary window. `None` when the window cannot be tracked.
    fn open_popup(&self, url: &str) -> Option<Box<dyn Popup>>;

    /// Replaces the visible location without navigating (history rewrite).
    fn replace_location(&self, _url: &str) {}
}

pub trait Popup: Send {
    fn close(&mut self);
}

/// Opens URLs in the default browser.
pub struct SystemNavigator;

impl Navigator for SystemNavigator {
    fn navigate(&self, url: &str) -> AppResult<()> {
        log::info!("Opening browser for authentication...");
        open::that(url).map_err(|e| {
            AppError::Auth(format!(
                "Failed to open browser: {}. Please open manually: {}",
                e, url
            ))
        })
    }

    fn open_popup(&self, url: &str) -> Option<Box<dyn Popup>> {
        if let Err(e) = open::that(url) {
            log::warn!("Failed to open {}: {}", url, e);
        }
        // A system browser tab cannot be closed from here.
        None
    }
}

/// What a redirect back from the authorization endpoint carried.
#[derive(Debug, Clone, PartialEq)]
enum RedirectPayload {
    Token {
        access_token: String,
        expires_in: Option<u64>,
    },
    Code(String),
    Denied(String),
    Nothing,
}

fn parse_redirect(url: &Url) -> RedirectPayload {
    if let Some(fragment) = url.fragment() {
        let mut access_token = None;
        let mut expires_in = None;
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" if !value.is_empty() => access_token = Some(value.into_owned()),
                "expires_in" => expires_in = value.parse().ok(),
                _ => {}
            }
        }
        if let Some(access_token) = access_token {
            return RedirectPayload::Token {
                access_token,
                expires_in,
            };
        }
    }

    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => return RedirectPayload::Denied(value.into_owned()),
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            _ => {}
        }
    }

    code.map(RedirectPayload::Code)
        .unwrap_or(RedirectPayload::Nothing)
}

/// Location with the fragment removed, as shown after an implicit login.
pub fn scrub_fragment(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_fragment(None);
    clean.to_string()
}

pub struct AuthFlow {
    config: AppConfig,
    tokens: Arc<TokenStore>,
    exchange: Arc<dyn TokenExchange>,
    navigator: Arc<dyn Navigator>,
}

impl AuthFlow {
    pub fn new(
        config: AppConfig,
        tokens: Arc<TokenStore>,
        exchange: Arc<dyn TokenExchange>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config,
            tokens,
            exchange,
            navigator,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Starts a PKCE login and navigates to the authorization page.
    ///
    /// `origin` is where the user should land once the redirect is handled.
    /// Returns the authorization URL that was opened.
    pub fn login(&self, origin: &str) -> AppResult<String> {
        log::info!("Initiating Spotify login with PKCE");
        let forced = self.tokens.force_login();

        // Clearing first guarantees no verifier from an earlier attempt survives.
        self.tokens.clear()?;

        let pkce = PkceChallenge::generate();
        self.tokens.set_verifier(&pkce.verifier)?;
        self.tokens.set_origin(origin)?;

        let url = auth::build_auth_url(
            &self.config,
            &pkce.challenge,
            self.config.show_dialog || forced,
        );
        self.navigator.navigate(&url)?;
        Ok(url)
    }

    /// Handles the redirect back from the authorization endpoint.
    ///
    /// `Ok(None)` means the URL carried neither a token nor a code.
    pub async fn complete_from_redirect(&self, redirect: &str) -> AppResult<Option<Credential>> {
        let url = Url::parse(redirect)?;

        match parse_redirect(&url) {
            RedirectPayload::Token {
                access_token,
                expires_in,
            } => {
                log::info!("Found access_token in redirect fragment");
                self.tokens.take_verifier()?;
                let credential = Credential::new(
                    access_token,
                    expires_in.unwrap_or(self.config.implicit_expires_in),
                );
                self.tokens.put(&credential)?;
                self.navigator.replace_location(&scrub_fragment(&url));
                Ok(Some(credential))
            }
            RedirectPayload::Code(code) => {
                log::info!("Found authorization code, exchanging with PKCE verifier");
                let verifier = self.tokens.take_verifier()?.ok_or_else(|| {
                    AppError::Auth("No PKCE verifier stored for this login".into())
                })?;

                let token = self.exchange.exchange_code(&code, &verifier).await?;
                let credential = Credential::new(token.access_token, token.expires_in);
                self.tokens.put(&credential)?;
                if let Some(origin) = self.tokens.origin() {
                    log::info!("Returning to {}", origin);
                    self.navigator.replace_location(&origin);
                }
                Ok(Some(credential))
            }
            RedirectPayload::Denied(reason) => {
                log::error!("Authorization denied: {}", reason);
                self.tokens.take_verifier()?;
                Err(AppError::Auth(format!("Authorization denied: {}", reason)))
            }
            RedirectPayload::Nothing => {
                log::debug!("No credential found in redirect");
                Ok(None)
            }
        }
    }

    /// Redirect result if there is one, otherwise the persisted credential.
    pub async fn resume_session(&self, redirect: Option<&str>) -> AppResult<Option<Credential>> {
        if let Some(redirect) = redirect {
            if let Some(credential) = self.complete_from_redirect(redirect).await? {
                return Ok(Some(credential));
            }
        }
        Ok(self.tokens.get())
    }

    /// Signs out locally and asks the provider to end its session.
    ///
    /// Local state is cleared before this returns. The returned handle
    /// completes after [`LOGOUT_TIMEOUT`] whether or not the confirmation
    /// window was ever closed; callers may ignore it.
    pub fn logout(&self, session: Option<&dyn PlayerSdk>) -> AppResult<tokio::task::JoinHandle<()>> {
        log::info!("Logging out user");

        if let Some(session) = session {
            session.disconnect();
        }

        self.tokens.clear()?;
        self.tokens.set_force_login()?;

        let popup = self.navigator.open_popup(&auth::logout_url(&self.config));
        Ok(tokio::spawn(async move {
            tokio::time::sleep(LOGOUT_TIMEOUT).await;
            if let Some(mut popup) = popup {
                popup.close();
            }
            log::info!("Logout complete");
        }))
    }
}
