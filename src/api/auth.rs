use crate::api::client::{check_response, SpotifyClient};
use crate::api::models::TokenResponse;
use crate::config::AppConfig;
use crate::error::AppResult;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let verifier_bytes: Vec<u8> = (0..32).map(|_| rng.gen::<u8>()).collect();
        let verifier = URL_SAFE_NO_PAD.encode(&verifier_bytes);
        let challenge = code_challenge(&verifier);

        Self {
            verifier,
            challenge,
        }
    }
}

/// `BASE64URL(SHA256(verifier))`, unpadded.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

pub fn build_auth_url(config: &AppConfig, code_challenge: &str, show_dialog: bool) -> String {
    let mut url = format!(
        "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&code_challenge_method=S256&code_challenge={}",
        config.accounts_url.trim_end_matches('/'),
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&config.scope_string()),
        code_challenge
    );
    if show_dialog {
        url.push_str("&show_dialog=true");
    }
    url
}

pub fn logout_url(config: &AppConfig) -> String {
    format!("{}/logout", config.accounts_url.trim_end_matches('/'))
}

/// The token endpoint side of the PKCE flow.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AppResult<TokenResponse>;
}

#[async_trait]
impl TokenExchange for SpotifyClient {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AppResult<TokenResponse> {
        // PKCE exchange: no client secret, the verifier proves the caller.
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri()),
            ("client_id", self.client_id()),
            ("code_verifier", code_verifier),
        ];

        let url = format!("{}/api/token", self.accounts_url());
        let response = self.http_client().post(&url).form(&params).send().await?;
        let response = check_response(response).await?;

        let token: TokenResponse = response.json().await?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_is_url_safe_and_unique() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();
        assert_eq!(a.verifier.len(), 43);
        assert!(a
            .verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn challenge_matches_rfc7636_example() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn auth_url_carries_pkce_and_scopes() {
        let config = AppConfig::default();
        let url = build_auth_url(&config, "CHALLENGE", true);
        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge_method=S256&code_challenge=CHALLENGE"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8888%2Fcallback"));
        assert!(url.contains("scope=streaming%20user-read-email"));
        assert!(url.ends_with("&show_dialog=true"));

        assert!(!build_auth_url(&config, "CHALLENGE", false).contains("show_dialog"));
    }
}
