use crate::api::models::{
    ApiErrorBody, Device, OAuthErrorBody, PlaybackSnapshot, ProfileSnapshot,
};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;

/// Bearer-authenticated Web API surface used by the player and the
/// diagnostic runner. Every call takes the token explicitly.
#[async_trait]
pub trait WebApi: Send + Sync {
    async fn profile(&self, token: &str) -> AppResult<ProfileSnapshot>;

    /// Status of `GET /me/player` (200 or 204 on success).
    async fn player_status(&self, token: &str) -> AppResult<u16>;

    async fn playback_state(&self, token: &str) -> AppResult<Option<PlaybackSnapshot>>;

    async fn devices(&self, token: &str) -> AppResult<Vec<Device>>;

    async fn play(&self, token: &str, device_id: &str, uri: &str) -> AppResult<()>;

    async fn resume(&self, token: &str, device_id: &str) -> AppResult<()>;

    async fn pause(&self, token: &str, device_id: &str) -> AppResult<()>;

    async fn transfer(&self, token: &str, device_id: &str, play: bool) -> AppResult<()>;
}

pub struct SpotifyClient {
    http: reqwest::Client,
    api_url: String,
    accounts_url: String,
    client_id: String,
    redirect_uri: String,
}

impl SpotifyClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("HitsterPlayer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            accounts_url: config.accounts_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn accounts_url(&self) -> &str {
        &self.accounts_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn auth_headers(token: &str) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth_value = format!("Bearer {}", token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| AppError::Auth(e.to_string()))?,
        );
        Ok(headers)
    }

    pub async fn get(&self, path: &str, token: &str) -> AppResult<reqwest::Response> {
        let url = self.url(path);
        log::debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .headers(Self::auth_headers(token)?)
            .send()
            .await?;
        log::debug!("GET {} -> {}", url, response.status());
        check_response(response).await
    }

    pub async fn put(
        &self,
        path: &str,
        token: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> AppResult<reqwest::Response> {
        let url = self.url(path);
        log::debug!("PUT {}", url);
        let mut request = self
            .http
            .put(&url)
            .headers(Self::auth_headers(token)?)
            .query(query);
        request = match body {
            Some(body) => request.json(body),
            // The player endpoints reject a PUT without a length header.
            None => request.header(reqwest::header::CONTENT_LENGTH, "0"),
        };

        let response = request.send().await?;
        log::debug!("PUT {} -> {}", url, response.status());
        check_response(response).await
    }
}

/// Maps a non-2xx response onto the error kinds the UI distinguishes.
pub(crate) async fn check_response(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        } else {
            body.clone()
        }
    });

    Err(match status {
        StatusCode::UNAUTHORIZED => AppError::Auth(message),
        StatusCode::FORBIDDEN => AppError::Permission(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        _ => AppError::SpotifyApi {
            status: status.as_u16(),
            message,
        },
    })
}

/// Pulls the human-readable message out of an API or accounts error body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    if let Ok(api) = serde_json::from_str::<ApiErrorBody>(body) {
        return api.error.message;
    }
    serde_json::from_str::<OAuthErrorBody>(body)
        .ok()
        .map(|e| e.error_description.unwrap_or(e.error))
}

#[async_trait]
impl WebApi for SpotifyClient {
    async fn profile(&self, token: &str) -> AppResult<ProfileSnapshot> {
        self.get_profile(token).await
    }

    async fn player_status(&self, token: &str) -> AppResult<u16> {
        self.get_player_status(token).await
    }

    async fn playback_state(&self, token: &str) -> AppResult<Option<PlaybackSnapshot>> {
        self.get_playback_state(token).await
    }

    async fn devices(&self, token: &str) -> AppResult<Vec<Device>> {
        self.get_devices(token).await
    }

    async fn play(&self, token: &str, device_id: &str, uri: &str) -> AppResult<()> {
        self.start_playback(token, device_id, uri).await
    }

    async fn resume(&self, token: &str, device_id: &str) -> AppResult<()> {
        self.resume_playback(token, device_id).await
    }

    async fn pause(&self, token: &str, device_id: &str) -> AppResult<()> {
        self.pause_playback(token, device_id).await
    }

    async fn transfer(&self, token: &str, device_id: &str, play: bool) -> AppResult<()> {
        self.transfer_playback(token, device_id, play).await
    }
}
