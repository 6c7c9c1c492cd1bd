use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Raw `/me` payload.
#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageObject {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub tier: Option<String>,
    pub image_url: Option<String>,
}

impl From<ProfileResponse> for ProfileSnapshot {
    fn from(raw: ProfileResponse) -> Self {
        Self {
            id: raw.id,
            display_name: raw.display_name.filter(|n| !n.is_empty()),
            email: raw.email,
            country: raw.country,
            tier: raw.product,
            image_url: raw.images.into_iter().next().map(|i| i.url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Subset of `/me/player` used for play/resume decisions.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackSnapshot {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub item: Option<PlaybackItem>,
    #[serde(default)]
    pub device: Option<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackItem {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The error body of the accounts service uses a different shape.
#[derive(Debug, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlayRequest<'a> {
    pub uris: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct TransferRequest<'a> {
    pub device_ids: Vec<&'a str>,
    pub play: bool,
}
