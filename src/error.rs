use crate::playback::sdk::SdkError;
use crate::scanner::camera::CameraError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Permission denied (403 Forbidden): {0}")]
    Permission(String),

    #[error("Unrecognized QR code format")]
    UnrecognizedFormat,

    #[error("Invalid QR code: Missing track data")]
    MissingTrackData,

    #[error("Invalid QR code: {0}")]
    MalformedTrackData(String),

    #[error("{0}")]
    Device(#[from] CameraError),

    #[error("{0}")]
    Sdk(#[from] SdkError),

    #[error("Spotify API error: {status} - {message}")]
    SpotifyApi { status: u16, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl AppError {
    pub fn kind(&self) -> &str {
        match self {
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::Url(_) => "url",
            AppError::Io(_) => "io",
            AppError::Auth(_) => "auth",
            AppError::Permission(_) => "permission",
            AppError::UnrecognizedFormat => "unrecognized_format",
            AppError::MissingTrackData => "missing_track_data",
            AppError::MalformedTrackData(_) => "malformed_track_data",
            AppError::Device(_) => "device",
            AppError::Sdk(_) => "sdk",
            AppError::SpotifyApi { .. } => "spotify_api",
            AppError::Config(_) => "config",
            AppError::NotFound(_) => "not_found",
        }
    }

    /// True when the error means the stored credential is no longer usable.
    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_kind_and_message() {
        let err = AppError::SpotifyApi {
            status: 429,
            message: "slow down".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "spotify_api");
        assert_eq!(json["message"], "Spotify API error: 429 - slow down");
    }

    #[test]
    fn qr_errors_read_as_status_text() {
        assert_eq!(
            AppError::MissingTrackData.to_string(),
            "Invalid QR code: Missing track data"
        );
        assert_eq!(
            AppError::UnrecognizedFormat.to_string(),
            "Unrecognized QR code format"
        );
    }
}
