use crate::error::{AppError, AppResult};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use rand::Rng;
use serde::Serialize;
use url::Url;

pub const NATIVE_SCHEME: &str = "spotify:";
pub const WEB_HOST: &str = "open.spotify.com";

const SHORT_ID_LEN: usize = 6;

/// Card payloads are written with or without padding.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackReference {
    pub uri: String,
    pub short_id: Option<String>,
}

impl TrackReference {
    /// The id shown on screen: first six characters, or "unknown".
    pub fn short_label(&self) -> String {
        short_label(self.short_id.as_deref())
    }
}

pub fn short_label(short_id: Option<&str>) -> String {
    match short_id {
        Some(id) if !id.is_empty() => id.chars().take(SHORT_ID_LEN).collect(),
        _ => "unknown".to_string(),
    }
}

fn random_short_id() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{:06x}", n)
}

/// Turns scanned QR text into a playable track reference.
///
/// Recognized shapes, first match wins: a card link with a base64url
/// `track` parameter, a native `spotify:` URI, a web `/track/<id>` link.
pub fn resolve(scanned: &str) -> AppResult<TrackReference> {
    let text = scanned.trim();

    if text.contains("track=") {
        return resolve_card_link(text);
    }

    if text.starts_with(NATIVE_SCHEME) {
        return Ok(TrackReference {
            uri: text.to_string(),
            short_id: Some(random_short_id()),
        });
    }

    if text.contains(WEB_HOST) {
        let id = text
            .split_once("/track/")
            .map(|(_, rest)| rest.split('?').next().unwrap_or(""))
            .filter(|id| !id.is_empty())
            .ok_or(AppError::MissingTrackData)?;

        return Ok(TrackReference {
            uri: format!("{}track:{}", NATIVE_SCHEME, id),
            short_id: Some(random_short_id()),
        });
    }

    Err(AppError::UnrecognizedFormat)
}

fn resolve_card_link(text: &str) -> AppResult<TrackReference> {
    let url = Url::parse(text).map_err(|e| AppError::MalformedTrackData(e.to_string()))?;

    let mut encoded = None;
    let mut short_id = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "track" if encoded.is_none() => encoded = Some(value.into_owned()),
            "id" if short_id.is_none() => short_id = Some(value.into_owned()),
            _ => {}
        }
    }

    let encoded = encoded
        .filter(|t| !t.is_empty())
        .ok_or(AppError::MissingTrackData)?;

    Ok(TrackReference {
        uri: decode_track_param(&encoded)?,
        short_id: short_id.filter(|id| !id.is_empty()),
    })
}

/// Reverses the URL-safe substitution, then decodes standard base64.
pub fn decode_track_param(encoded: &str) -> AppResult<String> {
    let standard = encoded.replace('-', "+").replace('_', "/");
    let bytes = LENIENT_STANDARD
        .decode(standard.as_bytes())
        .map_err(|e| AppError::MalformedTrackData(format!("bad track encoding: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| AppError::MalformedTrackData("track is not valid text".into()))
}
