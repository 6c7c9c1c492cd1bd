use crate::error::{AppError, AppResult};
use crate::scanner::resolver::NATIVE_SCHEME;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

const CARD_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardLink {
    pub id: String,
    pub uri: String,
    pub url: String,
}

/// Builds the link printed on a card's QR code for a web track link.
///
/// The track id is the last path segment, without any query. The card id
/// is a stable hash of the full link, so reprinting a card keeps its id.
pub fn card_link(base_url: &str, track_url: &str) -> AppResult<CardLink> {
    let track_url = track_url.trim();
    let track_id = track_url
        .rsplit('/')
        .next()
        .and_then(|segment| segment.split('?').next())
        .filter(|id| !id.is_empty())
        .ok_or(AppError::MissingTrackData)?;

    let uri = format!("{}track:{}", NATIVE_SCHEME, track_id);
    let encoded = URL_SAFE.encode(uri.as_bytes());

    let digest = format!("{:x}", Sha256::digest(track_url.as_bytes()));
    let id = digest[..CARD_ID_LEN].to_string();

    let url = format!(
        "{}/index.html?id={}&track={}",
        base_url.trim_end_matches('/'),
        id,
        encoded
    );
    Ok(CardLink { id, uri, url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::resolver::resolve;

    const BASE: &str = "https://wilgoy23.github.io/MyHitster";

    #[test]
    fn card_link_resolves_back_to_the_track() {
        let link = card_link(
            BASE,
            "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc",
        )
        .unwrap();

        assert_eq!(link.uri, "spotify:track:4uLU6hMCjMI75M1A2tKUQC");
        assert!(link.url.starts_with(&format!("{}/index.html?id=", BASE)));

        let track = resolve(&link.url).unwrap();
        assert_eq!(track.uri, link.uri);
        assert_eq!(track.short_id.as_deref(), Some(link.id.as_str()));
    }

    #[test]
    fn card_id_is_a_stable_hash_prefix() {
        let a = card_link(BASE, "https://open.spotify.com/track/abc").unwrap();
        let b = card_link(&format!("{}/", BASE), "https://open.spotify.com/track/abc").unwrap();
        assert_eq!(a.id.len(), 12);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, b);

        let other = card_link(BASE, "https://open.spotify.com/track/abd").unwrap();
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn link_without_track_id_is_rejected() {
        assert!(matches!(
            card_link(BASE, "https://open.spotify.com/track/"),
            Err(AppError::MissingTrackData)
        ));
    }
}
