use crate::api::client::SpotifyClient;
use crate::api::models::{Device, DevicesResponse, PlayRequest, PlaybackSnapshot, TransferRequest};
use crate::error::AppResult;
use reqwest::StatusCode;

impl SpotifyClient {
    pub async fn get_player_status(&self, token: &str) -> AppResult<u16> {
        let response = self.get("/me/player", token).await?;
        Ok(response.status().as_u16())
    }

    /// `None` when nothing is loaded on any device (204 No Content).
    pub async fn get_playback_state(&self, token: &str) -> AppResult<Option<PlaybackSnapshot>> {
        let response = self.get("/me/player", token).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    pub async fn get_devices(&self, token: &str) -> AppResult<Vec<Device>> {
        let response = self.get("/me/player/devices", token).await?;
        let devices: DevicesResponse = response.json().await?;
        Ok(devices.devices)
    }

    pub async fn start_playback(&self, token: &str, device_id: &str, uri: &str) -> AppResult<()> {
        let body = serde_json::to_value(PlayRequest { uris: vec![uri] })?;
        log::info!("[start_playback] uri={} device={}", uri, device_id);
        self.put(
            "/me/player/play",
            token,
            &[("device_id", device_id)],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    pub async fn resume_playback(&self, token: &str, device_id: &str) -> AppResult<()> {
        self.put("/me/player/play", token, &[("device_id", device_id)], None)
            .await?;
        Ok(())
    }

    pub async fn pause_playback(&self, token: &str, device_id: &str) -> AppResult<()> {
        self.put("/me/player/pause", token, &[("device_id", device_id)], None)
            .await?;
        Ok(())
    }

    pub async fn transfer_playback(&self, token: &str, device_id: &str, play: bool) -> AppResult<()> {
        let body = serde_json::to_value(TransferRequest {
            device_ids: vec![device_id],
            play,
        })?;
        self.put("/me/player", token, &[], Some(&body)).await?;
        Ok(())
    }
}
