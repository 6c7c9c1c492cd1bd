use crate::api::client::WebApi;
use crate::api::user::{self, ProfileClient};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::events::{ActivationState, UiEvent};
use crate::playback::sdk::{PlayerOptions, PlayerSdk, SdkError, SdkEvent, SdkFactory, TokenProvider};
use crate::scanner::resolver::{short_label, TrackReference};
use crate::storage::TokenStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

const MOBILE_MARKERS: [&str; 4] = ["iphone", "ipad", "ipod", "android"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Disconnected,
    Connecting,
    Ready,
    ActivationPending,
    Playing,
    Paused,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// No track loaded; the caller should open the scanner.
    ScanRequested,
    ActivationRequired,
    Started,
    Resumed,
    Paused,
}

/// Platforms that block audio until a user gesture unlocks it.
pub fn is_mobile_platform(platform: &str) -> bool {
    let platform = platform.to_ascii_lowercase();
    MOBILE_MARKERS.iter().any(|m| platform.contains(m))
}

/// Owns the playback session and the player screen state.
///
/// Every user-visible change goes out on the `UiEvent` channel. Errors are
/// rendered there as well as returned, so callers can ignore the `Err`
/// values when all they need is the message on screen.
pub struct PlaybackController {
    options: PlayerOptions,
    mobile: bool,
    tokens: Arc<TokenStore>,
    api: Arc<dyn WebApi>,
    profiles: ProfileClient,
    factory: Arc<dyn SdkFactory>,
    ui: mpsc::UnboundedSender<UiEvent>,

    state: PlayerState,
    session: Option<Arc<dyn PlayerSdk>>,
    device_id: Option<String>,
    is_playing: bool,
    activated: bool,
    track: Option<TrackReference>,
}

impl PlaybackController {
    pub fn new(
        config: &AppConfig,
        tokens: Arc<TokenStore>,
        api: Arc<dyn WebApi>,
        factory: Arc<dyn SdkFactory>,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        let mobile = config.platform.as_deref().is_some_and(is_mobile_platform);
        Self {
            options: PlayerOptions {
                name: config.player_name.clone(),
                device_name: config.device_name.clone(),
                ..PlayerOptions::default()
            },
            mobile,
            profiles: ProfileClient::new(Arc::clone(&api), Arc::clone(&tokens)),
            tokens,
            api,
            factory,
            ui,
            state: PlayerState::Disconnected,
            session: None,
            device_id: None,
            is_playing: false,
            activated: false,
            track: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn track(&self) -> Option<&TrackReference> {
        self.track.as_ref()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_mobile(&self) -> bool {
        self.mobile
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Session connected and a device known.
    pub fn is_ready(&self) -> bool {
        self.session.is_some() && self.device_id.is_some()
    }

    pub fn session(&self) -> Option<Arc<dyn PlayerSdk>> {
        self.session.clone()
    }

    fn emit(&self, event: UiEvent) {
        if self.ui.send(event).is_err() {
            log::debug!("UI channel closed");
        }
    }

    fn show_error(&self, message: impl Into<String>) {
        let message = message.into();
        log::error!("Error: {}", message);
        self.emit(UiEvent::Error(message));
    }

    fn set_state(&mut self, state: PlayerState) {
        if self.state != state {
            log::debug!("Player state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Valid credential or a full reset back to the login screen.
    fn require_credential(&mut self) -> AppResult<String> {
        if let Some(token) = self.tokens.access_token() {
            return Ok(token);
        }
        self.teardown();
        self.show_error("Authentication token missing");
        self.emit(UiEvent::ShowLogin);
        Err(AppError::Auth("Authentication token missing".into()))
    }

    /// Creates and connects the playback session.
    ///
    /// The returned receiver carries the session's lifecycle events; feed
    /// each one to [`handle_event`](Self::handle_event).
    pub async fn start(&mut self) -> AppResult<mpsc::UnboundedReceiver<SdkEvent>> {
        self.require_credential()?;
        if self.session.is_some() {
            self.teardown();
        }

        self.set_state(PlayerState::Connecting);
        self.emit(UiEvent::Status("Initializing player...".into()));

        let (tx, rx) = mpsc::unbounded_channel();
        let session = match self.factory.create(
            self.options.clone(),
            TokenProvider::new(Arc::clone(&self.tokens)),
            tx,
        ) {
            Ok(session) => session,
            Err(e) => {
                self.show_error(format!("Player initialization failed: {}", e));
                self.set_state(PlayerState::Failed);
                return Err(e);
            }
        };
        self.session = Some(Arc::clone(&session));

        match session.connect().await {
            Ok(true) => {
                log::info!("Player session connected");
                Ok(rx)
            }
            Ok(false) => {
                self.show_error(SdkError::ConnectFailed.to_string());
                self.set_state(PlayerState::Failed);
                let _ = self.check_premium_status().await;
                Ok(rx)
            }
            Err(e) => {
                self.show_error(format!("Connection error: {}", e));
                self.set_state(PlayerState::Failed);
                Err(e)
            }
        }
    }

    pub async fn handle_event(&mut self, event: SdkEvent) {
        match event {
            SdkEvent::Ready { device_id } => {
                log::info!("Ready with Device ID {}", device_id);
                self.device_id = Some(device_id);
                self.emit(UiEvent::ShowPlayer);

                if self.mobile && !self.activated {
                    self.set_state(PlayerState::ActivationPending);
                    self.emit(UiEvent::Activation(ActivationState::Required));
                    self.emit(UiEvent::Status("Please activate the player first".into()));
                } else {
                    self.set_state(PlayerState::Ready);
                    let status = if self.track.is_some() {
                        "Tap to play mystery track"
                    } else {
                        "Scan a QR code to load a track"
                    };
                    self.emit(UiEvent::Status(status.into()));
                }

                let id = self.track.as_ref().and_then(|t| t.short_id.as_deref());
                self.emit(UiEvent::MysteryId(short_label(id)));
            }
            SdkEvent::NotReady { device_id } => {
                log::info!("Device not ready: {}", device_id);
            }
            SdkEvent::InitializationError { message } => {
                self.show_error(SdkError::Initialization(message).to_string());
                self.set_state(PlayerState::Failed);
            }
            SdkEvent::AuthenticationError { message } => {
                self.show_error(SdkError::Authentication(message).to_string());
                if let Err(e) = self.tokens.clear() {
                    log::warn!("Failed to clear credential: {}", e);
                }
                self.teardown();
                self.emit(UiEvent::ShowLogin);
                self.set_state(PlayerState::Failed);
            }
            SdkEvent::AccountError { message } => {
                log::warn!("Account error: {}", message);
                self.show_error(SdkError::Account("Premium required for playback".into()).to_string());
                self.set_state(PlayerState::Failed);
                let _ = self.check_premium_status().await;
            }
            SdkEvent::PlaybackError { message } => {
                self.show_error(SdkError::Playback(message).to_string());
            }
            SdkEvent::PlayerStateChanged(Some(remote)) => {
                let playing = !remote.paused;
                if playing && (self.track.is_none() || self.state == PlayerState::ActivationPending) {
                    log::debug!("Ignoring remote playback outside a loaded track");
                    return;
                }
                self.is_playing = playing;
                if matches!(
                    self.state,
                    PlayerState::Ready | PlayerState::Playing | PlayerState::Paused
                ) {
                    self.set_state(if playing {
                        PlayerState::Playing
                    } else {
                        PlayerState::Paused
                    });
                }
                self.emit(UiEvent::PlayButton { playing });
            }
            SdkEvent::PlayerStateChanged(None) => {}
        }
    }

    /// Unlocks audio on platforms that need a user gesture first.
    pub async fn activate(&mut self) -> AppResult<()> {
        let Some(session) = self.session.clone() else {
            return Err(SdkError::NotInitialized.into());
        };

        match session.activate_element().await {
            Ok(()) => {
                self.activated = true;
                if self.state == PlayerState::ActivationPending {
                    self.set_state(PlayerState::Ready);
                }
                self.emit(UiEvent::Activation(ActivationState::Done));
                self.emit(UiEvent::Status(
                    "Player activated for mobile. Tap play to begin.".into(),
                ));
                Ok(())
            }
            Err(e) => {
                self.show_error(format!("Could not activate player: {}", e));
                Err(e)
            }
        }
    }

    /// Replaces the loaded track. Does not start playback.
    pub fn load_track(&mut self, track: TrackReference) {
        log::info!("Loaded mystery track #{}", track.short_label());
        self.emit(UiEvent::MysteryId(track.short_label()));
        self.emit(UiEvent::Status("New mystery track loaded!".into()));
        self.track = Some(track);
    }

    pub async fn toggle_play_pause(&mut self) -> AppResult<ToggleOutcome> {
        let token = self.require_credential()?;

        let (Some(session), Some(device_id)) = (self.session.clone(), self.device_id.clone())
        else {
            self.show_error(SdkError::NotInitialized.to_string());
            return Err(SdkError::NotInitialized.into());
        };

        if !matches!(
            self.state,
            PlayerState::Ready
                | PlayerState::Paused
                | PlayerState::Playing
                | PlayerState::ActivationPending
        ) {
            log::warn!("Toggle refused in state {:?}", self.state);
            self.show_error("Player is not ready. Restart the player to try again.");
            return Err(SdkError::NotInitialized.into());
        }

        let Some(track) = self.track.clone() else {
            self.show_error("No track loaded. Please scan a QR code first.");
            self.emit(UiEvent::ScanRequested);
            return Ok(ToggleOutcome::ScanRequested);
        };

        if self.mobile && !self.activated {
            self.show_error("Please activate the player first");
            self.emit(UiEvent::Activation(ActivationState::Required));
            return Ok(ToggleOutcome::ActivationRequired);
        }

        if self.is_playing {
            return match session.pause().await {
                Ok(()) => {
                    self.is_playing = false;
                    self.set_state(PlayerState::Paused);
                    self.emit(UiEvent::PlayButton { playing: false });
                    Ok(ToggleOutcome::Paused)
                }
                Err(e) => Err(self.playback_failed(e)),
            };
        }

        let current_uri = match session.current_state().await {
            Ok(state) => state.and_then(|s| s.current_track_uri),
            Err(e) => {
                log::warn!("Could not read playback state: {}", e);
                None
            }
        };

        let result = if current_uri.as_deref() == Some(track.uri.as_str()) {
            session.resume().await.map(|()| ToggleOutcome::Resumed)
        } else {
            self.api
                .play(&token, &device_id, &track.uri)
                .await
                .map(|()| ToggleOutcome::Started)
        };

        match result {
            Ok(outcome) => {
                self.is_playing = true;
                self.set_state(PlayerState::Playing);
                self.emit(UiEvent::ShowTransport);
                self.emit(UiEvent::PlayButton { playing: true });
                Ok(outcome)
            }
            Err(e) => Err(self.playback_failed(e)),
        }
    }

    /// Shows a failed command. A rejected credential also ends the session.
    fn playback_failed(&mut self, err: AppError) -> AppError {
        self.show_error(match &err {
            AppError::SpotifyApi { message, .. } => message.clone(),
            other => other.to_string(),
        });
        if err.is_auth() {
            if let Err(e) = self.tokens.forget_token() {
                log::warn!("Failed to clear credential: {}", e);
            }
            self.teardown();
            self.emit(UiEvent::ShowLogin);
        }
        err
    }

    /// Drops the session. The loaded track survives.
    pub fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.disconnect();
        }
        self.device_id = None;
        self.is_playing = false;
        self.activated = false;
        self.set_state(PlayerState::Disconnected);
    }

    /// Explains a connection or account failure using the profile tier.
    ///
    /// Returns whether the account is premium; `Ok(false)` without a request
    /// when there is no credential.
    pub async fn check_premium_status(&mut self) -> AppResult<bool> {
        let Some(token) = self.tokens.access_token() else {
            return Ok(false);
        };

        let profile = match self.profiles.fetch_profile(&token).await {
            Ok(profile) => profile,
            Err(e) => {
                self.show_error(format!("Could not verify account type: {}", e));
                return Err(e);
            }
        };

        if let Some(name) = &profile.display_name {
            self.emit(UiEvent::UserInfo(name.clone()));
        }

        let premium = user::is_premium(&profile);
        if !premium {
            self.show_error(
                "Premium Account Required. Spotify requires a Premium subscription to use \
                 third-party players. Please log in with a Premium account.",
            );
        } else if self.mobile {
            self.emit(UiEvent::Status(
                "Premium account detected. Please activate the player for mobile.".into(),
            ));
            self.emit(UiEvent::Activation(ActivationState::Required));
        } else {
            self.emit(UiEvent::Status(
                "Your account is premium, but the player couldn't connect.".into(),
            ));
        }
        Ok(premium)
    }
}
