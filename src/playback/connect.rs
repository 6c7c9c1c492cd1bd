use crate::api::client::WebApi;
use crate::api::models::Device;
use crate::error::{AppError, AppResult};
use crate::playback::sdk::{
    PlayerOptions, PlayerSdk, SdkError, SdkEvent, SdkFactory, SdkPlaybackState, TokenProvider,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Playback session that drives an existing Spotify Connect device through
/// the Web API instead of producing audio itself.
pub struct ConnectSdk {
    api: Arc<dyn WebApi>,
    options: PlayerOptions,
    token: TokenProvider,
    events: mpsc::UnboundedSender<SdkEvent>,
    device_id: Mutex<Option<String>>,
    connected: AtomicBool,
}

impl ConnectSdk {
    pub fn new(
        api: Arc<dyn WebApi>,
        options: PlayerOptions,
        token: TokenProvider,
        events: mpsc::UnboundedSender<SdkEvent>,
    ) -> Self {
        Self {
            api,
            options,
            token,
            events,
            device_id: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn emit(&self, event: SdkEvent) {
        if self.events.send(event).is_err() {
            log::debug!("No listener for player events");
        }
    }

    fn token(&self) -> AppResult<String> {
        self.token
            .token()
            .ok_or_else(|| AppError::Auth("Authentication token missing".into()))
    }

    fn device(&self) -> AppResult<String> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SdkError::NotInitialized.into());
        }
        self.device_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SdkError::NotInitialized.into())
    }

    /// Routes API failures to the matching lifecycle event.
    fn report(&self, err: &AppError) {
        match err {
            AppError::Auth(message) => self.emit(SdkEvent::AuthenticationError {
                message: message.clone(),
            }),
            AppError::Permission(message) => self.emit(SdkEvent::AccountError {
                message: message.clone(),
            }),
            other => self.emit(SdkEvent::PlaybackError {
                message: other.to_string(),
            }),
        }
    }
}

/// Configured device by name, else the active one, else the first listed.
pub fn pick_device<'a>(devices: &'a [Device], preferred: Option<&str>) -> Option<&'a Device> {
    let usable = || devices.iter().filter(|d| d.id.is_some());

    if let Some(name) = preferred {
        if let Some(device) = usable().find(|d| d.name.eq_ignore_ascii_case(name)) {
            return Some(device);
        }
        log::warn!("Device '{}' not found, falling back", name);
    }

    usable().find(|d| d.is_active).or_else(|| usable().next())
}

#[async_trait]
impl PlayerSdk for ConnectSdk {
    async fn connect(&self) -> AppResult<bool> {
        let token = match self.token() {
            Ok(token) => token,
            Err(e) => {
                self.report(&e);
                return Ok(false);
            }
        };

        let devices = match self.api.devices(&token).await {
            Ok(devices) => devices,
            Err(e @ (AppError::Auth(_) | AppError::Permission(_))) => {
                self.report(&e);
                return Ok(true);
            }
            Err(e) => return Err(e),
        };

        let Some(device) = pick_device(&devices, self.options.device_name.as_deref()) else {
            self.emit(SdkEvent::InitializationError {
                message: "No Spotify Connect device available. Open Spotify on a device first."
                    .into(),
            });
            return Ok(true);
        };

        let device_id = device.id.clone().unwrap_or_default();
        log::info!(
            "[{}] Using device {} ({})",
            self.options.name,
            device.name,
            device.device_type
        );
        *self.device_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(device_id.clone());
        self.connected.store(true, Ordering::SeqCst);
        self.emit(SdkEvent::Ready { device_id });
        Ok(true)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let device_id = self
                .device_id
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(device_id) = device_id {
                self.emit(SdkEvent::NotReady { device_id });
            }
        }
    }

    async fn activate_element(&self) -> AppResult<()> {
        let device_id = self.device()?;
        let token = self.token()?;
        self.api.transfer(&token, &device_id, false).await
    }

    async fn current_state(&self) -> AppResult<Option<SdkPlaybackState>> {
        let token = self.token()?;
        let snapshot = self.api.playback_state(&token).await?;
        Ok(snapshot.map(|s| SdkPlaybackState {
            paused: !s.is_playing,
            current_track_uri: s.item.map(|i| i.uri),
        }))
    }

    async fn resume(&self) -> AppResult<()> {
        let device_id = self.device()?;
        let token = self.token()?;
        let result = self.api.resume(&token, &device_id).await;
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    async fn pause(&self) -> AppResult<()> {
        let device_id = self.device()?;
        let token = self.token()?;
        let result = self.api.pause(&token, &device_id).await;
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }
}

pub struct ConnectSdkFactory {
    api: Arc<dyn WebApi>,
}

impl ConnectSdkFactory {
    pub fn new(api: Arc<dyn WebApi>) -> Self {
        Self { api }
    }
}

impl SdkFactory for ConnectSdkFactory {
    fn create(
        &self,
        options: PlayerOptions,
        token: TokenProvider,
        events: mpsc::UnboundedSender<SdkEvent>,
    ) -> AppResult<Arc<dyn PlayerSdk>> {
        Ok(Arc::new(ConnectSdk::new(
            Arc::clone(&self.api),
            options,
            token,
            events,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{PlaybackItem, PlaybackSnapshot};
    use crate::storage::{Credential, TokenStore};
    use crate::test_support::{device, Fail, MockApi};

    fn session(
        api: Arc<MockApi>,
        device_name: Option<&str>,
    ) -> (ConnectSdk, Arc<TokenStore>, mpsc::UnboundedReceiver<SdkEvent>) {
        let tokens = Arc::new(TokenStore::in_memory());
        tokens.put(&Credential::new("tok", 3600)).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let options = PlayerOptions {
            device_name: device_name.map(String::from),
            ..PlayerOptions::default()
        };
        let sdk = ConnectSdk::new(api, options, TokenProvider::new(tokens.clone()), tx);
        (sdk, tokens, rx)
    }

    #[test]
    fn device_choice_prefers_name_then_active_then_first() {
        let mut kitchen = device("k", "Kitchen", "Speaker");
        let phone = device("p", "Phone", "Smartphone");
        let devices = vec![phone.clone(), kitchen.clone()];

        assert_eq!(pick_device(&devices, Some("kitchen")).unwrap().name, "Kitchen");
        assert_eq!(pick_device(&devices, None).unwrap().name, "Phone");

        kitchen.is_active = true;
        let devices = vec![phone, kitchen];
        assert_eq!(pick_device(&devices, Some("Garage")).unwrap().name, "Kitchen");
        assert!(pick_device(&[], None).is_none());
    }

    #[tokio::test]
    async fn connect_reports_ready_with_device_id() {
        let api = Arc::new(MockApi::default());
        api.set_devices(Ok(vec![device("dev-1", "Kitchen", "Speaker")]));
        let (sdk, _tokens, mut rx) = session(api, None);

        assert!(sdk.connect().await.unwrap());
        assert_eq!(
            rx.recv().await.unwrap(),
            SdkEvent::Ready {
                device_id: "dev-1".into()
            }
        );
    }

    #[tokio::test]
    async fn forbidden_device_list_is_an_account_error() {
        let api = Arc::new(MockApi::default());
        api.set_devices(Err(Fail::Permission));
        let (sdk, _tokens, mut rx) = session(api, None);

        assert!(sdk.connect().await.unwrap());
        assert!(matches!(
            rx.recv().await.unwrap(),
            SdkEvent::AccountError { .. }
        ));
    }

    #[tokio::test]
    async fn missing_token_is_an_authentication_error() {
        let api = Arc::new(MockApi::default());
        let (sdk, tokens, mut rx) = session(api, None);
        tokens.clear().unwrap();

        assert!(!sdk.connect().await.unwrap());
        assert!(matches!(
            rx.recv().await.unwrap(),
            SdkEvent::AuthenticationError { .. }
        ));
    }

    #[tokio::test]
    async fn no_devices_is_an_initialization_error() {
        let api = Arc::new(MockApi::default());
        let (sdk, _tokens, mut rx) = session(api, None);

        assert!(sdk.connect().await.unwrap());
        assert!(matches!(
            rx.recv().await.unwrap(),
            SdkEvent::InitializationError { .. }
        ));
        assert!(matches!(
            sdk.pause().await,
            Err(AppError::Sdk(SdkError::NotInitialized))
        ));
    }

    #[tokio::test]
    async fn commands_use_the_latest_token() {
        let api = Arc::new(MockApi::default());
        api.set_devices(Ok(vec![device("dev-1", "Kitchen", "Speaker")]));
        let (sdk, tokens, _rx) = session(api.clone(), None);
        sdk.connect().await.unwrap();

        tokens.put(&Credential::new("rotated", 3600)).unwrap();
        sdk.pause().await.unwrap();

        assert_eq!(api.calls().last().unwrap(), "pause dev-1 as rotated");
    }

    #[tokio::test]
    async fn current_state_maps_snapshot() {
        let api = Arc::new(MockApi::default());
        api.set_devices(Ok(vec![device("dev-1", "Kitchen", "Speaker")]));
        api.set_playback(Some(PlaybackSnapshot {
            is_playing: false,
            item: Some(PlaybackItem {
                uri: "spotify:track:abc".into(),
            }),
            device: None,
        }));
        let (sdk, _tokens, mut rx) = session(api, None);

        let state = sdk.current_state().await.unwrap().unwrap();
        assert!(state.paused);
        assert_eq!(state.current_track_uri.as_deref(), Some("spotify:track:abc"));
        assert!(rx.try_recv().is_err());
    }

    async fn connected(api: Arc<MockApi>) -> (ConnectSdk, mpsc::UnboundedReceiver<SdkEvent>) {
        api.set_devices(Ok(vec![device("dev-1", "Kitchen", "Speaker")]));
        let (sdk, _tokens, mut rx) = session(api, None);
        sdk.connect().await.unwrap();
        let _ready = rx.recv().await;
        (sdk, rx)
    }

    #[tokio::test]
    async fn rejected_pause_is_an_authentication_error() {
        let api = Arc::new(MockApi::default());
        let (sdk, mut rx) = connected(api.clone()).await;
        api.set_control_result(Err(Fail::Auth));

        assert!(sdk.pause().await.unwrap_err().is_auth());
        assert!(matches!(
            rx.try_recv().unwrap(),
            SdkEvent::AuthenticationError { .. }
        ));
    }

    #[tokio::test]
    async fn forbidden_resume_is_an_account_error() {
        let api = Arc::new(MockApi::default());
        let (sdk, mut rx) = connected(api.clone()).await;
        api.set_control_result(Err(Fail::Permission));

        assert!(matches!(
            sdk.resume().await,
            Err(AppError::Permission(_))
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            SdkEvent::AccountError {
                message: "Player command failed: Premium required".into()
            }
        );
    }

    #[tokio::test]
    async fn other_control_failures_are_playback_errors() {
        let api = Arc::new(MockApi::default());
        let (sdk, mut rx) = connected(api.clone()).await;
        api.set_control_result(Err(Fail::Status(502)));

        assert!(sdk.pause().await.is_err());
        assert!(matches!(
            rx.try_recv().unwrap(),
            SdkEvent::PlaybackError { .. }
        ));
    }

    #[tokio::test]
    async fn failed_activation_is_returned_to_the_caller() {
        let api = Arc::new(MockApi::default());
        let (sdk, mut rx) = connected(api.clone()).await;
        api.set_control_result(Err(Fail::Status(500)));

        assert!(sdk.activate_element().await.is_err());
        assert_eq!(
            api.calls().last().unwrap(),
            "transfer dev-1 play=false as tok"
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_reports_not_ready_once() {
        let api = Arc::new(MockApi::default());
        api.set_devices(Ok(vec![device("dev-1", "Kitchen", "Speaker")]));
        let (sdk, _tokens, mut rx) = session(api, None);
        sdk.connect().await.unwrap();
        let _ready = rx.recv().await;

        sdk.disconnect();
        sdk.disconnect();
        assert_eq!(
            rx.recv().await.unwrap(),
            SdkEvent::NotReady {
                device_id: "dev-1".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
