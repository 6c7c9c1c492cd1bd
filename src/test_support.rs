//! Hand-written doubles shared by the unit tests.

use crate::api::auth::TokenExchange;
use crate::api::client::WebApi;
use crate::api::models::{Device, PlaybackSnapshot, ProfileSnapshot, TokenResponse};
use crate::auth_flow::{Navigator, Popup};
use crate::error::{AppError, AppResult};
use crate::playback::sdk::{
    PlayerOptions, PlayerSdk, SdkEvent, SdkFactory, SdkPlaybackState, TokenProvider,
};
use crate::scanner::camera::{Camera, CameraError, CameraStream, Frame};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Cloneable stand-in for an error a double should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    Auth,
    Permission,
    Status(u16),
}

impl Fail {
    pub fn to_error(self) -> AppError {
        match self {
            Fail::Auth => AppError::Auth("The access token expired".into()),
            Fail::Permission => AppError::Permission("Player command failed: Premium required".into()),
            Fail::Status(status) => AppError::SpotifyApi {
                status,
                message: format!("request failed with {}", status),
            },
        }
    }
}

fn replay<T: Clone>(slot: &Mutex<Result<T, Fail>>) -> AppResult<T> {
    slot.lock().unwrap().clone().map_err(Fail::to_error)
}

pub fn profile(id: &str, tier: Option<&str>) -> ProfileSnapshot {
    ProfileSnapshot {
        id: id.to_string(),
        display_name: Some(id.to_string()),
        email: Some(format!("{}@example.com", id)),
        country: Some("NL".to_string()),
        tier: tier.map(String::from),
        image_url: None,
    }
}

pub fn device(id: &str, name: &str, device_type: &str) -> Device {
    Device {
        id: Some(id.to_string()),
        name: name.to_string(),
        device_type: device_type.to_string(),
        is_active: false,
    }
}

/// Scripted Web API. Every call is recorded as `"<op> ... as <token>"`.
pub struct MockApi {
    profile: Mutex<Result<ProfileSnapshot, Fail>>,
    player_status: Mutex<Result<u16, Fail>>,
    playback: Mutex<Option<PlaybackSnapshot>>,
    devices: Mutex<Result<Vec<Device>, Fail>>,
    play: Mutex<Result<(), Fail>>,
    control: Mutex<Result<(), Fail>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            profile: Mutex::new(Ok(profile("mock_user", Some("premium")))),
            player_status: Mutex::new(Ok(200)),
            playback: Mutex::new(None),
            devices: Mutex::new(Ok(Vec::new())),
            play: Mutex::new(Ok(())),
            control: Mutex::new(Ok(())),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockApi {
    pub fn set_profile(&self, result: Result<ProfileSnapshot, Fail>) {
        *self.profile.lock().unwrap() = result;
    }

    pub fn set_player_status(&self, result: Result<u16, Fail>) {
        *self.player_status.lock().unwrap() = result;
    }

    pub fn set_playback(&self, snapshot: Option<PlaybackSnapshot>) {
        *self.playback.lock().unwrap() = snapshot;
    }

    pub fn set_devices(&self, result: Result<Vec<Device>, Fail>) {
        *self.devices.lock().unwrap() = result;
    }

    pub fn set_play_result(&self, result: Result<(), Fail>) {
        *self.play.lock().unwrap() = result;
    }

    /// Result of resume, pause and transfer.
    pub fn set_control_result(&self, result: Result<(), Fail>) {
        *self.control.lock().unwrap() = result;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl WebApi for MockApi {
    async fn profile(&self, token: &str) -> AppResult<ProfileSnapshot> {
        self.record(format!("profile as {}", token));
        replay(&self.profile)
    }

    async fn player_status(&self, token: &str) -> AppResult<u16> {
        self.record(format!("player as {}", token));
        replay(&self.player_status)
    }

    async fn playback_state(&self, token: &str) -> AppResult<Option<PlaybackSnapshot>> {
        self.record(format!("state as {}", token));
        Ok(self.playback.lock().unwrap().clone())
    }

    async fn devices(&self, token: &str) -> AppResult<Vec<Device>> {
        self.record(format!("devices as {}", token));
        replay(&self.devices)
    }

    async fn play(&self, token: &str, device_id: &str, uri: &str) -> AppResult<()> {
        self.record(format!("play {} on {} as {}", uri, device_id, token));
        replay(&self.play)
    }

    async fn resume(&self, token: &str, device_id: &str) -> AppResult<()> {
        self.record(format!("resume {} as {}", device_id, token));
        replay(&self.control)
    }

    async fn pause(&self, token: &str, device_id: &str) -> AppResult<()> {
        self.record(format!("pause {} as {}", device_id, token));
        replay(&self.control)
    }

    async fn transfer(&self, token: &str, device_id: &str, play: bool) -> AppResult<()> {
        self.record(format!("transfer {} play={} as {}", device_id, play, token));
        replay(&self.control)
    }
}

/// Playback session double. Events queued with `emit_on_connect` are sent
/// when `connect` succeeds.
pub struct MockSdk {
    events: Mutex<Option<mpsc::UnboundedSender<SdkEvent>>>,
    token: Mutex<Option<TokenProvider>>,
    connect_result: Mutex<Result<bool, Fail>>,
    on_connect: Mutex<Vec<SdkEvent>>,
    activate_result: Mutex<Result<(), Fail>>,
    state: Mutex<Option<SdkPlaybackState>>,
    calls: Mutex<Vec<String>>,
    connects: AtomicUsize,
    disconnected: AtomicBool,
}

impl MockSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(None),
            token: Mutex::new(None),
            connect_result: Mutex::new(Ok(true)),
            on_connect: Mutex::new(Vec::new()),
            activate_result: Mutex::new(Ok(())),
            state: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn attach(&self, token: TokenProvider, events: mpsc::UnboundedSender<SdkEvent>) {
        *self.token.lock().unwrap() = Some(token);
        *self.events.lock().unwrap() = Some(events);
    }

    pub fn emit_on_connect(&self, event: SdkEvent) {
        self.on_connect.lock().unwrap().push(event);
    }

    pub fn set_connect_result(&self, result: Result<bool, Fail>) {
        *self.connect_result.lock().unwrap() = result;
    }

    pub fn set_activate_result(&self, result: Result<(), Fail>) {
        *self.activate_result.lock().unwrap() = result;
    }

    pub fn set_state(&self, state: Option<SdkPlaybackState>) {
        *self.state.lock().unwrap() = state;
    }

    /// What the session would send as its token right now.
    pub fn current_token(&self) -> Option<String> {
        self.token.lock().unwrap().as_ref().and_then(|t| t.token())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl PlayerSdk for MockSdk {
    async fn connect(&self) -> AppResult<bool> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.record("connect");
        let connected = replay(&self.connect_result)?;
        if connected {
            let queued: Vec<SdkEvent> = self.on_connect.lock().unwrap().clone();
            if let Some(events) = self.events.lock().unwrap().as_ref() {
                for event in queued {
                    let _ = events.send(event);
                }
            }
        }
        Ok(connected)
    }

    fn disconnect(&self) {
        self.record("disconnect");
        self.disconnected.store(true, Ordering::SeqCst);
    }

    async fn activate_element(&self) -> AppResult<()> {
        self.record("activate");
        replay(&self.activate_result)
    }

    async fn current_state(&self) -> AppResult<Option<SdkPlaybackState>> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn resume(&self) -> AppResult<()> {
        self.record("resume");
        Ok(())
    }

    async fn pause(&self) -> AppResult<()> {
        self.record("pause");
        Ok(())
    }
}

pub struct MockSdkFactory {
    sdk: Arc<MockSdk>,
    fail: AtomicBool,
}

impl MockSdkFactory {
    pub fn new(sdk: Arc<MockSdk>) -> Self {
        Self {
            sdk,
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail_create(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl SdkFactory for MockSdkFactory {
    fn create(
        &self,
        _options: PlayerOptions,
        token: TokenProvider,
        events: mpsc::UnboundedSender<SdkEvent>,
    ) -> AppResult<Arc<dyn PlayerSdk>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Fail::Status(500).to_error());
        }
        self.sdk.attach(token, events);
        Ok(self.sdk.clone())
    }
}

#[derive(Default)]
pub struct MockNavigator {
    navigations: Mutex<Vec<String>>,
    replaced: Mutex<Vec<String>>,
    popups: Mutex<Vec<String>>,
    popup_closed: Arc<AtomicBool>,
}

impl MockNavigator {
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn replaced(&self) -> Vec<String> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn popups(&self) -> Vec<String> {
        self.popups.lock().unwrap().clone()
    }

    pub fn popup_closed(&self) -> bool {
        self.popup_closed.load(Ordering::SeqCst)
    }
}

struct MockPopup {
    closed: Arc<AtomicBool>,
}

impl Popup for MockPopup {
    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Navigator for MockNavigator {
    fn navigate(&self, url: &str) -> AppResult<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn open_popup(&self, url: &str) -> Option<Box<dyn Popup>> {
        self.popups.lock().unwrap().push(url.to_string());
        Some(Box::new(MockPopup {
            closed: Arc::clone(&self.popup_closed),
        }))
    }

    fn replace_location(&self, url: &str) {
        self.replaced.lock().unwrap().push(url.to_string());
    }
}

pub struct MockExchange {
    response: Mutex<Result<TokenResponse, Fail>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self {
            response: Mutex::new(Err(Fail::Status(400))),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockExchange {
    pub fn set_response(&self, response: Result<TokenResponse, Fail>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchange for MockExchange {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AppResult<TokenResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((code.to_string(), code_verifier.to_string()));
        replay(&self.response)
    }
}

/// Camera whose queued frames survive `open`, unlike the channel camera.
pub struct FakeCamera {
    frames: Arc<Mutex<VecDeque<String>>>,
    ready: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    open_error: Mutex<Option<CameraError>>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Arc::new(Mutex::new(VecDeque::new())),
            ready: Arc::new(AtomicBool::new(true)),
            released: Arc::new(AtomicBool::new(false)),
            open_error: Mutex::new(None),
        })
    }

    pub fn push(&self, text: &str) {
        self.frames.lock().unwrap().push_back(text.to_string());
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn fail_open(&self, err: CameraError) {
        *self.open_error.lock().unwrap() = Some(err);
    }
}

impl Camera for FakeCamera {
    fn is_available(&self) -> bool {
        true
    }

    fn open(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        if let Some(err) = self.open_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.released.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            frames: Arc::clone(&self.frames),
            ready: Arc::clone(&self.ready),
            released: Arc::clone(&self.released),
        }))
    }
}

struct FakeStream {
    frames: Arc<Mutex<VecDeque<String>>>,
    ready: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl CameraStream for FakeStream {
    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn grab(&mut self) -> Option<Frame> {
        let text = self.frames.lock().unwrap().pop_front()?;
        Some(Frame {
            width: text.len() as u32,
            height: 1,
            data: text.into_bytes(),
        })
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
