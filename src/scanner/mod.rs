pub mod camera;
pub mod resolver;

use crate::error::{AppError, AppResult};
use camera::{Camera, QrDecoder, StreamGuard};
use resolver::TrackReference;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Identical codes inside this window are processed once.
pub const SCAN_COOLDOWN: Duration = Duration::from_secs(2);

/// Roughly one poll per display frame.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug)]
pub enum ScanEvent {
    Status(String),
    /// A code was read and resolved; the caller decides what to do next.
    Resolved(TrackReference),
    /// A code was read but is not a track. Scanning continues.
    Rejected(AppError),
    /// The camera has been released and the overlay can go away.
    Closed,
}

/// Drops a repeat of the last code while its cooldown is running.
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, code: &str, now: Instant) -> bool {
        if let Some((last_code, at)) = &self.last {
            if last_code == code && now.duration_since(*at) < self.window {
                return false;
            }
        }
        self.last = Some((code.to_string(), now));
        true
    }
}

#[derive(Clone)]
pub struct Scanner {
    camera: Arc<dyn Camera>,
    decoder: Arc<dyn QrDecoder>,
    cooldown: Duration,
}

pub struct ScanHandle {
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<AppResult<()>>,
}

impl ScanHandle {
    /// Asks the loop to exit; it notices at the top of its next cycle.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> AppResult<()> {
        self.stop();
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(AppError::Device(camera::CameraError::Other(format!(
                "scan task failed: {}",
                e
            )))),
        }
    }
}

impl Scanner {
    pub fn new(camera: Arc<dyn Camera>, decoder: Arc<dyn QrDecoder>) -> Self {
        Self {
            camera,
            decoder,
            cooldown: SCAN_COOLDOWN,
        }
    }

    pub fn is_available(&self) -> bool {
        self.camera.is_available()
    }

    /// Opens the camera and polls it on a background task until stopped.
    pub fn start(&self, events: mpsc::UnboundedSender<ScanEvent>) -> ScanHandle {
        let (stop, stop_rx) = watch::channel(false);
        let scanner = self.clone();
        let task = tokio::spawn(async move { scanner.run(stop_rx, events).await });
        ScanHandle { stop, task }
    }

    async fn run(
        &self,
        stop: watch::Receiver<bool>,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> AppResult<()> {
        let stream = match self.camera.open() {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Camera unavailable: {}", e);
                let _ = events.send(ScanEvent::Status(e.to_string()));
                let _ = events.send(ScanEvent::Closed);
                return Err(e.into());
            }
        };

        let result = {
            let mut guard = StreamGuard::new(stream);
            let _ = events.send(ScanEvent::Status(
                "Position QR code in the frame".to_string(),
            ));
            self.poll(&mut guard, &stop, &events).await
        };

        // The guard is gone, so the camera is released before the overlay closes.
        let _ = events.send(ScanEvent::Closed);
        result
    }

    async fn poll(
        &self,
        stream: &mut StreamGuard,
        stop: &watch::Receiver<bool>,
        events: &mpsc::UnboundedSender<ScanEvent>,
    ) -> AppResult<()> {
        let mut debounce = Debounce::new(self.cooldown);
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if *stop.borrow() || events.is_closed() {
                log::debug!("Scanner stopped");
                return Ok(());
            }
            if !stream.ready() {
                continue;
            }

            let Some(frame) = stream.grab() else {
                continue;
            };
            let Some(code) = self.decoder.decode(&frame) else {
                continue;
            };
            if !debounce.accept(&code, Instant::now()) {
                continue;
            }

            log::info!("QR code detected");
            let _ = events.send(ScanEvent::Status("Processing QR code...".to_string()));
            let event = match resolver::resolve(&code) {
                Ok(track) => ScanEvent::Resolved(track),
                Err(e) => {
                    log::warn!("Rejected QR payload: {}", e);
                    ScanEvent::Rejected(e)
                }
            };
            let _ = events.send(event);
        }
    }
}
