use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("Camera access denied. Please allow camera access and try again.")]
    Denied,
    #[error("No camera found on this device.")]
    NotFound,
    #[error("Camera error: {0}")]
    Other(String),
}

/// One captured frame. `data` is whatever the paired decoder understands.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

pub trait Camera: Send + Sync {
    /// Whether scanning can be offered at all.
    fn is_available(&self) -> bool;

    fn open(&self) -> Result<Box<dyn CameraStream>, CameraError>;
}

pub trait CameraStream: Send {
    /// True once frames can be grabbed.
    fn ready(&self) -> bool;

    fn grab(&mut self) -> Option<Frame>;

    /// Releases the hardware. Called exactly once, by [`StreamGuard`].
    fn release(&mut self);
}

pub trait QrDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Owns an open stream and releases it when dropped, whatever the exit path.
pub struct StreamGuard {
    stream: Box<dyn CameraStream>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn CameraStream>) -> Self {
        Self { stream }
    }

    pub fn ready(&self) -> bool {
        self.stream.ready()
    }

    pub fn grab(&mut self) -> Option<Frame> {
        self.stream.grab()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        log::debug!("Releasing camera stream");
        self.stream.release();
    }
}

/// Camera fed from a channel, one frame per pushed payload.
///
/// Backs keyboard-wedge QR readers: the reader types the decoded text and
/// a newline, and each line is pushed here as a frame.
pub struct ChannelCamera {
    frames: Arc<Mutex<mpsc::UnboundedReceiver<Frame>>>,
    in_use: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct FrameFeeder {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameFeeder {
    pub fn push_text(&self, text: &str) -> bool {
        self.tx
            .send(Frame {
                width: text.len() as u32,
                height: 1,
                data: text.as_bytes().to_vec(),
            })
            .is_ok()
    }
}

impl ChannelCamera {
    pub fn new() -> (Self, FrameFeeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                frames: Arc::new(Mutex::new(rx)),
                in_use: Arc::new(AtomicBool::new(false)),
            },
            FrameFeeder { tx },
        )
    }
}

impl Camera for ChannelCamera {
    fn is_available(&self) -> bool {
        true
    }

    fn open(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        if self.in_use.swap(true, Ordering::SeqCst) {
            return Err(CameraError::Other("camera already in use".into()));
        }

        // Frames pushed while nobody was scanning are stale.
        {
            let mut rx = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
            while rx.try_recv().is_ok() {}
        }

        Ok(Box::new(ChannelStream {
            frames: Arc::clone(&self.frames),
            in_use: Arc::clone(&self.in_use),
        }))
    }
}

struct ChannelStream {
    frames: Arc<Mutex<mpsc::UnboundedReceiver<Frame>>>,
    in_use: Arc<AtomicBool>,
}

impl CameraStream for ChannelStream {
    fn ready(&self) -> bool {
        true
    }

    fn grab(&mut self) -> Option<Frame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }

    fn release(&mut self) {
        self.in_use.store(false, Ordering::SeqCst);
    }
}

/// Decoder for frames that already hold the decoded text.
pub struct TextPayloadDecoder;

impl QrDecoder for TextPayloadDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let text = std::str::from_utf8(&frame.data).ok()?.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}
