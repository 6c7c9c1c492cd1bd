use super::{DiagnosticLog, LogLevel};
use crate::playback::sdk::{PlayerOptions, SdkEvent, SdkFactory, TokenProvider};
use crate::storage::TokenStore;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

const PROBE_PLAYER_NAME: &str = "Account Checker";

/// Single-assignment result cell. The first `resolve` wins; later calls are
/// ignored and report `false`.
pub struct ResolveOnce<T> {
    tx: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> ResolveOnce<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    pub fn resolve(&self, value: T) -> bool {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match tx {
            Some(tx) => {
                // A dropped receiver still counts as resolved.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Whichever lifecycle signal fired first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Ready { device_id: String },
    InitializationError { message: String },
    AuthenticationError { message: String },
    AccountError { message: String },
    ConnectFailed { message: String },
    TimedOut,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }

    pub fn is_account_error(&self) -> bool {
        matches!(self, ProbeOutcome::AccountError { .. })
    }
}

/// Logs one session event and maps it to an outcome if it settles the probe.
fn observe(event: SdkEvent, log: &DiagnosticLog) -> Option<ProbeOutcome> {
    match event {
        SdkEvent::Ready { device_id } => {
            log.push(LogLevel::Success, format!("SDK ready, device ID: {}", device_id));
            Some(ProbeOutcome::Ready { device_id })
        }
        SdkEvent::InitializationError { message } => {
            log.push(LogLevel::Error, format!("SDK init error: {}", message));
            Some(ProbeOutcome::InitializationError { message })
        }
        SdkEvent::AuthenticationError { message } => {
            log.push(LogLevel::Error, format!("SDK auth error: {}", message));
            Some(ProbeOutcome::AuthenticationError { message })
        }
        SdkEvent::AccountError { message } => {
            log.push(LogLevel::Error, format!("SDK account error: {}", message));
            Some(ProbeOutcome::AccountError { message })
        }
        SdkEvent::NotReady { device_id } => {
            log.push(
                LogLevel::Warning,
                format!("SDK device {} not ready", device_id),
            );
            None
        }
        SdkEvent::PlaybackError { .. } | SdkEvent::PlayerStateChanged(_) => None,
    }
}

/// Starts a throwaway session and reports the first lifecycle signal, or
/// [`ProbeOutcome::TimedOut`] once `timeout` elapses.
pub async fn probe_sdk(
    factory: &dyn SdkFactory,
    tokens: Arc<TokenStore>,
    log: &DiagnosticLog,
    timeout: Duration,
) -> ProbeOutcome {
    let options = PlayerOptions {
        name: PROBE_PLAYER_NAME.to_string(),
        ..PlayerOptions::default()
    };
    let (tx, mut events) = mpsc::unbounded_channel();
    let session = match factory.create(options, TokenProvider::new(tokens), tx) {
        Ok(session) => session,
        Err(e) => {
            log.push(LogLevel::Error, format!("SDK could not be created: {}", e));
            return ProbeOutcome::ConnectFailed {
                message: e.to_string(),
            };
        }
    };

    let (cell, mut settled) = ResolveOnce::new();
    let cell = Arc::new(cell);

    let connect = {
        let session = Arc::clone(&session);
        let cell = Arc::clone(&cell);
        tokio::spawn(async move {
            match session.connect().await {
                Ok(true) => {}
                Ok(false) => {
                    cell.resolve(ProbeOutcome::ConnectFailed {
                        message: "Connection failed".into(),
                    });
                }
                Err(e) => {
                    cell.resolve(ProbeOutcome::ConnectFailed {
                        message: e.to_string(),
                    });
                }
            }
        })
    };

    let race = async {
        loop {
            tokio::select! {
                biased;
                outcome = &mut settled => {
                    return outcome.unwrap_or(ProbeOutcome::TimedOut);
                }
                Some(event) = events.recv() => {
                    if let Some(outcome) = observe(event, log) {
                        cell.resolve(outcome);
                    }
                }
            }
        }
    };

    let outcome = match tokio::time::timeout(timeout, race).await {
        Ok(outcome) => outcome,
        Err(_) => {
            cell.resolve(ProbeOutcome::TimedOut);
            log.push(LogLevel::Error, "SDK initialization timed out");
            ProbeOutcome::TimedOut
        }
    };

    connect.abort();
    session.disconnect();
    outcome
}
