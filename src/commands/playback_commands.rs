use super::Output;
use crate::api::client::WebApi;
use crate::error::{AppError, AppResult};
use crate::events::UiEvent;
use crate::playback::controller::{PlaybackController, PlayerState, ToggleOutcome};
use crate::playback::sdk::SdkError;
use crate::scanner::camera::{ChannelCamera, FrameFeeder, TextPayloadDecoder};
use crate::scanner::resolver::{self, TrackReference};
use crate::scanner::{ScanEvent, ScanHandle, Scanner};
use crate::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Pause between reading a code and closing the scanner.
const SCAN_SETTLE: Duration = Duration::from_secs(1);

const HELP: &str = "Commands: [enter]/p play-pause, s scan, a activate, q quit";

/// What a line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Toggle,
    Scan,
    Activate,
    Cancel,
    Quit,
    Help,
    /// Anything else. While scanning this is a scanned payload.
    Text(String),
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "" | "p" | "play" | "pause" => Input::Toggle,
        "s" | "scan" => Input::Scan,
        "a" | "activate" => Input::Activate,
        "c" | "cancel" => Input::Cancel,
        "q" | "quit" | "exit" => Input::Quit,
        "h" | "help" | "?" => Input::Help,
        other => Input::Text(other.to_string()),
    }
}

struct ScanSession {
    handle: ScanHandle,
    feeder: FrameFeeder,
}

/// Interactive player: a keyboard-wedge QR reader types into stdin, and
/// short commands drive the session.
pub async fn play(
    state: &AppState,
    out: Output,
    track: Option<String>,
    platform: Option<String>,
) -> AppResult<()> {
    let mut config = state.config.clone();
    if platform.is_some() {
        config.platform = platform;
    }

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let api: Arc<dyn WebApi> = state.client.clone();
    let mut controller = PlaybackController::new(
        &config,
        Arc::clone(&state.tokens),
        api,
        state.sdk_factory(),
        ui_tx,
    );

    if let Some(text) = track {
        controller.load_track(resolver::resolve(&text)?);
    }

    if let Some(name) = state.tokens.display_name() {
        out.ui(&UiEvent::UserInfo(name));
    }

    let mut sdk_events = match controller.start().await {
        Ok(events) => events,
        Err(e) => {
            flush(&mut ui_rx, out);
            return Err(e);
        }
    };

    let (camera, feeder) = ChannelCamera::new();
    let scanner = Scanner::new(Arc::new(camera), Arc::new(TextPayloadDecoder));
    let (scan_tx, mut scan_rx) = mpsc::unbounded_channel();
    let mut scanning: Option<ScanSession> = None;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    out.line(HELP);

    loop {
        tokio::select! {
            Some(event) = ui_rx.recv() => {
                let requested = event == UiEvent::ScanRequested;
                out.ui(&event);
                if requested && scanning.is_none() {
                    scanning = Some(ScanSession {
                        handle: scanner.start(scan_tx.clone()),
                        feeder: feeder.clone(),
                    });
                }
            }
            Some(event) = sdk_events.recv() => {
                controller.handle_event(event).await;
                if controller.state() == PlayerState::Failed {
                    flush(&mut ui_rx, out);
                    break;
                }
            }
            Some(event) = scan_rx.recv() => {
                match event {
                    ScanEvent::Status(text) => out.line(format!("[scanner] {}", text)),
                    ScanEvent::Rejected(e) => out.line(format!("[scanner] {}", e)),
                    ScanEvent::Closed => out.line("[scanner] closed"),
                    ScanEvent::Resolved(track) => {
                        out.line(format!("[scanner] Track found! Loading... #{}", track.short_label()));
                        if let Some(session) = scanning.take() {
                            finish_scan(&mut controller, session, track).await;
                        }
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::debug!("stdin closed");
                    break;
                };

                if scanning.is_some() {
                    match parse_input(&line) {
                        Input::Cancel => {
                            if let Some(session) = scanning.take() {
                                stop_scan(session).await;
                            }
                        }
                        Input::Quit => break,
                        _ => {
                            if let Some(session) = &scanning {
                                session.feeder.push_text(&line);
                            }
                        }
                    }
                    continue;
                }

                match parse_input(&line) {
                    Input::Toggle => {
                        if let Err(e) = controller.toggle_play_pause().await {
                            if e.is_auth() {
                                flush(&mut ui_rx, out);
                                return Err(e);
                            }
                            log::debug!("Toggle failed: {}", e);
                        }
                    }
                    Input::Scan => {
                        if scanner.is_available() {
                            scanning = Some(ScanSession {
                                handle: scanner.start(scan_tx.clone()),
                                feeder: feeder.clone(),
                            });
                        } else {
                            out.line("No camera found on this device.");
                        }
                    }
                    Input::Activate => {
                        if let Err(e) = controller.activate().await {
                            log::debug!("Activation failed: {}", e);
                        }
                    }
                    Input::Cancel => {}
                    Input::Quit => break,
                    Input::Help => out.line(HELP),
                    Input::Text(text) => {
                        // A wedge reader typing without `scan` first still loads the track.
                        match resolver::resolve(&text) {
                            Ok(track) => load_and_play(&mut controller, track).await,
                            Err(e) => out.line(e.to_string()),
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    let failed = controller.state() == PlayerState::Failed;
    if let Some(session) = scanning.take() {
        stop_scan(session).await;
    }
    controller.teardown();
    flush(&mut ui_rx, out);

    if failed {
        return Err(if state.tokens.get().is_none() {
            AppError::Auth("Signed out. Run `login` again.".into())
        } else {
            SdkError::ConnectFailed.into()
        });
    }
    Ok(())
}

/// Closes the scanner after a successful read, then loads the track.
async fn finish_scan(controller: &mut PlaybackController, session: ScanSession, track: TrackReference) {
    tokio::time::sleep(SCAN_SETTLE).await;
    stop_scan(session).await;
    load_and_play(controller, track).await;
}

async fn stop_scan(session: ScanSession) {
    if let Err(e) = session.handle.join().await {
        log::warn!("Scanner stopped with error: {}", e);
    }
}

/// Scanning is the user gesture, so a ready, idle player starts right away.
async fn load_and_play(controller: &mut PlaybackController, track: TrackReference) {
    controller.load_track(track);
    if controller.is_ready() && !controller.is_playing() {
        match controller.toggle_play_pause().await {
            Ok(ToggleOutcome::ActivationRequired) => {
                log::info!("Waiting for activation before playing");
            }
            Ok(_) => {}
            Err(e) => log::debug!("Autoplay failed: {}", e),
        }
    }
}

fn flush(ui_rx: &mut mpsc::UnboundedReceiver<UiEvent>, out: Output) {
    while let Ok(event) = ui_rx.try_recv() {
        out.ui(&event);
    }
}
