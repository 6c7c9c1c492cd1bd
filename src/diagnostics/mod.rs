pub mod probe;

use crate::api::client::WebApi;
use crate::api::models::{Device, ProfileSnapshot};
use crate::api::user::{self, ProfileClient};
use crate::error::{AppError, AppResult};
use crate::playback::sdk::SdkFactory;
use crate::storage::TokenStore;
use chrono::{DateTime, Utc};
use probe::{ProbeOutcome, PROBE_TIMEOUT};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Append-only record of a diagnostic run.
///
/// Entries are echoed to the `log` facade and, when a sink is attached,
/// streamed to it as they are written.
#[derive(Default)]
pub struct DiagnosticLog {
    entries: Mutex<Vec<LogEntry>>,
    sink: Option<mpsc::UnboundedSender<LogEntry>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: mpsc::UnboundedSender<LogEntry>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sink: Some(sink),
        }
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            at: Utc::now(),
            level,
            message: message.into(),
        };

        match level {
            LogLevel::Error => log::warn!("[check] {}", entry.message),
            _ => log::info!("[check] {}", entry.message),
        }

        if let Some(sink) = &self.sink {
            let _ = sink.send(entry.clone());
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.message.contains(text))
    }
}

/// Shortened token for display: first and last ten characters.
pub fn token_preview(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 20 {
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 10..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        token.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    /// 403 from a premium-only endpoint.
    NonPremiumEvidence,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub token_preview: String,
    pub profile: Option<ProfileSnapshot>,
    pub premium: bool,
    pub profile_check: CheckOutcome,
    pub player_check: CheckOutcome,
    pub devices_check: CheckOutcome,
    pub devices: Vec<Device>,
    pub sdk_probe: Option<ProbeOutcome>,
    pub entries: Vec<LogEntry>,
}

/// Probes what the signed-in account is allowed to do.
///
/// Steps run in order and each one is independent: a failure is logged and
/// the next step still runs.
pub struct DiagnosticRunner {
    api: Arc<dyn WebApi>,
    tokens: Arc<TokenStore>,
    profiles: ProfileClient,
    sdk: Option<Arc<dyn SdkFactory>>,
    probe_timeout: Duration,
}

impl DiagnosticRunner {
    pub fn new(api: Arc<dyn WebApi>, tokens: Arc<TokenStore>) -> Self {
        Self {
            profiles: ProfileClient::new(Arc::clone(&api), Arc::clone(&tokens)),
            api,
            tokens,
            sdk: None,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Enables the playback session probe.
    pub fn with_sdk(mut self, factory: Arc<dyn SdkFactory>) -> Self {
        self.sdk = Some(factory);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn note_failure(log: &DiagnosticLog, context: &str, err: &AppError) -> CheckOutcome {
        log.push(LogLevel::Error, format!("{}: {}", context, err));
        if err.is_auth() {
            log.push(LogLevel::Error, "Token invalid or expired");
        }
        CheckOutcome::Failed {
            reason: err.to_string(),
        }
    }

    pub async fn run(&self, log: &DiagnosticLog) -> AppResult<DiagnosticReport> {
        let Some(token) = self.tokens.access_token() else {
            log.push(LogLevel::Error, "Error: No access token");
            return Err(AppError::Auth("No access token".into()));
        };

        // 1. profile
        log.push(LogLevel::Info, "Fetching user profile...");
        let (profile, profile_check) = match self.profiles.fetch_profile(&token).await {
            Ok(profile) => {
                log.push(LogLevel::Success, "Profile data received");
                (Some(profile), CheckOutcome::Passed)
            }
            Err(e) => (
                None,
                Self::note_failure(log, "Error fetching profile", &e),
            ),
        };

        let premium = profile.as_ref().is_some_and(user::is_premium);
        if profile.is_some() {
            if premium {
                log.push(LogLevel::Success, "Account has premium status ✓");
            } else {
                log.push(LogLevel::Error, "Account does NOT have premium status ✗");
            }
        }

        // 2. player endpoint
        log.push(LogLevel::Info, "Checking player access...");
        let player_check = match self.api.player_status(&token).await {
            Ok(200 | 204) => {
                log.push(
                    LogLevel::Success,
                    "Successfully accessed player API ✓ (premium feature)",
                );
                CheckOutcome::Passed
            }
            Ok(status) => {
                log.push(
                    LogLevel::Error,
                    format!("Player API access failed, status {}", status),
                );
                CheckOutcome::Failed {
                    reason: format!("status {}", status),
                }
            }
            Err(AppError::Permission(message)) => {
                log.push(LogLevel::Error, "Player API access failed, status 403");
                log.push(LogLevel::Error, "Forbidden: indicates non-premium account");
                log::debug!("403 body: {}", message);
                CheckOutcome::NonPremiumEvidence
            }
            Err(e) => Self::note_failure(log, "Error accessing player API", &e),
        };

        // 3. devices
        log.push(LogLevel::Info, "Checking available devices...");
        let (devices, devices_check) = match self.api.devices(&token).await {
            Ok(devices) => {
                log.push(LogLevel::Info, format!("Found {} device(s)", devices.len()));
                for d in &devices {
                    log.push(
                        LogLevel::Info,
                        format!(
                            "Device: {} ({}), ID: {}",
                            d.name,
                            d.device_type,
                            d.id.as_deref().unwrap_or("none")
                        ),
                    );
                }
                (devices, CheckOutcome::Passed)
            }
            Err(e) => (
                Vec::new(),
                Self::note_failure(log, "Error accessing devices API", &e),
            ),
        };

        // 4. playback session
        let sdk_probe = match &self.sdk {
            Some(factory) => {
                log.push(LogLevel::Info, "Testing Web Playback SDK...");
                let outcome = probe::probe_sdk(
                    factory.as_ref(),
                    Arc::clone(&self.tokens),
                    log,
                    self.probe_timeout,
                )
                .await;
                if outcome.is_account_error() {
                    log.push(
                        LogLevel::Error,
                        "SDK test confirms this is not a valid premium account",
                    );
                }
                Some(outcome)
            }
            None => {
                log.push(
                    LogLevel::Info,
                    "Spotify Web Playback SDK not available in this context",
                );
                None
            }
        };

        // 5. assessment
        let tier = profile
            .as_ref()
            .and_then(|p| p.tier.as_deref())
            .unwrap_or("unknown");
        log.push(LogLevel::Info, format!("Profile Product Type: {}", tier));
        if premium {
            log.push(LogLevel::Success, "Your account appears to be Premium ✓");
        } else {
            log.push(LogLevel::Error, "Your account is NOT Premium ✗");
            log.push(
                LogLevel::Info,
                "The Web Playback SDK requires a Premium account.",
            );
        }

        Ok(DiagnosticReport {
            token_preview: token_preview(&token),
            profile,
            premium,
            profile_check,
            player_check,
            devices_check,
            devices,
            sdk_probe,
            entries: log.entries(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::sdk::SdkEvent;
    use crate::storage::Credential;
    use crate::test_support::{device, profile, Fail, MockApi, MockSdk, MockSdkFactory};

    fn runner(api: Arc<MockApi>) -> DiagnosticRunner {
        let tokens = Arc::new(TokenStore::in_memory());
        tokens
            .put(&Credential::new("BQDabcdefghijklmnopqrstuvwxyz", 3600))
            .unwrap();
        DiagnosticRunner::new(api, tokens)
    }

    fn position(log: &DiagnosticLog, text: &str) -> usize {
        log.entries()
            .iter()
            .position(|e| e.message.contains(text))
            .unwrap_or_else(|| panic!("no entry containing {text:?}"))
    }

    #[test]
    fn preview_keeps_ends_of_long_tokens() {
        assert_eq!(
            token_preview("BQDabcdefghijklmnopqrstuvwxyz"),
            "BQDabcdefg...qrstuvwxyz"
        );
        assert_eq!(token_preview("short"), "short");
        assert_eq!(token_preview("exactly-twenty-chars"), "exactly-twenty-chars");
    }

    #[tokio::test]
    async fn forbidden_player_is_non_premium_evidence_and_devices_still_run() {
        let api = Arc::new(MockApi::default());
        api.set_profile(Ok(profile("ada", Some("free"))));
        api.set_player_status(Err(Fail::Permission));
        api.set_devices(Ok(vec![device("d1", "Kitchen", "Speaker")]));
        let log = DiagnosticLog::new();

        let report = runner(api).run(&log).await.unwrap();

        assert_eq!(report.profile_check, CheckOutcome::Passed);
        assert_eq!(report.player_check, CheckOutcome::NonPremiumEvidence);
        assert_eq!(report.devices_check, CheckOutcome::Passed);
        assert_eq!(report.devices.len(), 1);
        assert!(!report.premium);
        assert!(position(&log, "Forbidden") < position(&log, "Checking available devices"));
        assert!(log.contains("Device: Kitchen (Speaker), ID: d1"));
        assert!(log.contains("Your account is NOT Premium"));
    }

    #[tokio::test]
    async fn premium_account_passes_every_step() {
        let api = Arc::new(MockApi::default());
        api.set_player_status(Ok(204));
        let log = DiagnosticLog::new();

        let report = runner(api).run(&log).await.unwrap();

        assert!(report.premium);
        assert_eq!(report.player_check, CheckOutcome::Passed);
        assert_eq!(report.token_preview, "BQDabcdefg...qrstuvwxyz");
        assert!(report.sdk_probe.is_none());
        assert!(log.contains("Successfully accessed player API"));
        assert!(log.contains("Your account appears to be Premium"));
        assert!(log.contains("not available in this context"));
    }

    #[tokio::test]
    async fn failed_profile_does_not_stop_later_steps() {
        let api = Arc::new(MockApi::default());
        api.set_profile(Err(Fail::Auth));
        let log = DiagnosticLog::new();

        let report = runner(api.clone()).run(&log).await.unwrap();

        assert!(matches!(report.profile_check, CheckOutcome::Failed { .. }));
        assert!(log.contains("Token invalid or expired"));
        assert!(log.contains("Profile Product Type: unknown"));
        let calls = api.calls();
        assert!(calls.iter().any(|c| c.starts_with("player")));
        assert!(calls.iter().any(|c| c.starts_with("devices")));
    }

    #[tokio::test]
    async fn unexpected_player_status_is_a_failure() {
        let api = Arc::new(MockApi::default());
        api.set_player_status(Err(Fail::Status(500)));
        let log = DiagnosticLog::new();

        let report = runner(api).run(&log).await.unwrap();
        assert!(matches!(report.player_check, CheckOutcome::Failed { .. }));
        assert!(log.contains("Error accessing player API"));
    }

    #[tokio::test(start_paused = true)]
    async fn sdk_account_error_confirms_non_premium() {
        let api = Arc::new(MockApi::default());
        api.set_profile(Ok(profile("ada", Some("free"))));
        let sdk = MockSdk::new();
        sdk.emit_on_connect(SdkEvent::AccountError {
            message: "Premium required".into(),
        });
        let log = DiagnosticLog::new();

        let report = runner(api)
            .with_sdk(Arc::new(MockSdkFactory::new(sdk)))
            .run(&log)
            .await
            .unwrap();

        assert!(report.sdk_probe.unwrap().is_account_error());
        assert!(log.contains("SDK test confirms this is not a valid premium account"));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let api = Arc::new(MockApi::default());
        let runner = DiagnosticRunner::new(api.clone(), Arc::new(TokenStore::in_memory()));
        let log = DiagnosticLog::new();

        assert!(runner.run(&log).await.unwrap_err().is_auth());
        assert!(api.calls().is_empty());
        assert!(log.contains("No access token"));
    }

    #[tokio::test]
    async fn sink_receives_entries_as_written() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let log = DiagnosticLog::with_sink(tx);
        log.push(LogLevel::Info, "first");
        log.push(LogLevel::Success, "second");

        assert_eq!(rx.recv().await.unwrap().message, "first");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, LogLevel::Success);
        assert_eq!(log.entries().len(), 2);
    }
}
