use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    /// Button shown, audio still locked.
    Required,
    /// Button disabled, audio unlocked.
    Done,
}

/// What the player screen should show. The CLI prints these; tests assert
/// on them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum UiEvent {
    Status(String),
    Error(String),
    /// Credential gone: back to the login screen.
    ShowLogin,
    ShowPlayer,
    Activation(ActivationState),
    ShowTransport,
    PlayButton { playing: bool },
    MysteryId(String),
    UserInfo(String),
    ScanRequested,
}

impl std::fmt::Display for UiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiEvent::Status(text) => write!(f, "{}", text),
            UiEvent::Error(text) => write!(f, "Error: {}", text),
            UiEvent::ShowLogin => write!(f, "Signed out. Run `login` to continue."),
            UiEvent::ShowPlayer => write!(f, "Player ready."),
            UiEvent::Activation(ActivationState::Required) => {
                write!(f, "Type `activate` to unlock playback on this device.")
            }
            UiEvent::Activation(ActivationState::Done) => write!(f, "Player Activated"),
            UiEvent::ShowTransport => write!(f, "Now playing."),
            UiEvent::PlayButton { playing: true } => write!(f, "[ || ]"),
            UiEvent::PlayButton { playing: false } => write!(f, "[ > ]"),
            UiEvent::MysteryId(label) => write!(f, "Mystery Track #{}", label),
            UiEvent::UserInfo(name) => write!(f, "Signed in as {}", name),
            UiEvent::ScanRequested => write!(f, "Scan a QR code to load a track"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_tag_and_payload() {
        let json = serde_json::to_value(UiEvent::PlayButton { playing: true }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "play_button", "payload": {"playing": true}})
        );

        let json = serde_json::to_value(UiEvent::ShowLogin).unwrap();
        assert_eq!(json, serde_json::json!({"event": "show_login"}));
    }

    #[test]
    fn renders_mystery_label() {
        assert_eq!(
            UiEvent::MysteryId("abc123".into()).to_string(),
            "Mystery Track #abc123"
        );
    }
}
