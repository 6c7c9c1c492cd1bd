use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_player_name")]
    pub player_name: String,
    /// Spotify Connect device to drive. Falls back to the active device.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Platform / user-agent string used for mobile detection.
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default = "default_show_dialog")]
    pub show_dialog: bool,
    #[serde(default = "default_implicit_expires_in")]
    pub implicit_expires_in: u64,
    #[serde(default = "default_card_base_url")]
    pub card_base_url: String,
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8888/callback".to_string()
}

fn default_accounts_url() -> String {
    "https://accounts.spotify.com".to_string()
}

fn default_api_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_scopes() -> Vec<String> {
    [
        "streaming",
        "user-read-email",
        "user-read-private",
        "user-read-playback-state",
        "user-modify-playback-state",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_player_name() -> String {
    "Mystery Music Player".to_string()
}

fn default_show_dialog() -> bool {
    true
}

fn default_implicit_expires_in() -> u64 {
    3600
}

fn default_card_base_url() -> String {
    "https://wilgoy23.github.io/MyHitster".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: "657c1306a4c345328542c2b883db38c3".to_string(),
            redirect_uri: default_redirect_uri(),
            accounts_url: default_accounts_url(),
            api_url: default_api_url(),
            scopes: default_scopes(),
            player_name: default_player_name(),
            device_name: None,
            platform: None,
            show_dialog: default_show_dialog(),
            implicit_expires_in: default_implicit_expires_in(),
            card_base_url: default_card_base_url(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> AppResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("Cannot find home directory".into()))?;
        Ok(home.join(".hitster-player"))
    }

    pub fn config_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn storage_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join("storage.json"))
    }

    pub fn load() -> AppResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> AppResult<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}
