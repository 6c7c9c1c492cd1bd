pub mod api;
pub mod auth_flow;
pub mod callback;
pub mod card;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod playback;
pub mod scanner;
pub mod storage;

#[cfg(test)]
mod test_support;

use api::auth::TokenExchange;
use api::client::{SpotifyClient, WebApi};
use auth_flow::{AuthFlow, SystemNavigator};
use config::AppConfig;
use error::AppResult;
use playback::connect::ConnectSdkFactory;
use playback::sdk::SdkFactory;
use std::path::Path;
use std::sync::Arc;
use storage::{FileStore, TokenStore};

pub struct AppState {
    pub config: AppConfig,
    pub client: Arc<SpotifyClient>,
    pub tokens: Arc<TokenStore>,
    pub auth: AuthFlow,
}

impl AppState {
    /// Loads the config (writing defaults on first run) and opens the
    /// credential store that sits next to it.
    pub fn load(config_path: Option<&Path>) -> AppResult<Self> {
        let (config_path, storage_path) = match config_path {
            Some(path) => (path.to_path_buf(), path.with_file_name("storage.json")),
            None => (AppConfig::config_path()?, AppConfig::storage_path()?),
        };
        let config = load_or_default(&config_path);

        let store = FileStore::open(&storage_path)?;
        let tokens = Arc::new(TokenStore::new(Arc::new(store)));
        let client = Arc::new(SpotifyClient::new(&config)?);

        let exchange: Arc<dyn TokenExchange> = client.clone();
        let auth = AuthFlow::new(
            config.clone(),
            Arc::clone(&tokens),
            exchange,
            Arc::new(SystemNavigator),
        );

        Ok(Self {
            config,
            client,
            tokens,
            auth,
        })
    }

    pub fn sdk_factory(&self) -> Arc<dyn SdkFactory> {
        let api: Arc<dyn WebApi> = self.client.clone();
        Arc::new(ConnectSdkFactory::new(api))
    }
}

fn load_or_default(path: &Path) -> AppConfig {
    AppConfig::load_from(path).unwrap_or_else(|e| {
        log::warn!("Failed to load config: {}. Using defaults.", e);
        let default_config = AppConfig::default();
        // Save defaults so the config file exists for next launch
        if let Err(save_err) = default_config.save_to(path) {
            log::error!("Failed to save default config: {}", save_err);
        }
        default_config
    })
}

pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        "hitster_player=debug,hitster_player_lib=debug"
    } else {
        "hitster_player=info,hitster_player_lib=info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}
