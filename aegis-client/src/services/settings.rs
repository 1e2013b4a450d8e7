//! Settings service
//!
//! Manages client settings persistence using JSON file storage.

use crate::config::{
    DEFAULT_API_BASE_URL, DEFAULT_AUTO_SAVE_DELAY_MS, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_WS_BASE_URL, MAX_AUTO_SAVE_DELAY_MS, MIN_AUTO_SAVE_DELAY_MS,
};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use url::Url;

/// REST backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Push socket settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSettings {
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,
}

fn default_ws_base_url() -> String {
    DEFAULT_WS_BASE_URL.to_string()
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            ws_base_url: default_ws_base_url(),
        }
    }
}

/// Report editor autosave settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutosaveSettings {
    /// Quiet period before an edit is written, in milliseconds
    #[serde(default = "default_auto_save_delay")]
    pub delay_ms: u32,
}

fn default_auto_save_delay() -> u32 {
    DEFAULT_AUTO_SAVE_DELAY_MS
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            delay_ms: default_auto_save_delay(),
        }
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientSettings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub push: PushSettings,
    #[serde(default)]
    pub autosave: AutosaveSettings,
}

impl ClientSettings {
    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        let delay = self.autosave.delay_ms;
        if !(MIN_AUTO_SAVE_DELAY_MS..=MAX_AUTO_SAVE_DELAY_MS).contains(&delay) {
            return Err(AppError::Settings(format!(
                "Auto-save delay must be between {} and {} ms, got {}",
                MIN_AUTO_SAVE_DELAY_MS, MAX_AUTO_SAVE_DELAY_MS, delay
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(AppError::Settings("Request timeout must be at least 1 second".into()));
        }

        self.api_base_url()?;
        let ws = self.ws_base_url()?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(AppError::Settings(format!(
                "Push URL must use ws:// or wss://, got {}",
                ws
            )));
        }

        Ok(())
    }

    pub fn api_base_url(&self) -> Result<Url> {
        Url::parse(&self.api.base_url)
            .map_err(|e| AppError::Settings(format!("Invalid API base URL: {}", e)))
    }

    pub fn ws_base_url(&self) -> Result<Url> {
        Url::parse(&self.push.ws_base_url)
            .map_err(|e| AppError::Settings(format!("Invalid push base URL: {}", e)))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn auto_save_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.autosave.delay_ms))
    }
}

/// Service for managing client settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join("settings.json"),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<ClientSettings> {
        if !self.settings_path.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = ClientSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: ClientSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Settings(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;

        Ok(settings)
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &ClientSettings) -> Result<()> {
        settings.validate()?;

        let content = serde_json::to_string_pretty(settings)?;

        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }

    /// Get autosave settings
    pub async fn get_autosave(&self) -> Result<AutosaveSettings> {
        let settings = self.load().await?;
        Ok(settings.autosave)
    }

    /// Update autosave settings
    pub async fn update_autosave(&self, autosave: AutosaveSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.autosave = autosave;
        self.save(&settings).await?;
        Ok(())
    }

    /// Update REST and push endpoints
    pub async fn update_endpoints(&self, api: ApiSettings, push: PushSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.api = api;
        settings.push = push;
        self.save(&settings).await?;
        Ok(())
    }
}
