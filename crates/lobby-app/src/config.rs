// Configuration loading and validation (config/lobby.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use lobby_core::avatar::DEFAULT_PLACEHOLDER_AVATAR;
use lobby_core::controller::{ControllerConfig, LocalPlayer};
use serde::Deserialize;
use thiserror::Error;

use crate::avatar_http::UserInfoUrl;

/// File name of the client configuration, under `config/` and `defaults/`.
pub const CONFIG_FILE: &str = "lobby.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// lobby.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub player: PlayerConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub lobby: LobbySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Websocket URL of the notification channel.
    pub notification_url: String,
    /// User-info endpoint template containing `{username}`. Without it every
    /// avatar falls back to the placeholder.
    #[serde(default)]
    pub user_info_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LobbySettings {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_placeholder_avatar")]
    pub placeholder_avatar: String,
}

impl Default for LobbySettings {
    fn default() -> Self {
        LobbySettings {
            tick_interval_ms: default_tick_interval_ms(),
            placeholder_avatar: default_placeholder_avatar(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_placeholder_avatar() -> String {
    DEFAULT_PLACEHOLDER_AVATAR.to_string()
}

impl Config {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            tick_interval: Duration::from_millis(self.lobby.tick_interval_ms),
            placeholder_avatar: self.lobby.placeholder_avatar.clone(),
        }
    }

    /// The local player, with the avatar filled in once it is resolved.
    pub fn local_player(&self, avatar_url: impl Into<String>) -> LocalPlayer {
        LocalPlayer {
            username: self.player.username.clone(),
            avatar_url: avatar_url.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/lobby.toml` relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = std::fs::read_to_string(&path)
        .map_err(|_| ConfigError::FileNotFound { path: path.clone() })?;
    let config: Config =
        toml::from_str(&text).map_err(|e| ConfigError::ParseError { path, source: e })?;

    validate(&config)?;
    Ok(config)
}

/// Copy `defaults/lobby.toml` to `config/` unless it is already there.
/// Returns the paths that were written.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the crate root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let source = defaults_dir.join(CONFIG_FILE);
    let target = config_dir.join(CONFIG_FILE);
    if target.exists() || !source.is_file() {
        return Ok(vec![]);
    }

    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(mut dest) => {
            let content = std::fs::read(&source).map_err(|e| ConfigError::DefaultsCopyError {
                message: format!("failed to read {}: {e}", source.display()),
            })?;
            std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                ConfigError::DefaultsCopyError {
                    message: format!("failed to write {}: {e}", target.display()),
                }
            })?;
            Ok(vec![target])
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(vec![]),
        Err(e) => Err(ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", target.display()),
        }),
    }
}

/// Load config relative to the working directory, copying defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.player.username.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "player.username".into(),
            message: "must not be empty".into(),
        });
    }

    let url = &config.server.notification_url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(ConfigError::ValidationError {
            field: "server.notification_url".into(),
            message: format!("must be a ws:// or wss:// URL, got `{url}`"),
        });
    }

    if let Some(template) = &config.server.user_info_url {
        UserInfoUrl::parse(template).map_err(|e| ConfigError::ValidationError {
            field: "server.user_info_url".into(),
            message: e.to_string(),
        })?;
    }

    if config.lobby.tick_interval_ms == 0 {
        return Err(ConfigError::ValidationError {
            field: "lobby.tick_interval_ms".into(),
            message: "must be > 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
