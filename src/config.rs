// Configuration loading and parsing (desk.toml, credentials.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

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
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub hub: HubConfig,
    pub api: ApiConfig,
    pub agent: AgentConfig,
    pub notifications: NotificationConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// desk.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire desk.toml file.
#[derive(Debug, Clone, Deserialize)]
struct DeskFile {
    hub: HubConfig,
    api: ApiConfig,
    agent: AgentConfig,
    #[serde(default)]
    notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Hub endpoint, e.g. `https://shop.example.com/hubs/chat`.
    pub url: String,
    /// Connect straight to the WebSocket endpoint without the negotiate call.
    #[serde(default)]
    pub skip_negotiation: bool,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_secs: u64,
    #[serde(default = "default_server_timeout")]
    pub server_timeout_secs: u64,
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_secs: u64,
    /// Delay before each reconnect attempt. The client gives up once the
    /// list is exhausted.
    #[serde(default = "default_reconnect_delays")]
    pub reconnect_delays_ms: Vec<u64>,
}

impl HubConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn reconnect_delays(&self) -> Vec<Duration> {
        self.reconnect_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// REST base URL, e.g. `https://shop.example.com/api`.
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name shown in the status bar.
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Ring the terminal bell when a notification arrives.
    #[serde(default = "default_true")]
    pub bell: bool,
    /// How many delivered notification keys are remembered for
    /// one-time delivery.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            bell: true,
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_handshake_timeout() -> u64 {
    15
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_server_timeout() -> u64 {
    30
}

fn default_invocation_timeout() -> u64 {
    30
}

fn default_reconnect_delays() -> Vec<u64> {
    vec![0, 2_000, 10_000, 30_000]
}

fn default_request_timeout() -> u64 {
    20
}

fn default_history_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Bearer token issued to the support agent by the storefront backend.
    pub access_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/desk.toml` and (optionally)
/// `config/credentials.toml`, both relative to the given `base_dir`.
///
/// This does not auto-copy defaults. Prefer `load_config()` which handles
/// default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- desk.toml (required) ---
    let desk_path = config_dir.join("desk.toml");
    let desk_text = read_file(&desk_path)?;
    let desk = parse_desk(&desk_text, &desk_path)?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        hub: desk.hub,
        api: desk.api,
        agent: desk.agent,
        notifications: desk.notifications,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

fn parse_desk(text: &str, path: &Path) -> Result<DeskFile, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_url("hub.url", &config.hub.url, &["http", "https", "ws", "wss"])?;
    validate_url("api.base_url", &config.api.base_url, &["http", "https"])?;

    if config.hub.url.trim_end_matches('/').ends_with("/negotiate") {
        return Err(ConfigError::ValidationError {
            field: "hub.url".into(),
            message: "must be the hub endpoint, not its negotiate route".into(),
        });
    }

    let positive: &[(&str, u64)] = &[
        ("hub.handshake_timeout_secs", config.hub.handshake_timeout_secs),
        ("hub.keep_alive_interval_secs", config.hub.keep_alive_interval_secs),
        ("hub.server_timeout_secs", config.hub.server_timeout_secs),
        ("hub.invocation_timeout_secs", config.hub.invocation_timeout_secs),
        ("api.request_timeout_secs", config.api.request_timeout_secs),
    ];
    for (field, value) in positive {
        if *value == 0 {
            return Err(ConfigError::ValidationError {
                field: (*field).into(),
                message: "must be greater than 0".into(),
            });
        }
    }

    if config.hub.keep_alive_interval_secs >= config.hub.server_timeout_secs {
        return Err(ConfigError::ValidationError {
            field: "hub.keep_alive_interval_secs".into(),
            message: format!(
                "must be less than hub.server_timeout_secs ({}), got {}",
                config.hub.server_timeout_secs, config.hub.keep_alive_interval_secs
            ),
        });
    }

    if config.agent.display_name.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "agent.display_name".into(),
            message: "must not be empty".into(),
        });
    }

    if config.notifications.history_capacity == 0 {
        return Err(ConfigError::ValidationError {
            field: "notifications.history_capacity".into(),
            message: "must be greater than 0".into(),
        });
    }

    if let Some(token) = &config.credentials.access_token {
        if token.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: "credentials.access_token".into(),
                message: "must not be blank when present".into(),
            });
        }
    }

    Ok(())
}

fn validate_url(field: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::ValidationError {
        field: field.into(),
        message: format!("invalid URL `{value}`: {e}"),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::ValidationError {
            field: field.into(),
            message: format!(
                "unsupported scheme `{}` (expected one of {})",
                url.scheme(),
                schemes.join(", ")
            ),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
