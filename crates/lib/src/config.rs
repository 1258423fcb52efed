//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.herald/config.json`) and environment.
//! Bot credentials and the card base URI are required and validated once at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bot identity and public base URI.
    #[serde(default)]
    pub bot: BotConfig,

    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Welcome fan-out tuning.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Welcome card content.
    #[serde(default)]
    pub card: CardConfig,

    /// Installation store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Bot registration. `appId`, `appSecret` and `baseUri` are required to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Overridden by HERALD_APP_ID env.
    pub app_id: Option<String>,
    /// Overridden by HERALD_APP_SECRET env.
    pub app_secret: Option<String>,
    /// Public base URI serving card images. Overridden by HERALD_BASE_URI env.
    pub base_uri: Option<String>,
    /// Bearer token for connector calls. Overridden by HERALD_CONNECTOR_TOKEN env.
    pub connector_token: Option<String>,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3978).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3978
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    /// Maximum welcome deliveries in flight at once (default 4, minimum 1).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Time budget in seconds for all connector calls made for one event (default 30).
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_event_timeout_secs() -> u64 {
    30
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            event_timeout_secs: default_event_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardConfig {
    /// Bold lead text of the welcome card. Built-in text when unset.
    pub welcome_text: Option<String>,
    /// When set, the card links to this URL for email notification signup.
    pub email_notifications_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Installation records file. Relative paths resolve against the config file's parent.
    /// Default: `installations.json` next to the config file.
    pub path: Option<PathBuf>,
}

/// Validated bot settings. Built once at startup; a missing field is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSettings {
    pub app_id: String,
    pub app_secret: String,
    pub base_uri: String,
}

impl BotSettings {
    /// Resolve required bot settings from env and config. The error names every missing field.
    pub fn resolve(config: &Config) -> Result<Self> {
        let app_id = env_or_config("HERALD_APP_ID", config.bot.app_id.as_deref());
        let app_secret = env_or_config("HERALD_APP_SECRET", config.bot.app_secret.as_deref());
        let base_uri = env_or_config("HERALD_BASE_URI", config.bot.base_uri.as_deref());
        match (app_id, app_secret, base_uri) {
            (Some(app_id), Some(app_secret), Some(base_uri)) => Ok(Self {
                app_id,
                app_secret,
                base_uri,
            }),
            (app_id, app_secret, base_uri) => {
                let missing: Vec<&str> = [
                    ("bot.appId", app_id.is_none()),
                    ("bot.appSecret", app_secret.is_none()),
                    ("bot.baseUri", base_uri.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| *name)
                .collect();
                anyhow::bail!("missing required configuration: {}", missing.join(", "))
            }
        }
    }
}

/// Trimmed env var if non-empty, else the trimmed config value if non-empty.
fn env_or_config(var: &str, configured: Option<&str>) -> Option<String> {
    std::env::var(var)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the connector bearer token: env HERALD_CONNECTOR_TOKEN overrides config.
pub fn resolve_connector_token(config: &Config) -> Option<String> {
    env_or_config(
        "HERALD_CONNECTOR_TOKEN",
        config.bot.connector_token.as_deref(),
    )
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HERALD_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".herald").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or HERALD_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the store path).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Resolve the installation store file: `store.path` if set (relative paths resolved against the
/// config file's parent), otherwise `installations.json` next to the config file.
pub fn resolve_store_path(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.store.path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                config_parent.join(p)
            }
        }
        _ => config_parent.join("installations.json"),
    }
}
