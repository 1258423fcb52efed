//! Initialize the configuration directory: create ~/.herald and a default config.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, BotSettings};

static DEFAULT_CONFIG: &str = r#"{
  "bot": {
    "appId": "",
    "appSecret": "",
    "baseUri": ""
  },
  "gateway": {
    "port": 3978,
    "bind": "127.0.0.1"
  },
  "delivery": {
    "maxConcurrency": 4,
    "eventTimeoutSecs": 30
  },
  "card": {}
}
"#;

/// Ensure the configuration directory has been initialized and the bot settings are complete.
pub fn require_initialized(config_path: &Path, config: &config::Config) -> Result<BotSettings> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `herald init` first (config file not found: {})",
            config_path.display()
        );
    }
    BotSettings::resolve(config)
        .with_context(|| format!("validating {}", config_path.display()))
}

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` from the default template if missing.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, DEFAULT_CONFIG)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}
