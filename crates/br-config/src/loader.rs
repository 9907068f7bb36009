//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "busrelay.toml",
    "config.toml",
    "./config/busrelay.toml",
    "/etc/busrelay/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file()? {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        } else {
            debug!("No configuration file found, using defaults");
        }

        apply_overrides(&mut config, |key| env::var(key).ok());

        Ok(config)
    }

    /// Find the configuration file to use.
    ///
    /// An explicit path that does not exist is an error; the search paths
    /// are optional.
    fn find_config_file(&self) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::ValidationError(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        if let Ok(path) = env::var("BUSRELAY_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists()))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `BUSRELAY_*` overrides, reading values through `lookup`.
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Service Bus
    if let Some(val) = lookup("BUSRELAY_ASB_TOPIC_NAME") {
        config.service_bus.topic_name = val;
    }
    if let Some(val) = lookup("BUSRELAY_ASB_SUBSCRIPTION_NAME") {
        config.service_bus.subscription_name = val;
    }
    if let Some(val) = lookup("BUSRELAY_ASB_SECRET_NAME") {
        config.service_bus.connection_secret_name = val;
    }

    // Key Vault
    if let Some(val) = lookup("BUSRELAY_KEY_VAULT") {
        config.key_vault.name = val;
    }
    if let Some(val) = lookup("BUSRELAY_KEY_VAULT_URL") {
        config.key_vault.vault_url = val;
    }
    if let Some(val) = lookup("BUSRELAY_AUTHORITY_HOST") {
        config.key_vault.authority_host = val;
    }

    // Secrets
    if let Some(val) = lookup("BUSRELAY_SECRETS_PROVIDER") {
        config.secrets.provider = val;
    }
    if let Some(val) = lookup("BUSRELAY_SECRETS_ON_FETCH_FAILURE") {
        config.secrets.on_fetch_failure = val;
    }

    // Ledger
    if let Some(val) = lookup("BUSRELAY_LEDGER_PATH") {
        config.ledger.path = val;
    }
    if let Some(val) = lookup("BUSRELAY_LEDGER_ORDERING") {
        config.ledger.ordering = val;
    }

    // Pacing
    if let Some(val) = lookup("BUSRELAY_PACING_STRATEGY") {
        config.pacing.strategy = val;
    }
    if let Some(val) = lookup("BUSRELAY_PACING_BURST_THRESHOLD") {
        if let Ok(threshold) = val.parse() {
            config.pacing.burst_threshold = threshold;
        }
    }
    if let Some(val) = lookup("BUSRELAY_PACING_PAUSE_SECS") {
        if let Ok(secs) = val.parse() {
            config.pacing.pause_secs = secs;
        }
    }
    if let Some(val) = lookup("BUSRELAY_PACING_RATE_PER_SECOND") {
        if let Ok(rate) = val.parse() {
            config.pacing.rate_per_second = rate;
        }
    }
}
