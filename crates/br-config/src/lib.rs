//! busrelay Configuration System
//!
//! TOML-based configuration with environment variable override support.
//! Every field has a default; missing settings come back as empty strings
//! and [`AppConfig::validate`] rejects the ones a run cannot do without.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_bus: ServiceBusConfig,
    pub key_vault: KeyVaultConfig,
    pub secrets: SecretsConfig,
    pub ledger: LedgerConfig,
    pub pacing: PacingConfig,
}

/// Service Bus topic settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceBusConfig {
    #[serde(alias = "AsbTopicName")]
    pub topic_name: String,
    /// Loaded for completeness; the send path does not use it
    #[serde(alias = "AsbSubscriptionName")]
    pub subscription_name: String,
    /// Name of the secret holding the namespace connection string
    pub connection_secret_name: String,
}

impl Default for ServiceBusConfig {
    fn default() -> Self {
        Self {
            topic_name: String::new(),
            subscription_name: String::new(),
            connection_secret_name: "ServiceBusConnectionString".to_string(),
        }
    }
}

/// Azure Key Vault settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyVaultConfig {
    /// Vault name; the endpoint is derived from it
    #[serde(alias = "KeyVault")]
    pub name: String,
    /// Explicit vault URL, overrides the derived endpoint when set
    pub vault_url: String,
    /// Microsoft identity platform host used for the token request
    pub authority_host: String,
}

impl Default for KeyVaultConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            vault_url: String::new(),
            authority_host: "https://login.microsoftonline.com".to_string(),
        }
    }
}

impl KeyVaultConfig {
    /// Vault endpoint: the explicit URL if set, else `https://{name}.vault.azure.net/`.
    pub fn endpoint(&self) -> String {
        if self.vault_url.is_empty() {
            format!("https://{}.vault.azure.net/", self.name)
        } else {
            self.vault_url.clone()
        }
    }
}

/// Secret resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// `keyvault` or `env`
    pub provider: String,
    /// `empty` (log and continue with an empty value) or `propagate`
    pub on_fetch_failure: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            provider: "keyvault".to_string(),
            on_fetch_failure: "empty".to_string(),
        }
    }
}

/// Execution ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: String,
    /// `before_send` or `after_send`
    pub ordering: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: "execution.log".to_string(),
            ordering: "before_send".to_string(),
        }
    }
}

/// Send pacing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// `burst`, `rate` or `none`
    pub strategy: String,
    /// Messages allowed in a burst before pausing (burst strategy)
    pub burst_threshold: u32,
    /// Pause length in seconds (burst strategy)
    pub pause_secs: u64,
    /// Sustained messages per second (rate strategy)
    pub rate_per_second: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            strategy: "burst".to_string(),
            burst_threshold: 10,
            pause_secs: 10,
            rate_per_second: 1,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Fail fast on settings a relay run cannot do without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();

        if self.service_bus.topic_name.trim().is_empty() {
            missing.push("service_bus.topic_name (AsbTopicName)");
        }
        if self.service_bus.connection_secret_name.trim().is_empty() {
            missing.push("service_bus.connection_secret_name");
        }
        if self.secrets.provider == "keyvault"
            && self.key_vault.name.trim().is_empty()
            && self.key_vault.vault_url.trim().is_empty()
        {
            missing.push("key_vault.name (KeyVault)");
        }

        if !missing.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        match self.secrets.provider.as_str() {
            "keyvault" | "env" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown secrets provider: {}",
                    other
                )))
            }
        }

        if self.pacing.strategy == "burst" && self.pacing.burst_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "pacing.burst_threshold must be at least 1".to_string(),
            ));
        }
        if self.pacing.strategy == "rate" && self.pacing.rate_per_second == 0 {
            return Err(ConfigError::ValidationError(
                "pacing.rate_per_second must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# busrelay Configuration
# Environment variables override these settings

[service_bus]
topic_name = ""            # AsbTopicName
subscription_name = ""     # AsbSubscriptionName
connection_secret_name = "ServiceBusConnectionString"

[key_vault]
name = ""                  # KeyVault
vault_url = ""             # overrides https://{name}.vault.azure.net/
authority_host = "https://login.microsoftonline.com"

[secrets]
provider = "keyvault"      # keyvault, env
on_fetch_failure = "empty"  # empty, propagate

[ledger]
path = "execution.log"
ordering = "before_send"   # before_send, after_send

[pacing]
strategy = "burst"         # burst, rate, none
burst_threshold = 10
pause_secs = 10
rate_per_second = 1
"#
        .to_string()
    }
}
