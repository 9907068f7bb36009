//! busrelay Secrets Management
//!
//! Resolves the Service Bus connection secret at startup. Two backends:
//! - Azure Key Vault, authenticated with service-principal credentials
//! - Environment variables (local runs without a vault)
//!
//! Secrets are held in memory only and never logged.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod env;
mod keyvault;
mod resolver;

pub use env::EnvProvider;
pub use keyvault::{vault_endpoint, KeyVaultProvider};
pub use resolver::SecretResolver;

/// Environment variable holding the service principal's tenant id
pub const TENANT_ID_VAR: &str = "KVT_TENANT_ID";
/// Environment variable holding the service principal's client id
pub const CLIENT_ID_VAR: &str = "KVT_CLIENT_ID";
/// Environment variable holding the service principal's client secret
pub const CLIENT_SECRET_VAR: &str = "KVT_CLIENT_SECRET";

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Secret not found: {0}")]
    NotFound(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Secrets provider trait
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get a secret by key
    async fn get(&self, key: &str) -> Result<String, SecretsError>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Service-principal credentials for the secret store.
#[derive(Clone, Default)]
pub struct ServicePrincipalCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl ServicePrincipalCredentials {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read `KVT_TENANT_ID`, `KVT_CLIENT_ID` and `KVT_CLIENT_SECRET`.
    ///
    /// Absent variables come back empty; [`validate`](Self::validate)
    /// reports them.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            tenant_id: lookup(TENANT_ID_VAR).unwrap_or_default(),
            client_id: lookup(CLIENT_ID_VAR).unwrap_or_default(),
            client_secret: lookup(CLIENT_SECRET_VAR).unwrap_or_default(),
        }
    }

    /// Every component must be present and non-empty.
    pub fn validate(&self) -> Result<(), SecretsError> {
        let missing: Vec<&str> = [
            (TENANT_ID_VAR, &self.tenant_id),
            (CLIENT_ID_VAR, &self.client_id),
            (CLIENT_SECRET_VAR, &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SecretsError::Configuration(format!(
                "environment variables not set correctly: {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for ServicePrincipalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipalCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// What the resolver does when the secret store cannot deliver a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchFailurePolicy {
    /// Return the error to the caller
    Propagate,
    /// Log the error and hand back an empty string
    #[default]
    EmptyString,
}

impl FromStr for FetchFailurePolicy {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "propagate" => Ok(Self::Propagate),
            "empty" | "empty_string" => Ok(Self::EmptyString),
            other => Err(SecretsError::Configuration(format!(
                "unknown fetch failure policy: {}",
                other
            ))),
        }
    }
}
