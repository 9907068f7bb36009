//! SecretResolver - fetches one secret from Key Vault per run
//!
//! Credentials are checked before any network call. What happens when
//! the fetch itself fails is governed by [`FetchFailurePolicy`].

use tracing::{error, info};

use crate::keyvault::vault_endpoint;
use crate::{FetchFailurePolicy, KeyVaultProvider, Provider, SecretsError, ServicePrincipalCredentials};

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

pub struct SecretResolver {
    authority_host: String,
    policy: FetchFailurePolicy,
}

impl SecretResolver {
    pub fn new() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            policy: FetchFailurePolicy::default(),
        }
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FetchFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve `secret_key` from the vault named `vault_name`.
    pub async fn resolve(
        &self,
        vault_name: &str,
        secret_key: &str,
        credentials: &ServicePrincipalCredentials,
    ) -> Result<String, SecretsError> {
        self.resolve_at(&vault_endpoint(vault_name), secret_key, credentials)
            .await
    }

    /// Resolve `secret_key` from an explicit vault endpoint.
    pub async fn resolve_at(
        &self,
        vault_url: &str,
        secret_key: &str,
        credentials: &ServicePrincipalCredentials,
    ) -> Result<String, SecretsError> {
        credentials.validate()?;

        let provider = KeyVaultProvider::new(vault_url, &self.authority_host, credentials.clone())?;

        match provider.get(secret_key).await {
            Ok(value) => {
                info!(secret = %secret_key, "Resolved secret from Key Vault");
                Ok(value)
            }
            Err(e) => self.on_fetch_failure(secret_key, e),
        }
    }

    fn on_fetch_failure(&self, secret_key: &str, e: SecretsError) -> Result<String, SecretsError> {
        match self.policy {
            FetchFailurePolicy::Propagate => Err(e),
            FetchFailurePolicy::EmptyString => {
                error!(
                    secret = %secret_key,
                    error = %e,
                    "Failed to fetch secret, continuing with an empty value"
                );
                Ok(String::new())
            }
        }
    }
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new()
    }
}
