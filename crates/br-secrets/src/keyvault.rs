//! Azure Key Vault secrets provider
//!
//! Authenticates with the OAuth2 client-credentials grant against the
//! Microsoft identity platform, then reads secrets through the Key Vault
//! REST API.
//!
//! Configuration:
//! - vault_url: `https://{vault-name}.vault.azure.net/`
//! - authority_host: `https://login.microsoftonline.com`
//! - service-principal credentials (tenant, client id, client secret)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{Provider, SecretsError, ServicePrincipalCredentials};

/// Key Vault REST API version
pub const API_VERSION: &str = "7.4";

/// OAuth2 scope granting access to Key Vault data
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Endpoint for a vault name: `https://{name}.vault.azure.net/`
pub fn vault_endpoint(vault_name: &str) -> String {
    format!("https://{}.vault.azure.net/", vault_name)
}

/// Azure Key Vault secret provider
pub struct KeyVaultProvider {
    client: Client,
    vault_url: String,
    authority_host: String,
    credentials: ServicePrincipalCredentials,
}

impl KeyVaultProvider {
    /// Create a new Key Vault provider
    ///
    /// # Arguments
    /// * `vault_url` - Vault endpoint (e.g., "https://my-vault.vault.azure.net/")
    /// * `authority_host` - Identity platform host (e.g., "https://login.microsoftonline.com")
    /// * `credentials` - Service principal used for the token request
    pub fn new(
        vault_url: &str,
        authority_host: &str,
        credentials: ServicePrincipalCredentials,
    ) -> Result<Self, SecretsError> {
        credentials.validate()?;

        if vault_url.trim().is_empty() {
            return Err(SecretsError::Configuration("Key Vault URL is empty".to_string()));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| SecretsError::ProviderError(format!("Failed to create HTTP client: {}", e)))?;

        info!(vault_url = %vault_url, "Initialized Azure Key Vault provider");

        Ok(Self {
            client,
            vault_url: vault_url.trim_end_matches('/').to_string(),
            authority_host: authority_host.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Request an access token for the vault scope
    async fn acquire_token(&self) -> Result<String, SecretsError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.credentials.tenant_id
        );

        debug!(url = %url, client_id = %self.credentials.client_id, "Requesting Key Vault access token");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", VAULT_SCOPE),
        ];

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| SecretsError::ProviderError(format!("Failed to reach token endpoint: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SecretsError::Authentication(format!(
                "token endpoint returned {}: {}",
                status,
                describe_token_error(&body)
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            SecretsError::Authentication(format!("Failed to parse token response: {}", e))
        })?;

        Ok(token.access_token)
    }

    /// Read the current version of a secret
    async fn get_secret(&self, name: &str) -> Result<String, SecretsError> {
        let token = self.acquire_token().await?;
        let url = format!(
            "{}/secrets/{}?api-version={}",
            self.vault_url, name, API_VERSION
        );

        debug!(url = %url, "Reading secret from Key Vault");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SecretsError::ProviderError(format!("Failed to connect to Key Vault: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(SecretsError::NotFound(name.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let status = response.status();
                return Err(SecretsError::Authentication(format!(
                    "Key Vault denied access to '{}' ({})",
                    name, status
                )));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(SecretsError::ProviderError(format!(
                    "Key Vault returned error {}: {}",
                    status, body
                )));
            }
            _ => {}
        }

        let bundle: SecretBundle = response.json().await.map_err(|e| {
            SecretsError::ProviderError(format!("Failed to parse Key Vault response: {}", e))
        })?;

        bundle
            .value
            .ok_or_else(|| SecretsError::NotFound(format!("{} (no value)", name)))
    }
}

#[async_trait]
impl Provider for KeyVaultProvider {
    async fn get(&self, key: &str) -> Result<String, SecretsError> {
        debug!(key = %key, "Retrieving secret from Azure Key Vault");
        self.get_secret(key).await
    }

    fn name(&self) -> &str {
        "keyvault"
    }
}

fn describe_token_error(body: &str) -> String {
    match serde_json::from_str::<TokenError>(body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("{}: {}", err.error, description),
            None => err.error,
        },
        Err(_) => body.to_string(),
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth2 error response
#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    error_description: Option<String>,
}

/// Key Vault secret bundle (only the fields read here)
#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: Option<String>,
}
