//! Service Bus connection strings and Shared Access Signature tokens
//!
//! Format: `Endpoint=sb://{namespace}.servicebus.windows.net/;SharedAccessKeyName={name};SharedAccessKey={key}[;EntityPath={entity}]`

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

use crate::QueueError;

type HmacSha256 = Hmac<Sha256>;

/// Parsed namespace connection string
#[derive(Clone)]
pub struct ConnectionString {
    /// HTTP(S) base URL of the namespace, without trailing slash
    pub endpoint: String,
    pub shared_access_key_name: String,
    pub shared_access_key: String,
    pub entity_path: Option<String>,
}

impl ConnectionString {
    /// Namespace host, for logging
    pub fn host(&self) -> &str {
        self.endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.endpoint)
    }

    /// Build the `Authorization` header value for `resource_uri`, valid until `expiry` (unix seconds).
    pub fn sas_token(&self, resource_uri: &str, expiry: i64) -> String {
        sas_token(
            resource_uri,
            &self.shared_access_key_name,
            &self.shared_access_key,
            expiry,
        )
    }
}

impl FromStr for ConnectionString {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(QueueError::Config("connection string is empty".to_string()));
        }

        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                QueueError::Config(format!("malformed connection string segment: {}", redact(part)))
            })?;

            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim().to_string()),
                "sharedaccesskeyname" => key_name = Some(value.trim().to_string()),
                "sharedaccesskey" => key = Some(value.trim().to_string()),
                "entitypath" => entity_path = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| QueueError::Config("connection string has no Endpoint".to_string()))?;
        let shared_access_key_name = key_name
            .filter(|k| !k.is_empty())
            .ok_or_else(|| QueueError::Config("connection string has no SharedAccessKeyName".to_string()))?;
        let shared_access_key = key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| QueueError::Config("connection string has no SharedAccessKey".to_string()))?;

        Ok(Self {
            endpoint: http_endpoint(&endpoint)?,
            shared_access_key_name,
            shared_access_key,
            entity_path: entity_path.filter(|p| !p.is_empty()),
        })
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("shared_access_key", &"***")
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

/// `sb://` endpoints are served over HTTPS; explicit `http(s)://` endpoints are kept.
fn http_endpoint(endpoint: &str) -> Result<String, QueueError> {
    let trimmed = endpoint.trim_end_matches('/');
    if let Some(host) = trimmed.strip_prefix("sb://") {
        Ok(format!("https://{}", host))
    } else if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(trimmed.to_string())
    } else {
        Err(QueueError::Config(format!("unsupported endpoint scheme: {}", endpoint)))
    }
}

/// Shared Access Signature for `resource_uri`.
pub fn sas_token(resource_uri: &str, key_name: &str, key: &str, expiry: i64) -> String {
    let encoded_uri = urlencoding::encode(resource_uri);
    let string_to_sign = format!("{}\n{}", encoded_uri, expiry);

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    format!(
        "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
        encoded_uri,
        urlencoding::encode(&signature),
        expiry,
        key_name
    )
}

fn redact(segment: &str) -> String {
    match segment.split_once('=') {
        Some((name, _)) => format!("{}=***", name),
        None => format!("{}...", segment.chars().take(8).collect::<String>()),
    }
}
