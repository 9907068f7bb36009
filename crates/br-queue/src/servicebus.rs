//! Azure Service Bus topic sender over the REST "send message" API
//!
//! `POST {endpoint}/{topic}/messages` with a Shared Access Signature and a
//! `BrokerProperties` header carrying the message and correlation ids.

use async_trait::async_trait;
use br_common::OutboundMessage;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{ConnectionString, QueueError, Result, TopicPublisher};

const SEND_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";

struct ClientInner {
    http: Client,
    connection: ConnectionString,
    token_ttl: Duration,
    open: AtomicBool,
}

/// Namespace-level client; senders created from it stop working once it is closed.
pub struct ServiceBusClient {
    inner: Arc<ClientInner>,
}

impl ServiceBusClient {
    /// Default lifetime of each generated SAS token
    pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

    /// Build a client from a namespace connection string.
    ///
    /// An empty or malformed string fails here, before anything is sent.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let connection: ConnectionString = connection_string.parse()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| QueueError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(namespace = %connection.host(), "Opened Service Bus client");

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                connection,
                token_ttl: Self::DEFAULT_TOKEN_TTL,
                open: AtomicBool::new(true),
            }),
        })
    }

    /// Create a sender for `topic`. An empty topic falls back to the
    /// connection string's `EntityPath`.
    pub fn create_sender(&self, topic: &str) -> Result<ServiceBusSender> {
        let topic = if topic.is_empty() {
            self.inner.connection.entity_path.clone().unwrap_or_default()
        } else {
            topic.to_string()
        };

        if topic.is_empty() {
            return Err(QueueError::Config("topic name is empty".to_string()));
        }

        Ok(ServiceBusSender {
            inner: Arc::clone(&self.inner),
            resource_uri: format!("{}/{}", self.inner.connection.endpoint, topic),
            topic,
        })
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Close the client. Senders created from it reject further sends.
    pub async fn close(&self) {
        if self.inner.open.swap(false, Ordering::SeqCst) {
            info!(namespace = %self.inner.connection.host(), "Closed Service Bus client");
        }
    }
}

/// Sender bound to one topic
pub struct ServiceBusSender {
    inner: Arc<ClientInner>,
    topic: String,
    resource_uri: String,
}

impl ServiceBusSender {
    fn authorization(&self) -> String {
        let expiry = Utc::now().timestamp() + self.inner.token_ttl.as_secs() as i64;
        self.inner.connection.sas_token(&self.resource_uri, expiry)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties<'a> {
    message_id: &'a str,
    correlation_id: &'a str,
}

#[async_trait]
impl TopicPublisher for ServiceBusSender {
    fn identifier(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, message: OutboundMessage) -> Result<String> {
        if !self.inner.open.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let broker_properties = serde_json::to_string(&BrokerProperties {
            message_id: &message.message_id,
            correlation_id: &message.correlation_id,
        })?;

        let response = self
            .inner
            .http
            .post(format!("{}/messages", self.resource_uri))
            .header("Authorization", self.authorization())
            .header("BrokerProperties", broker_properties)
            .header("Content-Type", SEND_CONTENT_TYPE)
            .body(message.body)
            .send()
            .await?;

        let status = response.status();
        // 201 Created is the documented answer; accept any 2xx
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Send(format!(
                "topic {} returned {}: {}",
                self.topic, status, body
            )));
        }

        debug!(
            topic = %self.topic,
            message_id = %message.message_id,
            "Message sent to Service Bus"
        );

        Ok(message.message_id)
    }
}
