use async_trait::async_trait;
use br_common::OutboundMessage;

pub mod connection;
pub mod error;
pub mod memory;
pub mod servicebus;

pub use connection::ConnectionString;
pub use error::QueueError;
pub use memory::InMemoryPublisher;
pub use servicebus::{ServiceBusClient, ServiceBusSender};

pub type Result<T> = std::result::Result<T, QueueError>;

/// Trait for publishing messages to a bus topic
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Get the topic identifier
    fn identifier(&self) -> &str;

    /// Publish a single message, returning its message id
    async fn publish(&self, message: OutboundMessage) -> Result<String>;
}
