//! In-memory topic publisher
//!
//! Records every published message with the (tokio) instant it was sent.
//! Can be told to start failing after a number of sends.

use async_trait::async_trait;
use br_common::OutboundMessage;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{QueueError, Result, TopicPublisher};

pub struct InMemoryPublisher {
    identifier: String,
    sent: Mutex<Vec<(Instant, OutboundMessage)>>,
    fail_after: Option<usize>,
}

impl InMemoryPublisher {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            sent: Mutex::new(Vec::new()),
            fail_after: None,
        }
    }

    /// Accept `count` messages, then fail every further send.
    pub fn failing_after(identifier: &str, count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::new(identifier)
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn sent_at(&self) -> Vec<Instant> {
        self.sent.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl TopicPublisher for InMemoryPublisher {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn publish(&self, message: OutboundMessage) -> Result<String> {
        let mut sent = self.sent.lock();

        if matches!(self.fail_after, Some(limit) if sent.len() >= limit) {
            return Err(QueueError::Send(format!(
                "{} rejected message {}",
                self.identifier, message.message_id
            )));
        }

        let id = message.message_id.clone();
        sent.push((Instant::now(), message));
        Ok(id)
    }
}
