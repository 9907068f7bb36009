use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

pub mod logging;

// ============================================================================
// Core Message Types
// ============================================================================

/// A single message bound for a bus topic.
///
/// One is built per non-blank source line and lives only for the duration
/// of the send call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// Raw UTF-8 bytes of the source line
    pub body: Vec<u8>,
    /// Shared by every message produced from the same file
    pub correlation_id: String,
    /// Unique per message
    pub message_id: String,
}

impl OutboundMessage {
    /// Build a message for one line, assigning a fresh message id.
    pub fn from_line(line: &str, correlation_id: &str) -> Self {
        Self {
            body: line.as_bytes().to_vec(),
            correlation_id: correlation_id.to_string(),
            message_id: new_identifier(),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Snapshot of a source file taken once per invocation.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    /// Absolute path of the source file, as written to the ledger
    pub source_path: PathBuf,
    pub correlation_id: String,
    /// Every line of the file in order, blank lines included
    pub lines: Vec<String>,
}

impl DispatchJob {
    pub fn new(source_path: PathBuf, lines: Vec<String>) -> Self {
        Self {
            source_path,
            correlation_id: new_identifier(),
            lines,
        }
    }

    /// Lines that produce a message, in file order.
    pub fn sendable_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|line| !is_blank(line))
    }

    pub fn blank_line_count(&self) -> usize {
        self.lines.iter().filter(|line| is_blank(line)).count()
    }

    /// Build the outbound message for a line of this job.
    pub fn message_for(&self, line: &str) -> OutboundMessage {
        OutboundMessage::from_line(line, &self.correlation_id)
    }
}

/// Empty and whitespace-only lines are never sent.
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Opaque identifier used for correlation and message ids.
pub fn new_identifier() -> String {
    Uuid::new_v4().to_string()
}
