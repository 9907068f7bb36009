//! The file dispatch workflow
//!
//! 1. Resolve the source to a normalized absolute path; stop if the ledger has it.
//! 2. Snapshot the file through a temporary copy and load every line.
//! 3. Record the path in the ledger (before or after sending, see [`LedgerOrdering`]).
//! 4. Send each non-blank line as one message, pacing after every send.
//!
//! There is no retry: the first failed send aborts the rest of the file.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use br_common::DispatchJob;
use br_queue::TopicPublisher;
use tokio::fs;
use tracing::{debug, info, info_span, Instrument};

use crate::{BurstPacer, DispatchError, ExecutionLedger, PacingPolicy, Result};

/// When the ledger entry is written relative to sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerOrdering {
    /// Mark the file as attempted before the first send; a failed run is never retried.
    #[default]
    BeforeSend,
    /// Mark the file only once every message went out; a failed run can be rerun.
    AfterSend,
}

impl FromStr for LedgerOrdering {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "before_send" => Ok(Self::BeforeSend),
            "after_send" => Ok(Self::AfterSend),
            other => Err(DispatchError::Config(format!(
                "unknown ledger ordering: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The ledger already lists this file; nothing was sent
    AlreadyProcessed { path: PathBuf },
    Dispatched {
        path: PathBuf,
        correlation_id: String,
        sent: usize,
        skipped: usize,
    },
}

pub struct Dispatcher {
    publisher: Arc<dyn TopicPublisher>,
    ledger: Arc<dyn ExecutionLedger>,
    pacer: Box<dyn PacingPolicy>,
    ordering: LedgerOrdering,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn TopicPublisher>, ledger: Arc<dyn ExecutionLedger>) -> Self {
        Self {
            publisher,
            ledger,
            pacer: Box::new(BurstPacer::default()),
            ordering: LedgerOrdering::default(),
        }
    }

    pub fn with_pacing(mut self, pacer: Box<dyn PacingPolicy>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_ledger_ordering(mut self, ordering: LedgerOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Dispatch every non-blank line of `source` as one message.
    pub async fn dispatch(&mut self, source: &Path) -> Result<DispatchOutcome> {
        let source_path = resolve_path(source)?;

        if self.ledger.has_processed(&source_path).await? {
            info!(path = %source_path.display(), "File already processed, nothing to send");
            return Ok(DispatchOutcome::AlreadyProcessed { path: source_path });
        }

        info!(path = %source_path.display(), topic = %self.publisher.identifier(), "Processing file");

        let lines = snapshot_lines(&source_path).await?;
        let job = DispatchJob::new(source_path, lines);

        if self.ordering == LedgerOrdering::BeforeSend {
            self.ledger.record(&job.source_path).await?;
        }

        let span = info_span!("dispatch", correlation_id = %job.correlation_id);
        let sent = self.send_all(&job).instrument(span).await?;

        if self.ordering == LedgerOrdering::AfterSend {
            self.ledger.record(&job.source_path).await?;
        }

        let skipped = job.blank_line_count();
        info!(
            path = %job.source_path.display(),
            correlation_id = %job.correlation_id,
            sent,
            skipped,
            "File dispatched"
        );

        Ok(DispatchOutcome::Dispatched {
            path: job.source_path,
            correlation_id: job.correlation_id,
            sent,
            skipped,
        })
    }

    async fn send_all(&mut self, job: &DispatchJob) -> Result<usize> {
        self.pacer.reset();
        let mut sent = 0;

        for line in job.sendable_lines() {
            let message = job.message_for(line);
            let message_id = self
                .publisher
                .publish(message)
                .await
                .map_err(|source| DispatchError::Send { sent, source })?;

            sent += 1;
            info!(message_id = %message_id, "Sent");

            self.pacer.after_send().await;
        }

        Ok(sent)
    }
}

/// Absolute form of `source` with `.` and `..` collapsed lexically.
///
/// Symlinks are not followed and the file need not exist.
fn resolve_path(source: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(source).map_err(|e| DispatchError::io(source, e))?;
    Ok(normalize(&absolute))
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // Popping past the root leaves the root in place
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Copy `source` to a temporary file, read every line from the copy, then delete it.
async fn snapshot_lines(source: &Path) -> Result<Vec<String>> {
    snapshot_lines_in(&std::env::temp_dir(), source).await
}

async fn snapshot_lines_in(temp_dir: &Path, source: &Path) -> Result<Vec<String>> {
    let snapshot = tempfile::NamedTempFile::new_in(temp_dir).map_err(|e| DispatchError::io(temp_dir, e))?;
    let snapshot_path = snapshot.path().to_path_buf();

    fs::copy(source, &snapshot_path)
        .await
        .map_err(|e| DispatchError::io(source, e))?;
    let contents = fs::read_to_string(&snapshot_path)
        .await
        .map_err(|e| DispatchError::io(&snapshot_path, e))?;

    snapshot
        .close()
        .map_err(|e| DispatchError::io(&snapshot_path, e))?;

    let contents = contents.strip_prefix('\u{feff}').unwrap_or(&contents);
    let lines: Vec<String> = contents.lines().map(str::to_string).collect();
    debug!(path = %source.display(), lines = lines.len(), "Loaded file snapshot");
    Ok(lines)
}
