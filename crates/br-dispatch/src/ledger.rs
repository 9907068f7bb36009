//! Execution ledger: the record of files already dispatched
//!
//! The file backend stores one absolute path per line, append-only, and
//! reads the whole file on every membership check. It is a single-process
//! guard: two processes checking the same unseen path at the same time
//! will both see it as new.
//!
//! Entries are the path's raw OS bytes. UTF-8 paths compare ignoring case;
//! any other path only matches an entry with identical bytes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{DispatchError, Result};

#[async_trait]
pub trait ExecutionLedger: Send + Sync {
    /// Whether `path` was recorded before. Comparison ignores case.
    async fn has_processed(&self, path: &Path) -> Result<bool>;

    /// Append `path` to the ledger.
    async fn record(&self, path: &Path) -> Result<()>;
}

/// Plain-text ledger file
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Ledger entries, one per line; `\r\n` endings are accepted.
fn entries(contents: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    contents
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
}

fn same_path(entry: &[u8], candidate: &[u8]) -> bool {
    match (std::str::from_utf8(entry), std::str::from_utf8(candidate)) {
        (Ok(entry), Ok(candidate)) => entry.to_lowercase() == candidate.to_lowercase(),
        _ => entry == candidate,
    }
}

#[async_trait]
impl ExecutionLedger for FileLedger {
    async fn has_processed(&self, path: &Path) -> Result<bool> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(ledger = %self.path.display(), "Ledger does not exist yet");
                return Ok(false);
            }
            Err(e) => return Err(DispatchError::io(&self.path, e)),
        };

        let candidate = path.as_os_str().as_encoded_bytes();
        let found = entries(&contents).any(|entry| same_path(entry, candidate));
        Ok(found)
    }

    async fn record(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| DispatchError::io(&self.path, e))?;

        let mut entry = path.as_os_str().as_encoded_bytes().to_vec();
        entry.push(b'\n');
        file.write_all(&entry)
            .await
            .map_err(|e| DispatchError::io(&self.path, e))?;
        file.sync_data()
            .await
            .map_err(|e| DispatchError::io(&self.path, e))?;

        debug!(ledger = %self.path.display(), entry = %path.display(), "Recorded ledger entry");
        Ok(())
    }
}
