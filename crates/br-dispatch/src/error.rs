use std::path::PathBuf;
use thiserror::Error;

use br_queue::QueueError;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Send failed after {sent} message(s): {source}")]
    Send {
        sent: usize,
        #[source]
        source: QueueError,
    },

    #[error("Invalid setting: {0}")]
    Config(String),
}

impl DispatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DispatchError::Io {
            path: path.into(),
            source,
        }
    }
}
