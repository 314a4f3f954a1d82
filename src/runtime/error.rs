//! Errors raised while moving bytes between files and connections.

use std::io;
use std::path::PathBuf;

use super::buffer::BufferError;

/// Errors produced by channels, the copier and transfer sessions.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to open '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("shutdown failed: {0}")]
    Shutdown(#[source] io::Error),

    #[error("failed to map '{}': {source}", .path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl TransferError {
    /// The underlying OS error kind, when there is one.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            TransferError::FileNotFound(_) => Some(io::ErrorKind::NotFound),
            TransferError::Open { source, .. }
            | TransferError::Bind { source, .. }
            | TransferError::Connect { source, .. }
            | TransferError::Map { source, .. } => Some(source.kind()),
            TransferError::Accept(e)
            | TransferError::Read(e)
            | TransferError::Write(e)
            | TransferError::Shutdown(e) => Some(e.kind()),
            TransferError::Buffer(_) => None,
        }
    }
}
