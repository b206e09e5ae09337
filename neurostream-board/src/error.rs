//! Error types for board discovery and acquisition

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BoardError>;

#[derive(Error, Debug)]
pub enum BoardError {
    /// Every candidate endpoint was exhausted without a successful handshake.
    #[error("no device found: {0}")]
    NoDeviceFound(String),

    /// A single endpoint's handshake failed. `retryable` marks whether the
    /// caller may advance to the next candidate (timeouts, scan silence) or
    /// the endpoint actively rejected us (busy, protocol mismatch).
    #[error("connect failed: {reason}")]
    Connect { reason: String, retryable: bool },

    /// The device dropped mid-session. Fatal to the acquisition loop.
    #[error("device stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("board not connected")]
    NotConnected,

    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoardError {
    pub fn retryable<S: Into<String>>(reason: S) -> Self {
        Self::Connect {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn terminal<S: Into<String>>(reason: S) -> Self {
        Self::Connect {
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Whether the caller may try the next candidate endpoint.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { retryable: true, .. })
    }
}
