use thiserror::Error;

use super::remote::RemoteError;
use crate::types::DisconnectReason;

/// Marker the remote uses while the phone handshake is still settling.
pub const COMPANION_HELLO_MARKER: &str = "CompanionHello";

/// Prefix of the error raised when pairing-code retries are exhausted.
pub const PAIRING_FAILED_MARKER: &str = "PAIRING_FAILED";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("PAIRING_FAILED: {0}")]
    PairingFailed(String),
    #[error("session disconnected: {0}")]
    Disconnected(DisconnectReason),
    #[error("remote signal stream closed before the session was ready")]
    SignalsClosed,
    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl SessionError {
    /// Errors that usually mean the persisted session is corrupt and a clean
    /// start may succeed.
    pub fn is_transient(&self) -> bool {
        is_transient_message(&self.to_string())
    }
}

/// Very short messages, handshake noise and exhausted pairing retries.
pub fn is_transient_message(message: &str) -> bool {
    message.len() <= 2
        || message.contains(COMPANION_HELLO_MARKER)
        || message.contains(PAIRING_FAILED_MARKER)
}
