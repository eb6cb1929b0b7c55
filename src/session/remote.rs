//! The live remote client as seen by the session controller.
//!
//! A browser automation layer implements [`RemoteSession`]; the controller
//! only calls these methods and consumes the [`RemoteSignal`] stream returned
//! by [`RemoteSession::open`].

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::SessionOptions;
use crate::types::ConnectionState;

/// Failure reported by the remote client. Only the message is available, so
/// retry decisions are made by inspecting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Notifications pushed by the remote page after it has been opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSignal {
    /// The application state changed
    StateChanged(ConnectionState),
    /// Initial synchronisation finished
    Synced,
    /// Offline message delivery progress, in percent
    OfflineProgress(u8),
    /// The pairing ref rotated; a new QR payload is due
    RefChanged(String),
    /// A logout was started, locally or from the phone
    LogoutRequested,
    /// The page navigated
    Navigated { url: String },
}

/// Key material the QR payload is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCredentials {
    pub current_ref: String,
    /// Noise static public key
    pub static_key: Vec<u8>,
    /// Identity public key
    pub identity_key: Vec<u8>,
    /// Advertisement secret, already base64
    pub adv_secret_key: String,
    pub platform: String,
}

/// Capability surface of the remote client.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Launch the client against the persisted session and return its signal stream.
    async fn open(
        &self,
        options: &SessionOptions,
    ) -> Result<mpsc::UnboundedReceiver<RemoteSignal>, RemoteError>;

    /// Current application state.
    async fn app_state(&self) -> Result<ConnectionState, RemoteError>;

    /// Whether initial synchronisation already completed.
    async fn has_synced(&self) -> Result<bool, RemoteError>;

    async fn qr_credentials(&self) -> Result<QrCredentials, RemoteError>;

    /// Ask for a numeric linking code for `phone_number`.
    async fn start_code_linking(
        &self,
        phone_number: &str,
        show_notification: bool,
    ) -> Result<String, RemoteError>;

    /// Ask the remote to generate a new QR ref.
    async fn refresh_qr(&self) -> Result<(), RemoteError>;

    /// Expose the remote data stores to the message services.
    async fn inject_store(&self) -> Result<(), RemoteError>;

    async fn close(&self) -> Result<(), RemoteError>;
}
