//! Session authentication and lifecycle.

pub mod controller;
pub mod error;
pub mod events;
pub mod pairing;
pub mod remote;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{SessionController, SessionPhase, DEFAULT_MAX_ATTEMPTS, RETRY_BACKOFF_STEP};
pub use error::SessionError;
pub use events::{Channel, EventBus};
pub use pairing::{qr_payload, render_qr_ascii, request_pairing_code};
pub use remote::{QrCredentials, RemoteError, RemoteSession, RemoteSignal};
