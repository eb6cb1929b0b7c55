//! Whatsweb-rust: session driver and media preprocessing for automated
//! WhatsApp Web clients.
//!
//! The remote web client is reached through the [`session::RemoteSession`]
//! trait; this crate decides what to do with it: how a device gets linked,
//! when the session counts as ready, when a corrupt session is wiped and
//! retried. Media sent through the client is prepared by
//! [`media::MediaPreprocessor`] first.
//!
//! ## Modules
//!
//! - `types` - Connection states, events, media payloads and send options
//! - `config` - Session options
//! - `session` - Authentication state machine, event bus and pairing
//! - `media` - Waveforms, transcoding and sticker metadata

pub mod config;
pub mod media;
pub mod session;
pub mod types;

pub use config::{ConfigError, SessionOptions};
pub use media::{MediaPreprocessor, PreparedMedia};
pub use session::{RemoteSession, SessionController, SessionError, SessionPhase};
pub use types::{ConnectionState, DisconnectReason, Event, MediaPayload, SendOptions};
