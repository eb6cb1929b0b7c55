//! Types module for session and media types.
//!
//! Connection states, event payloads, media payloads and send options shared
//! by the session controller and the media pipeline.

mod events;
mod media;

pub use events::*;
pub use media::{MediaPayload, SendOptions};
