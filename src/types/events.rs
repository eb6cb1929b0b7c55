//! Connection states and event payloads.
//!
//! These are the values emitted by the session controller while it drives the
//! remote web client through pairing and synchronisation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Application state reported by the remote web client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Conflict,
    Connected,
    DeprecatedVersion,
    Opening,
    Pairing,
    #[serde(rename = "PROXYBLOCK")]
    ProxyBlock,
    SmbTosBlock,
    Timeout,
    TosBlock,
    Unlaunched,
    Unpaired,
    UnpairedIdle,
}

impl ConnectionState {
    /// States the remote passes through before it settles on paired or unpaired.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            ConnectionState::Opening | ConnectionState::Unlaunched | ConnectionState::Pairing
        )
    }

    /// Whether the account still needs to be linked.
    pub fn is_unpaired(self) -> bool {
        matches!(self, ConnectionState::Unpaired | ConnectionState::UnpairedIdle)
    }

    /// Terminal states end the session with the matching reason.
    pub fn disconnect_reason(self) -> Option<DisconnectReason> {
        match self {
            ConnectionState::Conflict => Some(DisconnectReason::Conflict),
            ConnectionState::DeprecatedVersion => Some(DisconnectReason::DeprecatedVersion),
            ConnectionState::ProxyBlock => Some(DisconnectReason::ProxyBlock),
            ConnectionState::SmbTosBlock => Some(DisconnectReason::SmbTosBlock),
            ConnectionState::Timeout => Some(DisconnectReason::Timeout),
            ConnectionState::TosBlock => Some(DisconnectReason::TosBlock),
            _ => None,
        }
    }

    /// Wire name used by the remote client, e.g. `UNPAIRED_IDLE`.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Conflict => "CONFLICT",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::DeprecatedVersion => "DEPRECATED_VERSION",
            ConnectionState::Opening => "OPENING",
            ConnectionState::Pairing => "PAIRING",
            ConnectionState::ProxyBlock => "PROXYBLOCK",
            ConnectionState::SmbTosBlock => "SMB_TOS_BLOCK",
            ConnectionState::Timeout => "TIMEOUT",
            ConnectionState::TosBlock => "TOS_BLOCK",
            ConnectionState::Unlaunched => "UNLAUNCHED",
            ConnectionState::Unpaired => "UNPAIRED",
            ConnectionState::UnpairedIdle => "UNPAIRED_IDLE",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when the remote reports a state this crate does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownState(pub String);

impl fmt::Display for UnknownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown connection state: {}", self.0)
    }
}

impl std::error::Error for UnknownState {}

impl FromStr for ConnectionState {
    type Err = UnknownState;

    /// Separators and case are ignored, so `PROXYBLOCK`, `proxy_block` and
    /// `ProxyBlock` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let state = match normalized.as_str() {
            "CONFLICT" => ConnectionState::Conflict,
            "CONNECTED" => ConnectionState::Connected,
            "DEPRECATEDVERSION" => ConnectionState::DeprecatedVersion,
            "OPENING" => ConnectionState::Opening,
            "PAIRING" => ConnectionState::Pairing,
            "PROXYBLOCK" => ConnectionState::ProxyBlock,
            "SMBTOSBLOCK" => ConnectionState::SmbTosBlock,
            "TIMEOUT" => ConnectionState::Timeout,
            "TOSBLOCK" => ConnectionState::TosBlock,
            "UNLAUNCHED" => ConnectionState::Unlaunched,
            "UNPAIRED" => ConnectionState::Unpaired,
            "UNPAIREDIDLE" => ConnectionState::UnpairedIdle,
            _ => return Err(UnknownState(s.to_string())),
        };
        Ok(state)
    }
}

/// Reason attached to a `disconnected` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The account was logged out, locally or from the phone
    Logout,
    /// Too many QR codes were shown without being scanned
    MaxQrRetries,
    Conflict,
    DeprecatedVersion,
    ProxyBlock,
    SmbTosBlock,
    Timeout,
    TosBlock,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisconnectReason::Logout => "logout",
            DisconnectReason::MaxQrRetries => "max qr retries",
            DisconnectReason::Conflict => "conflict",
            DisconnectReason::DeprecatedVersion => "deprecated version",
            DisconnectReason::ProxyBlock => "proxy block",
            DisconnectReason::SmbTosBlock => "smb tos block",
            DisconnectReason::Timeout => "timeout",
            DisconnectReason::TosBlock => "tos block",
        };
        f.write_str(name)
    }
}

/// Every event the controller can emit, for callers that prefer a single sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// QR payload to render and scan
    Qr(String),
    /// Numeric pairing code to type on the phone
    Code(String),
    Authenticated,
    Ready,
    AuthStateChanged(ConnectionState),
    /// Offline message delivery progress, in percent
    LoadingProgress(u8),
    Disconnected(DisconnectReason),
}
