use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the browser binary used by the automation driver.
pub const BROWSER_BIN_ENV: &str = "CHROME_BIN";

/// Transcoder looked up on `PATH` when no explicit binary is configured.
pub const DEFAULT_FFMPEG_BINARY: &str = "ffmpeg";

/// Options fixed for the lifetime of a session controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionOptions {
    /// Directory holding the persisted browser session.
    pub session_path: PathBuf,
    /// Phone number to link with a numeric pairing code instead of a QR code.
    pub pair_with_phone_number: Option<String>,
    /// Whether the phone shows a notification when a pairing code is requested.
    pub show_pairing_notification: bool,
    /// How often a fresh pairing code is requested while still unpaired.
    /// Written as whole milliseconds in JSON.
    #[serde(with = "duration_ms")]
    pub pairing_code_interval: Duration,
    /// Path to the ffmpeg binary used for media preprocessing.
    pub ffmpeg_path: Option<PathBuf>,
    /// Give up after this many QR codes have been shown.
    pub qr_max_retries: Option<u32>,
    /// Browser binary for the automation driver.
    pub browser_executable: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse options file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            session_path: PathBuf::from("./.wwebjs_auth/session"),
            pair_with_phone_number: None,
            show_pairing_notification: true,
            pairing_code_interval: Duration::from_secs(180),
            ffmpeg_path: None,
            qr_max_retries: None,
            browser_executable: None,
        }
    }
}

impl SessionOptions {
    /// Defaults plus any overrides present in the environment.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Load options from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let options: SessionOptions = serde_json::from_str(&contents)?;
        Ok(options.apply_env())
    }

    /// Fill the browser executable from `CHROME_BIN` unless one is already set.
    pub fn apply_env(mut self) -> Self {
        if self.browser_executable.is_none() {
            self.browser_executable = std::env::var_os(BROWSER_BIN_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from);
        }
        self
    }

    /// Override the session storage directory.
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }

    /// Link with a pairing code sent to this phone number.
    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.pair_with_phone_number = Some(phone_number.into());
        self
    }

    /// Toggle the phone notification for pairing codes.
    pub fn with_pairing_notification(mut self, show: bool) -> Self {
        self.show_pairing_notification = show;
        self
    }

    /// Override the pairing code refresh interval.
    pub fn with_pairing_code_interval(mut self, interval: Duration) -> Self {
        self.pairing_code_interval = interval;
        self
    }

    /// Use a specific ffmpeg binary.
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    /// Cap the number of QR codes emitted before giving up.
    pub fn with_qr_max_retries(mut self, retries: u32) -> Self {
        self.qr_max_retries = Some(retries);
        self
    }

    /// Override the automation browser binary.
    pub fn with_browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_executable = Some(path.into());
        self
    }

    /// The ffmpeg binary to invoke.
    pub fn ffmpeg_binary(&self) -> PathBuf {
        self.ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_BINARY))
    }
}

/// `Duration` as an integer number of milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
