//! Media payloads and the per-send options that control how they are processed.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Media to be sent, carried as base64 so it can cross into the remote page unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    /// MIME type, possibly with parameters (`audio/ogg; codecs=opus`)
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
    pub file_name: Option<String>,
    /// Size in bytes, when known
    pub file_size: Option<u64>,
}

impl MediaPayload {
    /// Wrap raw bytes.
    pub fn from_bytes(
        bytes: &[u8],
        mime_type: impl Into<String>,
        file_name: Option<String>,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
            file_name,
            file_size: Some(bytes.len() as u64),
        }
    }

    /// Read a local file, guessing the MIME type from its extension.
    ///
    /// Unknown extensions fall back to `application/octet-stream`.
    pub fn from_file_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let mime_type = mime_guess::from_path(path).first_or_octet_stream();
        Ok(Self::from_bytes(&bytes, mime_type.essence_str(), file_name))
    }

    /// Decode the base64 data.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }

    /// MIME type without parameters, lowercased.
    pub fn essence(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// Subtype of the MIME essence, used as a file extension for scratch files.
    pub fn subtype(&self) -> Option<String> {
        self.essence()
            .split('/')
            .nth(1)
            .filter(|sub| !sub.is_empty())
            .map(str::to_string)
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.to_ascii_lowercase().contains("video")
    }

    pub fn is_webp(&self) -> bool {
        self.essence() == "image/webp"
    }

    /// Whether the MIME parameters already declare the opus codec.
    pub fn declares_opus(&self) -> bool {
        self.mime_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .any(|(key, value)| {
                key.trim().eq_ignore_ascii_case("codecs")
                    && value
                        .trim_matches(|c: char| c == '"' || c.is_whitespace())
                        .split(',')
                        .any(|codec| codec.trim().eq_ignore_ascii_case("opus"))
            })
    }
}

/// Flags and sticker metadata supplied with a single send call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Send audio as a voice note (push-to-talk)
    pub send_audio_as_voice: bool,
    /// Send video as an inline looping gif
    pub send_video_as_gif: bool,
    pub send_media_as_sticker: bool,
    pub send_media_as_document: bool,
    pub is_view_once: bool,
    pub sticker_name: Option<String>,
    pub sticker_author: Option<String>,
    pub sticker_categories: Option<Vec<String>>,
    /// Pre-computed voice waveform; skips waveform generation when present
    pub waveform: Option<Vec<u8>>,
}

impl SendOptions {
    pub fn voice() -> Self {
        Self {
            send_audio_as_voice: true,
            ..Default::default()
        }
    }

    pub fn sticker() -> Self {
        Self {
            send_media_as_sticker: true,
            ..Default::default()
        }
    }

    pub fn with_sticker_name(mut self, name: impl Into<String>) -> Self {
        self.sticker_name = Some(name.into());
        self
    }

    pub fn with_sticker_author(mut self, author: impl Into<String>) -> Self {
        self.sticker_author = Some(author.into());
        self
    }

    pub fn with_sticker_categories(mut self, categories: Vec<String>) -> Self {
        self.sticker_categories = Some(categories);
        self
    }

    pub fn with_waveform(mut self, waveform: Vec<u8>) -> Self {
        self.waveform = Some(waveform);
        self
    }

    /// Whether pack naming metadata should be embedded in the sticker.
    pub fn has_sticker_metadata(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.sticker_name) || present(&self.sticker_author)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opus_codec_detection() {
        let opus = MediaPayload::from_bytes(b"x", "audio/ogg; codecs=opus", None);
        assert!(opus.declares_opus());

        let quoted = MediaPayload::from_bytes(b"x", "audio/webm; codecs=\"opus\"", None);
        assert!(quoted.declares_opus());

        let plain_ogg = MediaPayload::from_bytes(b"x", "audio/ogg", None);
        assert!(!plain_ogg.declares_opus());

        let mp3 = MediaPayload::from_bytes(b"x", "audio/mpeg", None);
        assert!(!mp3.declares_opus());
    }

    #[test]
    fn test_essence_and_subtype() {
        let media = MediaPayload::from_bytes(b"abc", "Video/MP4; foo=bar", Some("a.mp4".into()));
        assert_eq!(media.essence(), "video/mp4");
        assert_eq!(media.subtype().as_deref(), Some("mp4"));
        assert!(media.is_video());
        assert_eq!(media.file_size, Some(3));
        assert_eq!(media.decode().unwrap(), b"abc");
    }

    #[test]
    fn test_from_file_path_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let media = MediaPayload::from_file_path(&path).unwrap();
        assert_eq!(media.mime_type, "video/webm");
        assert_eq!(media.file_name.as_deref(), Some("clip.webm"));
        assert_eq!(media.file_size, Some(4));
    }

    #[test]
    fn test_from_file_path_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let known = dir.path().join("Note.MP3");
        let unknown = dir.path().join("blob.zzqx");
        std::fs::write(&known, b"id3").unwrap();
        std::fs::write(&unknown, b"??").unwrap();

        assert_eq!(MediaPayload::from_file_path(&known).unwrap().mime_type, "audio/mpeg");
        assert_eq!(
            MediaPayload::from_file_path(&unknown).unwrap().mime_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_sticker_metadata_presence() {
        assert!(!SendOptions::sticker().has_sticker_metadata());
        assert!(!SendOptions::sticker()
            .with_sticker_name("")
            .has_sticker_metadata());
        assert!(SendOptions::sticker()
            .with_sticker_author("me")
            .has_sticker_metadata());
    }
}
