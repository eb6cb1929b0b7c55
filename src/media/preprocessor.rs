//! Media preprocessing before a payload is handed to the remote client.
//!
//! The remote page cannot reliably decode audio or encode WebP in a headless
//! browser, so that work happens here: voice notes are re-encoded to
//! Opus/Ogg and get a waveform, video stickers become animated WebP, and
//! sticker pack metadata is embedded. Each stage degrades to its input when
//! it fails; a send is never aborted by preprocessing.

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::sticker::inject_sticker_metadata;
use super::transcode::{FfmpegRunner, TranscodeRunner};
use super::waveform::{compute_waveform_from_pcm, Waveform};
use crate::config::SessionOptions;
use crate::types::{MediaPayload, SendOptions};

/// MIME type of converted voice notes.
pub const VOICE_MIME_TYPE: &str = "audio/ogg; codecs=opus";

/// MIME type of converted stickers.
pub const STICKER_MIME_TYPE: &str = "image/webp";

const STICKER_FILTER: &str = "scale='iw*min(300/iw,300/ih)':'ih*min(300/iw,300/ih)',\
format=rgba,\
pad=300:300:'(300-iw)/2':'(300-ih)/2':'#00000000',\
setsar=1,fps=10";

/// Payload ready for the transport, plus the voice waveform when one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMedia {
    pub media: MediaPayload,
    pub waveform: Option<Vec<u8>>,
}

/// Runs the transcoder-backed media stages.
#[derive(Clone)]
pub struct MediaPreprocessor {
    runner: Arc<dyn TranscodeRunner>,
}

impl MediaPreprocessor {
    pub fn new(runner: Arc<dyn TranscodeRunner>) -> Self {
        Self { runner }
    }

    /// Preprocessor using the ffmpeg binary configured in `options`.
    pub fn from_options(options: &SessionOptions) -> Self {
        Self::new(Arc::new(FfmpegRunner::new(options.ffmpeg_binary())))
    }

    /// Decode audio to mono 16 kHz f32 PCM and compute its 64-bar envelope.
    ///
    /// `None` when the transcoder fails or produces no output file.
    pub async fn generate_waveform(
        &self,
        audio: &[u8],
        cancel: &CancellationToken,
    ) -> Option<Waveform> {
        let pcm = self
            .transcode("waveform generation", audio, "audio", "raw", cancel, |input, output| {
                vec![
                    "-i".into(),
                    path_arg(input),
                    "-ac".into(),
                    "1".into(),
                    "-ar".into(),
                    "16000".into(),
                    "-f".into(),
                    "f32le".into(),
                    "-acodec".into(),
                    "pcm_f32le".into(),
                    path_arg(output),
                ]
            })
            .await?;

        Some(compute_waveform_from_pcm(&pcm))
    }

    /// Re-encode audio as mono 48 kHz, 128 kbps Opus in an Ogg container.
    pub async fn convert_to_voice_format(
        &self,
        media: &MediaPayload,
        cancel: &CancellationToken,
    ) -> Option<MediaPayload> {
        let audio = decode_or_warn(media, "voice conversion")?;
        let ext = scratch_extension(media, "audio");

        let ogg = self
            .transcode("audio to ogg/opus conversion", &audio, &ext, "ogg", cancel, |input, output| {
                vec![
                    "-i".into(),
                    path_arg(input),
                    "-ac".into(),
                    "1".into(),
                    "-ar".into(),
                    "48000".into(),
                    "-c:a".into(),
                    "libopus".into(),
                    "-b:a".into(),
                    "128k".into(),
                    path_arg(output),
                ]
            })
            .await?;

        let file_name = Path::new(media.file_name.as_deref().unwrap_or("audio.ogg"))
            .with_extension("ogg")
            .to_string_lossy()
            .into_owned();

        Some(MediaPayload::from_bytes(&ogg, VOICE_MIME_TYPE, Some(file_name)))
    }

    /// Turn a video into a 512x512, at most 5 second, 10 fps animated WebP
    /// without audio. Non-video input yields `None`.
    pub async fn convert_video_to_animated_sticker(
        &self,
        media: &MediaPayload,
        cancel: &CancellationToken,
    ) -> Option<MediaPayload> {
        if !media.is_video() {
            return None;
        }

        let video = decode_or_warn(media, "sticker conversion")?;
        let ext = scratch_extension(media, "mp4");

        let webp = self
            .transcode("video to webp sticker conversion", &video, &ext, "webp", cancel, |input, output| {
                vec![
                    "-i".into(),
                    path_arg(input),
                    "-vcodec".into(),
                    "libwebp".into(),
                    "-vf".into(),
                    STICKER_FILTER.into(),
                    "-loop".into(),
                    "0".into(),
                    "-ss".into(),
                    "00:00:00.0".into(),
                    "-t".into(),
                    "00:00:05.0".into(),
                    "-preset".into(),
                    "default".into(),
                    "-an".into(),
                    "-vsync".into(),
                    "0".into(),
                    "-s".into(),
                    "512:512".into(),
                    path_arg(output),
                ]
            })
            .await?;

        Some(MediaPayload::from_bytes(
            &webp,
            STICKER_MIME_TYPE,
            media.file_name.clone(),
        ))
    }

    /// Apply the stages the send options ask for.
    ///
    /// Voice: convert unless already opus, then compute the waveform from the
    /// converted audio unless one was supplied. Sticker: convert video to
    /// animated WebP, then embed pack metadata into WebP output.
    pub async fn prepare(
        &self,
        media: MediaPayload,
        options: &SendOptions,
        cancel: &CancellationToken,
    ) -> PreparedMedia {
        let mut media = media;
        let mut waveform = options.waveform.clone();

        if options.send_audio_as_voice {
            if media.declares_opus() {
                debug!("voice note already opus, skipping conversion");
            } else if let Some(converted) = self.convert_to_voice_format(&media, cancel).await {
                media = converted;
            }

            if waveform.is_none() {
                if let Some(audio) = decode_or_warn(&media, "waveform generation") {
                    waveform = self
                        .generate_waveform(&audio, cancel)
                        .await
                        .map(|bars| bars.to_vec());
                }
            }
        }

        if options.send_media_as_sticker {
            if media.is_video() {
                if let Some(sticker) = self.convert_video_to_animated_sticker(&media, cancel).await {
                    media = sticker;
                }
            }

            if options.has_sticker_metadata() && media.is_webp() {
                media = embed_pack_metadata(media, options);
            }
        }

        PreparedMedia { media, waveform }
    }

    /// Write `input` to a scratch directory, run the transcoder and read its output.
    ///
    /// The scratch directory is removed when this returns, whichever way it
    /// returns, and also when the future is dropped.
    async fn transcode<F>(
        &self,
        stage: &str,
        input: &[u8],
        input_ext: &str,
        output_ext: &str,
        cancel: &CancellationToken,
        build_args: F,
    ) -> Option<Vec<u8>>
    where
        F: FnOnce(&Path, &Path) -> Vec<String>,
    {
        let scratch = match tempfile::Builder::new().prefix("whatsweb-").tempdir() {
            Ok(dir) => dir,
            Err(err) => {
                warn!("{} failed: could not create scratch directory: {}", stage, err);
                return None;
            }
        };

        let input_path = scratch.path().join(format!("input.{}", input_ext));
        let output_path = scratch.path().join(format!("output.{}", output_ext));

        if let Err(err) = tokio::fs::write(&input_path, input).await {
            warn!("{} failed: could not write input: {}", stage, err);
            return None;
        }

        let args = build_args(&input_path, &output_path);
        let outcome = self.runner.run(&args, cancel).await;
        if !outcome.success {
            warn!("{} failed: {}", stage, outcome.diagnostics.trim());
            return None;
        }

        match tokio::fs::read(&output_path).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!("{} produced no output: {}", stage, err);
                None
            }
        }
    }
}

fn embed_pack_metadata(media: MediaPayload, options: &SendOptions) -> MediaPayload {
    let Some(webp) = decode_or_warn(&media, "sticker metadata") else {
        return media;
    };

    match inject_sticker_metadata(
        &webp,
        options.sticker_name.as_deref(),
        options.sticker_author.as_deref(),
        options.sticker_categories.as_deref(),
    ) {
        Ok(bytes) => MediaPayload::from_bytes(&bytes, media.mime_type.clone(), media.file_name.clone()),
        Err(err) => {
            warn!("sticker metadata injection failed: {}", err);
            media
        }
    }
}

fn decode_or_warn(media: &MediaPayload, stage: &str) -> Option<Vec<u8>> {
    match media.decode() {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!("{} skipped: media data is not valid base64: {}", stage, err);
            None
        }
    }
}

/// File extension for the scratch input, derived from the MIME subtype.
fn scratch_extension(media: &MediaPayload, fallback: &str) -> String {
    media
        .subtype()
        .map(|sub| sub.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
