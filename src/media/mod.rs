//! Media preprocessing: waveform extraction, transcoding and sticker metadata.

pub mod preprocessor;
pub mod riff;
pub mod sticker;
pub mod transcode;
pub mod waveform;

pub use preprocessor::{MediaPreprocessor, PreparedMedia, STICKER_MIME_TYPE, VOICE_MIME_TYPE};
pub use sticker::{inject_sticker_metadata, read_sticker_metadata, StickerError, StickerPackMetadata};
pub use transcode::{FfmpegRunner, TranscodeOutcome, TranscodeRunner};
pub use waveform::{compute_waveform, compute_waveform_from_pcm, Waveform, WAVEFORM_BUCKETS};
