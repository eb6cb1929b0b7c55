//! Voice note waveform envelope.
//!
//! The remote client renders a 64-bar preview for voice notes. Each bar is the
//! mean absolute amplitude of one block of samples, scaled so the loudest
//! block is 100.

use byteorder::{ByteOrder, LittleEndian};

/// Number of bars in a waveform.
pub const WAVEFORM_BUCKETS: usize = 64;

/// Largest value a bar can take.
pub const WAVEFORM_MAX: u8 = 100;

/// A computed envelope, one byte per bar, each in `0..=100`.
pub type Waveform = [u8; WAVEFORM_BUCKETS];

/// Decode raw little-endian f32 PCM. Trailing bytes that do not form a full
/// sample are ignored.
pub fn decode_f32le(pcm: &[u8]) -> Vec<f32> {
    let sample_count = pcm.len() / 4;
    let mut samples = vec![0f32; sample_count];
    LittleEndian::read_f32_into(&pcm[..sample_count * 4], &mut samples);
    samples
}

/// Compute the envelope from raw little-endian f32 PCM bytes.
pub fn compute_waveform_from_pcm(pcm: &[u8]) -> Waveform {
    compute_waveform(&decode_f32le(pcm))
}

/// Compute the envelope from mono samples.
///
/// Blocks are `max(1, n / 64)` samples long; when there are fewer than 64
/// samples the trailing bars stay at zero. Silence yields all zeros.
pub fn compute_waveform(samples: &[f32]) -> Waveform {
    let mut waveform = [0u8; WAVEFORM_BUCKETS];
    if samples.is_empty() {
        return waveform;
    }

    let block_size = (samples.len() / WAVEFORM_BUCKETS).max(1);
    let mut means = [0f32; WAVEFORM_BUCKETS];

    for (i, mean) in means.iter_mut().enumerate() {
        let start = block_size * i;
        if start >= samples.len() {
            break;
        }
        let end = (start + block_size).min(samples.len());
        let block = &samples[start..end];
        let sum: f32 = block.iter().map(|s| s.abs()).sum();
        *mean = sum / block.len() as f32;
    }

    let max = means.iter().copied().fold(0f32, f32::max);
    let multiplier = if max > 0.0 { 1.0 / max } else { 0.0 };

    for (bar, mean) in waveform.iter_mut().zip(means) {
        let scaled = (100.0 * mean * multiplier).floor() as i32;
        *bar = scaled.clamp(0, WAVEFORM_MAX as i32) as u8;
    }

    waveform
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_pcm(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_silence_is_all_zero() {
        // two seconds at 16 kHz
        let silence = vec![0f32; 32_000];
        assert_eq!(compute_waveform(&silence), [0u8; WAVEFORM_BUCKETS]);
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        assert_eq!(compute_waveform_from_pcm(&[]), [0u8; WAVEFORM_BUCKETS]);
        // less than one full sample
        assert_eq!(compute_waveform_from_pcm(&[1, 2, 3]), [0u8; WAVEFORM_BUCKETS]);
    }

    #[test]
    fn test_loudest_block_is_100() {
        let mut samples = vec![0.125f32; 6400];
        for s in &mut samples[6300..] {
            *s = -0.5;
        }
        let waveform = compute_waveform(&samples);
        assert_eq!(waveform[63], 100);
        assert_eq!(waveform[0], 25);
        assert!(waveform.iter().all(|v| *v <= WAVEFORM_MAX));
    }

    #[test]
    fn test_short_input_leaves_trailing_bars_empty() {
        let samples = [0.5f32, -1.0, 0.25];
        let waveform = compute_waveform(&samples);
        assert_eq!(&waveform[..3], &[50, 100, 25]);
        assert!(waveform[3..].iter().all(|v| *v == 0));
    }

    #[test]
    fn test_partial_last_block_is_ignored_beyond_64_blocks() {
        // 130 samples: block size 2, samples 128 and 129 fall outside the 64 blocks
        let mut samples = vec![0.25f32; 130];
        samples[128] = 1.0;
        samples[129] = 1.0;
        let waveform = compute_waveform(&samples);
        assert!(waveform.iter().all(|v| *v == 100));
    }

    #[test]
    fn test_pcm_decoding_ignores_trailing_bytes() {
        let mut pcm = to_pcm(&[0.5, -0.25]);
        pcm.push(0xFF);
        assert_eq!(decode_f32le(&pcm), vec![0.5, -0.25]);
    }

    #[test]
    fn test_output_always_in_range() {
        let samples: Vec<f32> = (0..10_007)
            .map(|i| ((i as f32) * 0.37).sin() * (i % 97) as f32)
            .collect();
        let waveform = compute_waveform_from_pcm(&to_pcm(&samples));
        assert_eq!(waveform.len(), WAVEFORM_BUCKETS);
        assert!(waveform.iter().all(|v| *v <= WAVEFORM_MAX));
        assert!(waveform.iter().any(|v| *v >= 99));
    }
}
