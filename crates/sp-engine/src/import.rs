//! Audio file import
//!
//! Provides:
//! - WAV decoding via the sp-file codec
//! - Channel normalization into the stereo clip model
//! - Clip construction from files and clip bounce back to WAV
//!
//! Everything the arrangement plays is stereo: mono material is
//! duplicated, stereo passes through, wider material is folded down
//! (even channels to the left, odd to the right).

use std::path::Path;

use sp_core::Sample;
use sp_file::{BitDepth, DecodedAudio, FileError, FileResult};

use crate::clip::AudioClip;

/// Decode a WAV file from disk
pub fn import_wav<P: AsRef<Path>>(path: P) -> FileResult<DecodedAudio> {
    sp_file::read_wav(path)
}

/// Fold any supported channel layout into interleaved stereo
pub fn normalize_to_stereo(decoded: &DecodedAudio) -> Vec<Sample> {
    let channels = decoded.channels as usize;
    let frames = decoded.frame_count();
    let mut stereo = Vec::with_capacity(frames * 2);

    match channels {
        0 => {}
        1 => {
            for &s in &decoded.samples {
                stereo.push(s);
                stereo.push(s);
            }
        }
        2 => stereo.extend_from_slice(&decoded.samples),
        _ => {
            // Even-indexed channels average to L, odd-indexed to R
            let even = channels.div_ceil(2);
            let odd = channels / 2;
            for frame in 0..frames {
                let base = frame * channels;
                let mut left = 0.0;
                let mut right = 0.0;
                for c in 0..channels {
                    if c % 2 == 0 {
                        left += decoded.samples[base + c];
                    } else {
                        right += decoded.samples[base + c];
                    }
                }
                left /= even as Sample;
                let right = if odd == 0 { left } else { right / odd as Sample };
                stereo.push(left);
                stereo.push(right);
            }
        }
    }

    stereo
}

/// Import a WAV file as a stereo clip
///
/// The clip keeps the file's sample rate; the mixer warns when it does
/// not match the session rate (playback is pitch-shifted, never
/// resampled).
pub fn clip_from_wav<P: AsRef<Path>>(path: P, clip_name: &str) -> FileResult<AudioClip> {
    let path = path.as_ref();
    let decoded = import_wav(path)?;
    let stereo = normalize_to_stereo(&decoded);

    log::debug!(
        "imported '{}': {} frames at {} Hz ({} ch source)",
        path.display(),
        decoded.frame_count(),
        decoded.sample_rate,
        decoded.channels
    );

    AudioClip::from_samples(clip_name, 2, decoded.sample_rate, stereo)
        .map_err(|e| FileError::InvalidData(e.to_string()))
}

/// Bounce a clip's storage window back to a WAV file
pub fn export_clip_wav<P: AsRef<Path>>(
    clip: &AudioClip,
    path: P,
    bit_depth: BitDepth,
) -> FileResult<()> {
    let frames = clip.frames_in_storage() as usize;
    let channels = clip.channels();
    let mut samples = vec![0.0; frames * channels];

    // Read through the clip so gain, fades, and mute are baked in
    let start = clip.start_position();
    clip.read_samples(&mut samples, 0, frames * channels, start)
        .map_err(|e| FileError::InvalidData(e.to_string()))?;

    sp_file::write_wav(
        path,
        &samples,
        channels as u16,
        clip.sample_rate(),
        bit_depth,
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
