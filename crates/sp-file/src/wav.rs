//! WAV reading and writing
//!
//! Supports:
//! - PCM 16/24/32-bit and IEEE float 32-bit, 1–8 channels
//! - Reading from any `io::Read`, writing to any `io::Write + io::Seek`
//! - Export clamping and integer scaling per bit depth
//!
//! RIFF framing is delegated to hound; this module enforces the subset
//! the engine accepts and normalizes everything to interleaved f32.

use std::io::{Read, Seek, Write};
use std::path::Path;

use sp_core::{Sample, MAX_CHANNELS};

use crate::{FileError, FileResult};

/// RIFF format tag of the `fmt ` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// `audio_format = 1`
    Pcm,
    /// `audio_format = 3`
    Float,
}

/// Bit depth of encoded samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Int16,
    Int24,
    Int32,
    Float32,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            Self::Int16 => 16,
            Self::Int24 => 24,
            Self::Int32 => 32,
            Self::Float32 => 32,
        }
    }

    pub fn format(self) -> SampleFormat {
        match self {
            Self::Float32 => SampleFormat::Float,
            _ => SampleFormat::Pcm,
        }
    }
}

/// Decoded audio: interleaved f32 plus stream metadata
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples, `len == frame_count * channels`
    pub samples: Vec<Sample>,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
    pub format: SampleFormat,
}

impl DecodedAudio {
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// READING
// ═══════════════════════════════════════════════════════════════════════════

/// Decode a WAV byte stream
///
/// Rejects streams without RIFF/WAVE magic or a `fmt ` chunk
/// (`InvalidData`), format tags other than PCM and IEEE float, PCM
/// widths outside {16, 24, 32}, and channel counts outside 1..=8.
pub fn read_wav_from<R: Read>(reader: R) -> FileResult<DecodedAudio> {
    let reader = hound::WavReader::new(reader)?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.channels as usize > MAX_CHANNELS {
        return Err(FileError::UnsupportedFormat(format!(
            "channel count {} outside 1..={MAX_CHANNELS}",
            spec.channels
        )));
    }

    let bit_depth = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => BitDepth::Int16,
        (hound::SampleFormat::Int, 24) => BitDepth::Int24,
        (hound::SampleFormat::Int, 32) => BitDepth::Int32,
        (hound::SampleFormat::Float, 32) => BitDepth::Float32,
        (format, bits) => {
            return Err(FileError::UnsupportedFormat(format!(
                "{bits}-bit {format:?} samples"
            )));
        }
    };

    let samples: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(FileError::from)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(FileError::from)?
        }
    };

    Ok(DecodedAudio {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bit_depth,
        format: bit_depth.format(),
    })
}

/// Decode a WAV file from disk
pub fn read_wav<P: AsRef<Path>>(path: P) -> FileResult<DecodedAudio> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(FileError::NotFound(path.display().to_string()));
    }
    let file = std::fs::File::open(path)?;
    let decoded = read_wav_from(std::io::BufReader::new(file))?;
    log::debug!(
        "decoded '{}': {} Hz, {} ch, {:?}, {} frames",
        path.display(),
        decoded.sample_rate,
        decoded.channels,
        decoded.bit_depth,
        decoded.frame_count()
    );
    Ok(decoded)
}

// ═══════════════════════════════════════════════════════════════════════════
// WRITING
// ═══════════════════════════════════════════════════════════════════════════

/// Encode interleaved samples as WAV
///
/// Floats are clamped to [-1, 1] and scaled to the target integer
/// range; `Float32` writes the values through unchanged.
pub fn write_wav_to<W: Write + Seek>(
    writer: W,
    samples: &[Sample],
    channels: u16,
    sample_rate: u32,
    bit_depth: BitDepth,
) -> FileResult<()> {
    if channels == 0 || channels as usize > MAX_CHANNELS {
        return Err(FileError::UnsupportedFormat(format!(
            "channel count {channels} outside 1..={MAX_CHANNELS}"
        )));
    }
    if samples.len() % channels as usize != 0 {
        return Err(FileError::InvalidData(format!(
            "{} samples do not divide into {channels}-channel frames",
            samples.len()
        )));
    }

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bit_depth.bits(),
        sample_format: match bit_depth.format() {
            SampleFormat::Pcm => hound::SampleFormat::Int,
            SampleFormat::Float => hound::SampleFormat::Float,
        },
    };

    let mut wav = hound::WavWriter::new(writer, spec)?;
    match bit_depth {
        BitDepth::Float32 => {
            for &sample in samples {
                wav.write_sample(sample)?;
            }
        }
        BitDepth::Int16 => {
            for &sample in samples {
                wav.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
            }
        }
        BitDepth::Int24 => {
            for &sample in samples {
                wav.write_sample((sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32)?;
            }
        }
        BitDepth::Int32 => {
            for &sample in samples {
                wav.write_sample((sample.clamp(-1.0, 1.0) as f64 * 2_147_483_647.0) as i32)?;
            }
        }
    }
    wav.finalize()?;
    Ok(())
}

/// Encode interleaved samples to a WAV file on disk
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[Sample],
    channels: u16,
    sample_rate: u32,
    bit_depth: BitDepth,
) -> FileResult<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_wav_to(
        std::io::BufWriter::new(file),
        samples,
        channels,
        sample_rate,
        bit_depth,
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
