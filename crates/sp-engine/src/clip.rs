//! Clip model
//!
//! Provides:
//! - `Clip`: the tagged clip variant dispatched by tracks and the mixer
//! - `AudioClip`: timeline placement over owned interleaved f32 storage
//! - Sample-window reads with gain, linear fades, muting, and source
//!   offsetting
//! - Peak and RMS measurement over a window
//!
//! Mutable placement and level fields are single-word atomics so the
//! audio thread reads them without locking. Sample storage sits behind
//! an `Arc`: splitting a clip shares the buffer zero-copy, and
//! `write_samples` copies on write, so no write path ever mutates a
//! buffer another clip can see.

use std::sync::Arc;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sp_core::{
    AtomicSample, ClipChange, EngineError, EngineEvent, EngineResult, EventSink, Sample,
    MAX_CHANNELS,
};

use crate::ids::{next_id, ClipId};

// ═══════════════════════════════════════════════════════════════════════════
// CLIP VARIANT
// ═══════════════════════════════════════════════════════════════════════════

/// A clip on a track
///
/// Audio is the only variant today; the tag leaves room for MIDI
/// without moving to dynamic dispatch.
pub enum Clip {
    Audio(AudioClip),
}

impl Clip {
    pub fn id(&self) -> ClipId {
        match self {
            Clip::Audio(c) => c.id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Clip::Audio(c) => c.name(),
        }
    }

    pub fn start_position(&self) -> u64 {
        match self {
            Clip::Audio(c) => c.start_position(),
        }
    }

    pub fn length(&self) -> u64 {
        match self {
            Clip::Audio(c) => c.length(),
        }
    }

    pub fn end_position(&self) -> u64 {
        match self {
            Clip::Audio(c) => c.end_position(),
        }
    }

    pub fn is_muted(&self) -> bool {
        match self {
            Clip::Audio(c) => c.is_muted(),
        }
    }

    /// Channel count of the underlying material
    pub fn channels(&self) -> usize {
        match self {
            Clip::Audio(c) => c.channels(),
        }
    }

    pub fn as_audio(&self) -> Option<&AudioClip> {
        match self {
            Clip::Audio(c) => Some(c),
        }
    }

    /// Render a sample window; the audio-path entry point
    pub(crate) fn render(
        &self,
        dst: &mut [Sample],
        dst_offset: usize,
        count: usize,
        timeline_position: u64,
    ) -> usize {
        match self {
            Clip::Audio(c) => c
                .read_samples(dst, dst_offset, count, timeline_position)
                .unwrap_or(0),
        }
    }

    pub(crate) fn set_event_sink(&mut self, events: EventSink) {
        match self {
            Clip::Audio(c) => c.events = events,
        }
    }
}

impl std::fmt::Debug for Clip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Clip::Audio(c) => c.fmt(f),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// AUDIO CLIP
// ═══════════════════════════════════════════════════════════════════════════

/// One timeline placement of audio material
pub struct AudioClip {
    id: ClipId,
    name: RwLock<String>,
    color: RwLock<String>,
    /// Timeline placement in samples
    start_position: AtomicU64,
    /// Frames of timeline this clip covers
    length: AtomicU64,
    /// First storage frame played at `start_position`
    source_offset: AtomicU64,
    gain: AtomicSample,
    muted: AtomicBool,
    fade_in: AtomicU64,
    fade_out: AtomicU64,
    channels: usize,
    sample_rate: u32,
    /// Interleaved storage; Arc-shared with split siblings, copied on
    /// write
    samples: RwLock<Arc<Vec<Sample>>>,
    pub(crate) events: EventSink,
}

impl AudioClip {
    /// Create a clip over zeroed storage of `frame_count` frames
    pub fn new(
        name: &str,
        channels: usize,
        sample_rate: u32,
        frame_count: usize,
    ) -> EngineResult<Self> {
        Self::from_samples(
            name,
            channels,
            sample_rate,
            vec![0.0; frame_count * channels.max(1)],
        )
    }

    /// Create a clip owning an existing interleaved buffer
    ///
    /// The clip covers the whole buffer: `length == frames`, zero
    /// source offset.
    pub fn from_samples(
        name: &str,
        channels: usize,
        sample_rate: u32,
        samples: Vec<Sample>,
    ) -> EngineResult<Self> {
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(EngineError::invalid_arg(format!(
                "channel count {channels} outside 1..={MAX_CHANNELS}"
            )));
        }
        if sample_rate == 0 {
            return Err(EngineError::invalid_arg("sample rate must be positive"));
        }
        if samples.len() % channels != 0 {
            return Err(EngineError::invalid_arg(format!(
                "{} samples do not divide into {channels}-channel frames",
                samples.len()
            )));
        }

        let frames = samples.len() / channels;
        Ok(Self {
            id: ClipId(next_id()),
            name: RwLock::new(name.to_string()),
            color: RwLock::new(String::new()),
            start_position: AtomicU64::new(0),
            length: AtomicU64::new(frames as u64),
            source_offset: AtomicU64::new(0),
            gain: AtomicSample::new(1.0),
            muted: AtomicBool::new(false),
            fade_in: AtomicU64::new(0),
            fade_out: AtomicU64::new(0),
            channels,
            sample_rate,
            samples: RwLock::new(Arc::new(samples)),
            events: EventSink::disabled(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PROPERTIES
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
        self.emit(ClipChange::Renamed(name.to_string()));
    }

    pub fn color(&self) -> String {
        self.color.read().clone()
    }

    pub fn set_color(&self, color: &str) {
        *self.color.write() = color.to_string();
    }

    #[inline]
    pub fn start_position(&self) -> u64 {
        self.start_position.load(Ordering::Relaxed)
    }

    /// Move the clip on the timeline
    ///
    /// Emits both a start and an end notification since both edges
    /// moved.
    pub fn set_start_position(&self, position: u64) {
        self.start_position.store(position, Ordering::Relaxed);
        self.emit(ClipChange::StartPosition(position));
        self.emit(ClipChange::EndPosition(self.end_position()));
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    pub fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
        self.emit(ClipChange::Length(length));
        self.emit(ClipChange::EndPosition(self.end_position()));
    }

    #[inline]
    pub fn end_position(&self) -> u64 {
        self.start_position() + self.length()
    }

    #[inline]
    pub fn source_offset(&self) -> u64 {
        self.source_offset.load(Ordering::Relaxed)
    }

    pub fn set_source_offset(&self, offset: u64) {
        self.source_offset.store(offset, Ordering::Relaxed);
        self.emit(ClipChange::SourceOffset(offset));
    }

    #[inline]
    pub fn gain(&self) -> Sample {
        self.gain.load()
    }

    /// Set linear gain; rejects negative or non-finite values
    pub fn set_gain(&self, gain: Sample) -> EngineResult<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(EngineError::invalid_arg(format!(
                "clip gain must be non-negative, got {gain}"
            )));
        }
        self.gain.store(gain);
        self.emit(ClipChange::Gain(gain));
        Ok(())
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
        self.emit(ClipChange::Muted(muted));
    }

    #[inline]
    pub fn fade_in_length(&self) -> u64 {
        self.fade_in.load(Ordering::Relaxed)
    }

    pub fn set_fade_in_length(&self, frames: u64) {
        self.fade_in.store(frames, Ordering::Relaxed);
        self.emit(ClipChange::FadeIn(frames));
    }

    #[inline]
    pub fn fade_out_length(&self) -> u64 {
        self.fade_out.load(Ordering::Relaxed)
    }

    pub fn set_fade_out_length(&self, frames: u64) {
        self.fade_out.store(frames, Ordering::Relaxed);
        self.emit(ClipChange::FadeOut(frames));
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames in backing storage
    pub fn frames_in_storage(&self) -> u64 {
        (self.samples.read().len() / self.channels) as u64
    }

    fn emit(&self, change: ClipChange) {
        self.events.emit(EngineEvent::Clip {
            clip: self.id.0,
            change,
        });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FADE ENVELOPE
    // ═══════════════════════════════════════════════════════════════════════

    /// Multiplicative fade envelope at frame `offset` within the clip
    ///
    /// Linear ramps; when the fades overlap (their combined length
    /// exceeds the clip) both are applied.
    fn fade_envelope(&self, offset: u64) -> Sample {
        let mut env: Sample = 1.0;
        let length = self.length();

        let fade_in = self.fade_in.load(Ordering::Relaxed);
        if fade_in > 0 && offset < fade_in {
            env *= offset as Sample / fade_in as Sample;
        }

        let fade_out = self.fade_out.load(Ordering::Relaxed);
        if fade_out > 0 && offset >= length.saturating_sub(fade_out) {
            let into_fade = offset - length.saturating_sub(fade_out);
            env *= 1.0 - into_fade as Sample / fade_out as Sample;
        }

        env
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SAMPLE WINDOW READ
    // ═══════════════════════════════════════════════════════════════════════

    /// Read up to `count` interleaved samples at `timeline_position`
    /// into `dst[dst_offset..]`, applying gain and fades
    ///
    /// `count` is a sample count and must divide by the channel count.
    /// The whole destination window is zeroed first; the return value is
    /// the number of samples actually produced from storage.
    pub fn read_samples(
        &self,
        dst: &mut [Sample],
        dst_offset: usize,
        count: usize,
        timeline_position: u64,
    ) -> EngineResult<usize> {
        if count % self.channels != 0 {
            return Err(EngineError::invalid_arg(format!(
                "count {count} does not divide into {}-channel frames",
                self.channels
            )));
        }
        let window = dst
            .get_mut(dst_offset..dst_offset + count)
            .ok_or_else(|| {
                EngineError::invalid_arg(format!(
                    "destination window {dst_offset}..{} out of bounds",
                    dst_offset + count
                ))
            })?;

        window.fill(0.0);
        if count == 0 || self.is_muted() {
            return Ok(0);
        }

        // Frames into the clip's timeline span
        let relative = match timeline_position.checked_sub(self.start_position()) {
            Some(r) if r < self.length() => r,
            _ => return Ok(0),
        };

        // Contention means a control thread is rewriting storage while
        // we are audible; the window stays silent for this buffer.
        let storage = match self.samples.try_read() {
            Some(guard) => Arc::clone(&guard),
            None => return Ok(0),
        };

        let frames_in_storage = (storage.len() / self.channels) as u64;
        let source_frame = relative + self.source_offset();
        if source_frame >= frames_in_storage {
            return Ok(0);
        }

        let available = (self.length() - relative)
            .min(frames_in_storage - source_frame)
            .min((count / self.channels) as u64) as usize;

        let gain = self.gain();
        for i in 0..available {
            let envelope = self.fade_envelope(relative + i as u64);
            let scale = gain * envelope;
            let src = (source_frame as usize + i) * self.channels;
            let out = i * self.channels;
            for c in 0..self.channels {
                window[out + c] = storage[src + c] * scale;
            }
        }

        Ok(available * self.channels)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STORAGE WRITE
    // ═══════════════════════════════════════════════════════════════════════

    /// Copy `frame_count` frames from `src[src_offset..]` into storage
    /// at the timeline position, bounded by the clip span and storage
    ///
    /// Returns the number of frames written. Storage shared with a
    /// split sibling is copied first, so the sibling keeps its view.
    pub fn write_samples(
        &self,
        src: &[Sample],
        src_offset: usize,
        frame_count: usize,
        timeline_position: u64,
    ) -> EngineResult<usize> {
        let needed = frame_count * self.channels;
        if src_offset + needed > src.len() {
            return Err(EngineError::invalid_arg(format!(
                "source window {src_offset}..{} out of bounds",
                src_offset + needed
            )));
        }

        let relative = match timeline_position.checked_sub(self.start_position()) {
            Some(r) if r < self.length() => r,
            _ => return Ok(0),
        };

        let mut guard = self.samples.write();
        let frames_in_storage = (guard.len() / self.channels) as u64;
        let source_frame = relative + self.source_offset();
        if source_frame >= frames_in_storage {
            return Ok(0);
        }

        let writable = (self.length() - relative)
            .min(frames_in_storage - source_frame)
            .min(frame_count as u64) as usize;
        if writable == 0 {
            return Ok(0);
        }

        let storage = Arc::make_mut(&mut *guard);
        let dst_start = source_frame as usize * self.channels;
        let src_start = src_offset;
        storage[dst_start..dst_start + writable * self.channels]
            .copy_from_slice(&src[src_start..src_start + writable * self.channels]);

        Ok(writable)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MEASUREMENT
    // ═══════════════════════════════════════════════════════════════════════

    /// Maximum absolute sample in the window, scaled by gain and the
    /// envelope at the window start; zero when muted or out of bounds
    pub fn peak_amplitude(&self, timeline_position: u64, window_frames: usize) -> Sample {
        self.measure(timeline_position, window_frames, |storage, range, channels| {
            let mut peak: Sample = 0.0;
            for frame in range {
                for c in 0..channels {
                    peak = peak.max(storage[frame * channels + c].abs());
                }
            }
            peak
        })
    }

    /// Root-mean-square over the window, scaled like `peak_amplitude`
    pub fn rms_amplitude(&self, timeline_position: u64, window_frames: usize) -> Sample {
        self.measure(timeline_position, window_frames, |storage, range, channels| {
            let frames = range.len();
            if frames == 0 {
                return 0.0;
            }
            let mut sum_sq: f64 = 0.0;
            for frame in range {
                for c in 0..channels {
                    let s = storage[frame * channels + c] as f64;
                    sum_sq += s * s;
                }
            }
            (sum_sq / (frames * channels) as f64).sqrt() as Sample
        })
    }

    fn measure<F>(&self, timeline_position: u64, window_frames: usize, f: F) -> Sample
    where
        F: FnOnce(&[Sample], std::ops::Range<usize>, usize) -> Sample,
    {
        if self.is_muted() || window_frames == 0 {
            return 0.0;
        }
        let relative = match timeline_position.checked_sub(self.start_position()) {
            Some(r) if r < self.length() => r,
            _ => return 0.0,
        };
        let storage = self.samples.read();
        let frames_in_storage = (storage.len() / self.channels) as u64;
        let source_frame = relative + self.source_offset();
        if source_frame >= frames_in_storage {
            return 0.0;
        }

        let available = (self.length() - relative)
            .min(frames_in_storage - source_frame)
            .min(window_frames as u64) as usize;
        let start = source_frame as usize;

        let raw = f(&storage, start..start + available, self.channels);
        raw * self.gain() * self.fade_envelope(relative)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SPLIT SUPPORT
    // ═══════════════════════════════════════════════════════════════════════

    /// Build the right-hand clip of a split at `split_position`
    /// (timeline samples, strictly inside the clip)
    ///
    /// Storage is shared zero-copy; later writes to either side copy
    /// first.
    pub(crate) fn split_off(&self, split_position: u64) -> AudioClip {
        let offset_into_clip = split_position - self.start_position();
        let right = AudioClip {
            id: ClipId(next_id()),
            name: RwLock::new(format!("{} (R)", self.name())),
            color: RwLock::new(self.color()),
            start_position: AtomicU64::new(split_position),
            length: AtomicU64::new(self.length() - offset_into_clip),
            source_offset: AtomicU64::new(self.source_offset() + offset_into_clip),
            gain: AtomicSample::new(self.gain()),
            muted: AtomicBool::new(self.is_muted()),
            fade_in: AtomicU64::new(0),
            fade_out: AtomicU64::new(0),
            channels: self.channels,
            sample_rate: self.sample_rate,
            samples: RwLock::new(Arc::clone(&self.samples.read())),
            events: self.events.clone(),
        };
        right
    }

    /// True when this clip's storage is the same allocation as
    /// `other`'s (split siblings before any copy-on-write)
    pub fn shares_storage_with(&self, other: &AudioClip) -> bool {
        Arc::ptr_eq(&self.samples.read(), &other.samples.read())
    }
}

impl std::fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioClip")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("start", &self.start_position())
            .field("length", &self.length())
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
