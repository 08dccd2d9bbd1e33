//! Mixer: the per-buffer real-time core
//!
//! Provides:
//! - Track list with atomically-published snapshots
//! - Per-track render, constant-power pan, additive sum
//! - Solo precedence, per-track and master mute, clamped master volume
//! - An audio-path entry that never fails (silence on fault) and a
//!   control-path entry that surfaces errors
//!
//! The hot path takes no blocking lock: the track snapshot is one
//! atomic load, parameters are relaxed scalar reads, and the scratch
//! buffers use `try_write`; a contended buffer yields one silent
//! block instead of a stall.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use sp_core::{AtomicSample, EngineError, EngineResult, Sample, StereoSample};

use crate::track::Track;
use crate::transport::{Transport, TransportState};
use crate::ids::TrackId;

/// Master volume ceiling (linear)
pub const MAX_MASTER_VOLUME: Sample = 10.0;

/// The mix bus
pub struct Mixer {
    transport: Arc<Transport>,
    sample_rate: u32,
    channel_count: usize,
    master_volume: AtomicSample,
    master_muted: AtomicBool,
    tracks: ArcSwap<Vec<Arc<Track>>>,
    /// Sum bus, `frames * channel_count` samples
    mix_buffer: RwLock<Vec<Sample>>,
    /// Per-track render target, same size
    track_buffer: RwLock<Vec<Sample>>,
    /// Post-master block peaks, published for meter readers
    peak_left: AtomicSample,
    peak_right: AtomicSample,
}

impl Mixer {
    /// Create a mixer; `channel_count` 1..=8, stereo is the panned path
    pub fn new(
        transport: Arc<Transport>,
        sample_rate: u32,
        channel_count: usize,
        max_block_frames: usize,
    ) -> EngineResult<Self> {
        if sample_rate == 0 {
            return Err(EngineError::invalid_arg("sample rate must be positive"));
        }
        if channel_count == 0 || channel_count > sp_core::MAX_CHANNELS {
            return Err(EngineError::invalid_arg(format!(
                "channel count {channel_count} outside 1..={}",
                sp_core::MAX_CHANNELS
            )));
        }

        let capacity = max_block_frames * channel_count;
        Ok(Self {
            transport,
            sample_rate,
            channel_count,
            master_volume: AtomicSample::new(1.0),
            master_muted: AtomicBool::new(false),
            tracks: ArcSwap::from_pointee(Vec::new()),
            mix_buffer: RwLock::new(vec![0.0; capacity]),
            track_buffer: RwLock::new(vec![0.0; capacity]),
            peak_left: AtomicSample::new(0.0),
            peak_right: AtomicSample::new(0.0),
        })
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MASTER SECTION
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn master_volume(&self) -> Sample {
        self.master_volume.load()
    }

    /// Set master volume, clamped to [0, 10]
    pub fn set_master_volume(&self, volume: Sample) {
        let clamped = if volume.is_finite() {
            volume.clamp(0.0, MAX_MASTER_VOLUME)
        } else {
            1.0
        };
        self.master_volume.store(clamped);
    }

    #[inline]
    pub fn is_master_muted(&self) -> bool {
        self.master_muted.load(Ordering::Relaxed)
    }

    pub fn set_master_muted(&self, muted: bool) {
        self.master_muted.store(muted, Ordering::Relaxed);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRACK LIST
    // ═══════════════════════════════════════════════════════════════════════

    /// Append a track; the snapshot the audio thread sees is swapped
    /// atomically
    pub fn add_track(&self, track: Arc<Track>) {
        for clip in track.clips().iter() {
            if let Some(audio) = clip.as_audio() {
                if audio.sample_rate() != self.sample_rate {
                    log::warn!(
                        "clip '{}' is {} Hz on a {} Hz mixer; playback will be pitch-shifted",
                        audio.name(),
                        audio.sample_rate(),
                        self.sample_rate
                    );
                }
            }
        }
        self.publish_tracks(|tracks| tracks.push(track));
    }

    /// Remove a track by id; true when it was present
    pub fn remove_track(&self, id: TrackId) -> bool {
        let mut removed = false;
        self.publish_tracks(|tracks| {
            let before = tracks.len();
            tracks.retain(|t| t.id() != id);
            removed = tracks.len() != before;
        });
        removed
    }

    pub fn clear_tracks(&self) {
        self.tracks.store(Arc::new(Vec::new()));
    }

    /// Read-only snapshot in insertion order
    pub fn tracks(&self) -> Arc<Vec<Arc<Track>>> {
        self.tracks.load_full()
    }

    pub fn track(&self, id: TrackId) -> Option<Arc<Track>> {
        self.tracks.load().iter().find(|t| t.id() == id).cloned()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.load().len()
    }

    fn publish_tracks<F>(&self, edit: F)
    where
        F: FnOnce(&mut Vec<Arc<Track>>),
    {
        let mut next = (**self.tracks.load()).clone();
        edit(&mut next);
        self.tracks.store(Arc::new(next));
    }

    /// Clear internal scratch state; transport and tracks are untouched
    pub fn reset(&self) {
        self.mix_buffer.write().fill(0.0);
        self.track_buffer.write().fill(0.0);
        self.peak_left.store(0.0);
        self.peak_right.store(0.0);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RENDERING
    // ═══════════════════════════════════════════════════════════════════════

    /// Audio-path entry: render one buffer, never fail
    ///
    /// Any internal fault (undersized output, contended scratch) yields
    /// silence for this buffer. Does not advance the transport; the
    /// hardware callback advances after this returns, iff Playing.
    pub fn process_buffer(&self, out: &mut [Sample], frame_count: usize) {
        if let Err(err) = self.render_block(out, frame_count) {
            log::error!("process_buffer fault, muting block: {err}");
            let fill = out.len().min(frame_count * self.channel_count);
            out[..fill].fill(0.0);
        }
    }

    /// Control-path entry: render one buffer, surfacing faults
    ///
    /// Renders `frame_count * channel_count` interleaved samples at the
    /// transport position. Idempotent for a given position and track
    /// snapshot.
    pub fn render_block(&self, out: &mut [Sample], frame_count: usize) -> EngineResult<()> {
        if frame_count == 0 {
            return Ok(());
        }
        let needed = frame_count * self.channel_count;
        if out.len() < needed {
            return Err(EngineError::ResourceExhausted(format!(
                "output holds {} samples, block needs {needed}",
                out.len()
            )));
        }
        let out = &mut out[..needed];

        // One consistent capture for the whole block
        let tracks = self.tracks.load();
        let state = self.transport.state();
        let position = self.transport.position();

        if self.is_master_muted() || state != TransportState::Playing || tracks.is_empty() {
            out.fill(0.0);
            self.publish_peaks(out);
            return Ok(());
        }

        // Solo precedence: any solo narrows the audible set
        let any_solo = tracks.iter().any(|t| t.is_solo());

        let mut mix = self
            .mix_buffer
            .try_write()
            .ok_or_else(|| EngineError::ResourceExhausted("mix buffer contended".into()))?;
        let mut scratch = self
            .track_buffer
            .try_write()
            .ok_or_else(|| EngineError::ResourceExhausted("track buffer contended".into()))?;
        if mix.len() < needed {
            mix.resize(needed, 0.0);
            scratch.resize(needed, 0.0);
        }
        let mix = &mut mix[..needed];
        let scratch = &mut scratch[..needed];
        mix.fill(0.0);

        for track in tracks.iter() {
            if track.is_muted() || (any_solo && !track.is_solo()) {
                continue;
            }

            scratch.fill(0.0);
            track.process_audio(scratch, 0, needed, position)?;

            if self.channel_count == 2 {
                // Constant-power pan: -3 dB at centre, unity at the edges
                let pan = track.pan().clamp(-1.0, 1.0);
                let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
                let left_gain = angle.cos();
                let right_gain = angle.sin();

                for frame in 0..frame_count {
                    mix[frame * 2] += scratch[frame * 2] * left_gain;
                    mix[frame * 2 + 1] += scratch[frame * 2 + 1] * right_gain;
                }
            } else {
                // Mono and wide buses sum without pan
                for (m, &s) in mix.iter_mut().zip(scratch.iter()) {
                    *m += s;
                }
            }
        }

        let master = self.master_volume();
        for (o, &m) in out.iter_mut().zip(mix.iter()) {
            *o = m * master;
        }

        self.publish_peaks(out);
        Ok(())
    }

    /// Lock-free block peaks for meter readers
    pub fn peak_levels(&self) -> StereoSample {
        StereoSample::new(self.peak_left.load(), self.peak_right.load())
    }

    fn publish_peaks(&self, out: &[Sample]) {
        if self.channel_count == 2 {
            let mut left: Sample = 0.0;
            let mut right: Sample = 0.0;
            for frame in out.chunks_exact(2) {
                left = left.max(frame[0].abs());
                right = right.max(frame[1].abs());
            }
            self.peak_left.store(left);
            self.peak_right.store(right);
        } else {
            let peak = out.iter().fold(0.0f32, |p, &s| p.max(s.abs()));
            self.peak_left.store(peak);
            self.peak_right.store(peak);
        }
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("sample_rate", &self.sample_rate)
            .field("channel_count", &self.channel_count)
            .field("tracks", &self.track_count())
            .field("master_volume", &self.master_volume())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
