//! Tracks
//!
//! Provides:
//! - Ordered clip container with lock-free snapshots for the audio
//!   thread
//! - Volume, pan, mute, solo, and arm state as atomic scalars
//! - Per-track rendering into a caller-supplied buffer (no pan; the
//!   mixer pans after summing)
//! - Structural clip edits: move, trim, split
//!
//! The clip list is published copy-on-write through an `ArcSwap`: edits
//! on the control thread allocate a new Vec, the audio thread pays one
//! atomic load per buffer.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use sp_core::{
    AtomicSample, EngineError, EngineEvent, EngineResult, EventSink, Sample, TrackChange,
};

use crate::clip::{AudioClip, Clip};
use crate::ids::{next_id, ClipId, TrackId};

thread_local! {
    // Per-thread clip scratch so the audio path never allocates once warm
    static CLIP_SCRATCH: RefCell<Vec<Sample>> = const { RefCell::new(Vec::new()) };
}

/// An audio track: ordered clips plus mix-stage scalars
pub struct Track {
    id: TrackId,
    name: RwLock<String>,
    color: RwLock<String>,
    volume: AtomicSample,
    pan: AtomicSample,
    muted: AtomicBool,
    solo: AtomicBool,
    armed: AtomicBool,
    clips: ArcSwap<Vec<Arc<Clip>>>,
    events: EventSink,
}

impl Track {
    pub fn new(name: &str) -> Self {
        Self {
            id: TrackId(next_id()),
            name: RwLock::new(name.to_string()),
            color: RwLock::new(String::new()),
            volume: AtomicSample::new(1.0),
            pan: AtomicSample::new(0.0),
            muted: AtomicBool::new(false),
            solo: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            clips: ArcSwap::from_pointee(Vec::new()),
            events: EventSink::disabled(),
        }
    }

    /// Attach an event sink (wire before sharing)
    pub fn with_event_sink(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PROPERTIES
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
        self.emit(TrackChange::Renamed(name.to_string()));
    }

    pub fn color(&self) -> String {
        self.color.read().clone()
    }

    pub fn set_color(&self, color: &str) {
        *self.color.write() = color.to_string();
    }

    #[inline]
    pub fn volume(&self) -> Sample {
        self.volume.load()
    }

    /// Set linear volume; rejects negative or non-finite values
    pub fn set_volume(&self, volume: Sample) -> EngineResult<()> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(EngineError::invalid_arg(format!(
                "track volume must be non-negative, got {volume}"
            )));
        }
        self.volume.store(volume);
        self.emit(TrackChange::Volume(volume));
        Ok(())
    }

    #[inline]
    pub fn pan(&self) -> Sample {
        self.pan.load()
    }

    /// Set stereo pan; rejects values outside [-1, 1]
    pub fn set_pan(&self, pan: Sample) -> EngineResult<()> {
        if !pan.is_finite() || !(-1.0..=1.0).contains(&pan) {
            return Err(EngineError::invalid_arg(format!(
                "pan must be within [-1, 1], got {pan}"
            )));
        }
        self.pan.store(pan);
        self.emit(TrackChange::Pan(pan));
        Ok(())
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
        self.emit(TrackChange::Muted(muted));
    }

    #[inline]
    pub fn is_solo(&self) -> bool {
        self.solo.load(Ordering::Relaxed)
    }

    pub fn set_solo(&self, solo: bool) {
        self.solo.store(solo, Ordering::Relaxed);
        self.emit(TrackChange::Solo(solo));
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Relaxed);
        self.emit(TrackChange::Armed(armed));
    }

    fn emit(&self, change: TrackChange) {
        self.events.emit(EngineEvent::Track {
            track: self.id.0,
            change,
        });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CLIP MANAGEMENT
    // ═══════════════════════════════════════════════════════════════════════

    /// Add an audio clip; the track takes ownership
    pub fn add_clip(&self, clip: AudioClip) -> ClipId {
        let mut clip = Clip::Audio(clip);
        clip.set_event_sink(self.events.clone());
        let id = clip.id();
        self.publish_clips(|clips| clips.push(Arc::new(clip)));
        self.emit(TrackChange::ClipAdded(id.0));
        id
    }

    /// Remove a clip by id; true when it was present
    pub fn remove_clip(&self, id: ClipId) -> bool {
        let mut removed = false;
        self.publish_clips(|clips| {
            let before = clips.len();
            clips.retain(|c| c.id() != id);
            removed = clips.len() != before;
        });
        if removed {
            self.emit(TrackChange::ClipRemoved(id.0));
        }
        removed
    }

    pub fn clear_clips(&self) {
        let old = self.clips.swap(Arc::new(Vec::new()));
        for clip in old.iter() {
            self.emit(TrackChange::ClipRemoved(clip.id().0));
        }
    }

    /// Read-only snapshot of the clip list in insertion order
    pub fn clips(&self) -> Arc<Vec<Arc<Clip>>> {
        self.clips.load_full()
    }

    pub fn clip(&self, id: ClipId) -> Option<Arc<Clip>> {
        self.clips.load().iter().find(|c| c.id() == id).cloned()
    }

    pub fn clip_count(&self) -> usize {
        self.clips.load().len()
    }

    /// Clips intersecting `[start, end)`, sorted by start position
    pub fn clips_in_range(&self, start: u64, end: u64) -> EngineResult<Vec<Arc<Clip>>> {
        if end < start {
            return Err(EngineError::invalid_arg(format!(
                "range end {end} precedes start {start}"
            )));
        }
        let mut hits: Vec<Arc<Clip>> = self
            .clips
            .load()
            .iter()
            .filter(|c| c.end_position() > start && c.start_position() < end)
            .cloned()
            .collect();
        hits.sort_by_key(|c| c.start_position());
        Ok(hits)
    }

    /// Copy-on-write edit of the clip list
    fn publish_clips<F>(&self, edit: F)
    where
        F: FnOnce(&mut Vec<Arc<Clip>>),
    {
        let mut next = (**self.clips.load()).clone();
        edit(&mut next);
        self.clips.store(Arc::new(next));
    }

    fn require_clip(&self, id: ClipId) -> EngineResult<Arc<Clip>> {
        self.clip(id).ok_or_else(|| {
            EngineError::PreconditionFailed(format!("{id} is not on {}", self.id))
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STRUCTURAL EDITS
    // ═══════════════════════════════════════════════════════════════════════

    /// Move a clip to a new timeline start
    pub fn move_clip(&self, id: ClipId, new_start: u64) -> EngineResult<()> {
        let clip = self.require_clip(id)?;
        match clip.as_audio() {
            Some(audio) => audio.set_start_position(new_start),
            None => {
                return Err(EngineError::PreconditionFailed(format!(
                    "{id} is not an audio clip"
                )))
            }
        }
        Ok(())
    }

    /// Trim a clip's edges
    ///
    /// A new start keeps the end fixed (left-trim): the length shrinks
    /// or grows and the source offset shifts so the material stays
    /// anchored on the timeline. A new length moves only the right
    /// edge.
    pub fn trim_clip(
        &self,
        id: ClipId,
        new_start: Option<u64>,
        new_length: Option<u64>,
    ) -> EngineResult<()> {
        let clip = self.require_clip(id)?;
        let audio = clip.as_audio().ok_or_else(|| {
            EngineError::PreconditionFailed(format!("{id} is not an audio clip"))
        })?;

        if let Some(start) = new_start {
            let old_start = audio.start_position();
            let end = audio.end_position();
            if start >= end {
                return Err(EngineError::invalid_arg(format!(
                    "trim start {start} at or past clip end {end}"
                )));
            }
            if start >= old_start {
                let delta = start - old_start;
                audio.set_source_offset(audio.source_offset() + delta);
                audio.set_length(audio.length() - delta);
            } else {
                let delta = old_start - start;
                audio.set_source_offset(audio.source_offset().saturating_sub(delta));
                audio.set_length(audio.length() + delta);
            }
            audio.set_start_position(start);
        }

        if let Some(length) = new_length {
            audio.set_length(length);
        }
        Ok(())
    }

    /// Split a clip at `split_position`, keeping the left half in place
    /// and returning the new right half (already added to the track)
    ///
    /// The halves share sample storage until one of them is written.
    pub fn split_clip(&self, id: ClipId, split_position: u64) -> EngineResult<Arc<Clip>> {
        let clip = self.require_clip(id)?;
        let audio = clip.as_audio().ok_or_else(|| {
            EngineError::PreconditionFailed(format!("{id} is not an audio clip"))
        })?;

        if split_position <= audio.start_position() || split_position >= audio.end_position() {
            return Err(EngineError::invalid_arg(format!(
                "split point {split_position} outside clip interior {}..{}",
                audio.start_position(),
                audio.end_position()
            )));
        }

        let right = audio.split_off(split_position);
        audio.set_length(split_position - audio.start_position());
        audio.set_name(&format!("{} (L)", audio.name()));

        let right_id = self.add_clip(right);
        Ok(self.clip(right_id).expect("clip was just added"))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RENDERING
    // ═══════════════════════════════════════════════════════════════════════

    /// Render every intersecting clip, summed, into
    /// `dst[offset..offset + count]` at `timeline_position`
    ///
    /// `count` is a sample count. Clips mix additively without
    /// saturation; the track volume is applied once over the summed
    /// window. No pan here; the mixer pans after this stage.
    pub fn process_audio(
        &self,
        dst: &mut [Sample],
        offset: usize,
        count: usize,
        timeline_position: u64,
    ) -> EngineResult<()> {
        let window = dst.get_mut(offset..offset + count).ok_or_else(|| {
            EngineError::invalid_arg(format!(
                "window {offset}..{} out of bounds",
                offset + count
            ))
        })?;

        window.fill(0.0);
        if count == 0 || self.is_muted() {
            return Ok(());
        }

        let clips = self.clips.load();
        let mut contributed = false;

        CLIP_SCRATCH.with(|scratch| {
            let mut scratch = scratch.borrow_mut();
            if scratch.len() < count {
                scratch.resize(count, 0.0);
            }

            for clip in clips.iter() {
                if clip.is_muted() {
                    continue;
                }
                let channels = clip.channels().max(1);
                let frames = (count / channels) as u64;
                let start = clip.start_position();
                let end = clip.end_position();
                if start >= timeline_position + frames || end <= timeline_position {
                    continue;
                }

                // A clip may begin mid-window; align the read to its
                // entry frame so no material is lost at the seam
                let entry = start.max(timeline_position);
                let sub_offset = (entry - timeline_position) as usize * channels;
                let sub_count = count - sub_offset;

                let written = clip.render(&mut scratch[..count], sub_offset, sub_count, entry);
                if written == 0 {
                    continue;
                }
                contributed = true;
                for i in sub_offset..sub_offset + sub_count {
                    window[i] += scratch[i];
                }
            }
        });

        if contributed {
            let volume = self.volume();
            for sample in window.iter_mut() {
                *sample *= volume;
            }
        }
        Ok(())
    }

    /// Maximum clip peak across the window, scaled by the track volume
    pub fn peak_amplitude(&self, position: u64, window_frames: usize) -> Sample {
        if self.is_muted() || window_frames == 0 {
            return 0.0;
        }
        let end = position + window_frames as u64;
        let mut peak: Sample = 0.0;
        for clip in self.clips.load().iter() {
            if clip.is_muted() {
                continue;
            }
            let Some(audio) = clip.as_audio() else {
                continue;
            };
            let clip_start = audio.start_position().max(position);
            let clip_window = (end.saturating_sub(clip_start)) as usize;
            if clip_window == 0 {
                continue;
            }
            peak = peak.max(audio.peak_amplitude(clip_start, clip_window));
        }
        peak * self.volume()
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("clips", &self.clip_count())
            .field("volume", &self.volume())
            .field("pan", &self.pan())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_at(start: u64, frames: usize, value: Sample) -> AudioClip {
        let clip = AudioClip::from_samples("c", 2, 48_000, vec![value; frames * 2]).unwrap();
        clip.set_start_position(start);
        clip
    }

    #[test]
    fn test_defaults() {
        let track = Track::new("Audio 1");
        assert_eq!(track.name(), "Audio 1");
        assert_eq!(track.volume(), 1.0);
        assert_eq!(track.pan(), 0.0);
        assert!(!track.is_muted());
        assert!(!track.is_solo());
        assert!(!track.is_armed());
        assert_eq!(track.clip_count(), 0);
    }

    #[test]
    fn test_volume_and_pan_validation() {
        let track = Track::new("t");
        assert!(track.set_volume(-1.0).is_err());
        assert!(track.set_volume(Sample::INFINITY).is_err());
        assert!(track.set_pan(1.5).is_err());
        assert!(track.set_pan(-1.01).is_err());

        track.set_volume(0.8).unwrap();
        track.set_pan(-1.0).unwrap();
        track.set_pan(1.0).unwrap();
        assert_eq!(track.volume(), 0.8);
        assert_eq!(track.pan(), 1.0);
    }

    #[test]
    fn test_add_remove_clips() {
        let track = Track::new("t");
        let a = track.add_clip(clip_at(0, 10, 0.1));
        let b = track.add_clip(clip_at(100, 10, 0.2));
        assert_eq!(track.clip_count(), 2);

        assert!(track.remove_clip(a));
        assert!(!track.remove_clip(a));
        assert_eq!(track.clip_count(), 1);
        assert!(track.clip(b).is_some());

        track.clear_clips();
        assert_eq!(track.clip_count(), 0);
    }

    #[test]
    fn test_clips_in_range() {
        let track = Track::new("t");
        track.add_clip(clip_at(200, 50, 0.0));
        track.add_clip(clip_at(0, 100, 0.0));
        track.add_clip(clip_at(90, 20, 0.0));

        let hits = track.clips_in_range(95, 210).unwrap();
        assert_eq!(hits.len(), 3);
        // Sorted ascending by start
        assert_eq!(hits[0].start_position(), 0);
        assert_eq!(hits[1].start_position(), 90);
        assert_eq!(hits[2].start_position(), 200);

        // Half-open interval: a clip ending exactly at start is out
        let hits = track.clips_in_range(100, 110).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_position(), 90);

        assert!(track.clips_in_range(10, 5).is_err());
    }

    #[test]
    fn test_process_sums_overlapping_clips() {
        let track = Track::new("t");
        track.add_clip(clip_at(0, 16, 0.25));
        track.add_clip(clip_at(0, 16, 0.5));

        let mut buf = vec![0.0; 16];
        track.process_audio(&mut buf, 0, 16, 0).unwrap();
        assert!(buf.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_process_applies_volume_once() {
        let track = Track::new("t");
        track.add_clip(clip_at(0, 16, 0.5));
        track.set_volume(0.5).unwrap();

        let mut buf = vec![0.0; 8];
        track.process_audio(&mut buf, 0, 8, 0).unwrap();
        assert!(buf.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_process_muted_is_silent() {
        let track = Track::new("t");
        track.add_clip(clip_at(0, 16, 0.5));
        track.set_muted(true);

        let mut buf = vec![9.0; 8];
        track.process_audio(&mut buf, 0, 8, 0).unwrap();
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_process_respects_offset_window() {
        let track = Track::new("t");
        track.add_clip(clip_at(0, 16, 0.5));

        let mut buf = vec![9.0; 12];
        track.process_audio(&mut buf, 4, 8, 0).unwrap();
        assert!(buf[..4].iter().all(|&s| s == 9.0));
        assert!(buf[4..].iter().all(|&s| (s - 0.5).abs() < 1e-6));

        assert!(track.process_audio(&mut buf, 8, 8, 0).is_err());
    }

    #[test]
    fn test_process_skips_muted_clips() {
        let track = Track::new("t");
        let loud = clip_at(0, 16, 0.9);
        loud.set_muted(true);
        track.add_clip(loud);
        track.add_clip(clip_at(0, 16, 0.25));

        let mut buf = vec![0.0; 8];
        track.process_audio(&mut buf, 0, 8, 0).unwrap();
        assert!(buf.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_move_clip() {
        let track = Track::new("t");
        let id = track.add_clip(clip_at(0, 10, 0.0));
        track.move_clip(id, 500).unwrap();
        assert_eq!(track.clip(id).unwrap().start_position(), 500);

        let stray = ClipId(u64::MAX);
        assert!(matches!(
            track.move_clip(stray, 0),
            Err(EngineError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_trim_right_edge() {
        let track = Track::new("t");
        let id = track.add_clip(clip_at(0, 100, 0.0));
        track.trim_clip(id, None, Some(40)).unwrap();

        let clip = track.clip(id).unwrap();
        assert_eq!(clip.length(), 40);
        assert_eq!(clip.start_position(), 0);
    }

    #[test]
    fn test_trim_left_edge_keeps_material_anchored() {
        let samples: Vec<Sample> = (0..100).map(|i| i as Sample).collect();
        let clip = AudioClip::from_samples("ramp", 1, 48_000, samples).unwrap();

        let track = Track::new("t");
        let id = track.add_clip(clip);
        track.trim_clip(id, Some(30), None).unwrap();

        let clip = track.clip(id).unwrap();
        assert_eq!(clip.start_position(), 30);
        assert_eq!(clip.length(), 70);

        // Frame 30 on the timeline still plays storage frame 30
        let mut dst = vec![0.0; 1];
        clip.as_audio()
            .unwrap()
            .read_samples(&mut dst, 0, 1, 30)
            .unwrap();
        assert_eq!(dst[0], 30.0);
    }

    #[test]
    fn test_split_clip() {
        let track = Track::new("t");
        let id = track.add_clip(clip_at(0, 100, 0.5));

        let right = track.split_clip(id, 60).unwrap();
        assert_eq!(track.clip_count(), 2);

        let left = track.clip(id).unwrap();
        assert_eq!(left.length(), 60);
        assert_eq!(right.start_position(), 60);
        assert_eq!(right.length(), 40);
        assert!(left
            .as_audio()
            .unwrap()
            .shares_storage_with(right.as_audio().unwrap()));

        // Split point must be strictly inside
        assert!(track.split_clip(id, 0).is_err());
        assert!(track.split_clip(id, 60).is_err());
    }

    #[test]
    fn test_peak_across_clips() {
        let track = Track::new("t");
        track.add_clip(clip_at(0, 16, 0.3));
        track.add_clip(clip_at(8, 16, 0.6));
        track.set_volume(0.5).unwrap();

        let peak = track.peak_amplitude(0, 32);
        assert!((peak - 0.3).abs() < 1e-6, "peak was {peak}");
    }

    #[test]
    fn test_property_events() {
        use sp_core::EventBus;

        let (sink, stream) = EventBus::bounded(32);
        let track = Track::new("t").with_event_sink(sink);

        track.set_volume(0.7).unwrap();
        track.set_muted(true);
        let id = track.add_clip(clip_at(0, 4, 0.0));
        track.remove_clip(id);

        let events = stream.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Track {
                change: TrackChange::Volume(v),
                ..
            } if (*v - 0.7).abs() < 1e-6
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Track {
                change: TrackChange::ClipAdded(_),
                ..
            }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Track {
                change: TrackChange::ClipRemoved(_),
                ..
            }
        )));
    }
}
