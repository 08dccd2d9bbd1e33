//! Transport state machine
//!
//! Provides:
//! - Stopped / Playing / Paused / Recording states
//! - Sample-accurate position with loop wrap-around
//! - Seek, rewind, and the stop anchor
//! - Lock-free `advance` for the audio thread
//!
//! All state lives in single-word atomics. Control operations serialize
//! on a short mutex so concurrent callers see whole transitions; the
//! audio thread only ever calls [`Transport::advance`], which takes no
//! lock at all.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use sp_core::{
    Clock, EngineEvent, EventSink, TransportEvent, TransportStateTag,
};

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransportState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
    Recording = 3,
}

impl From<u8> for TransportState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            3 => Self::Recording,
            _ => Self::Stopped,
        }
    }
}

impl TransportState {
    fn tag(self) -> TransportStateTag {
        match self {
            Self::Stopped => TransportStateTag::Stopped,
            Self::Playing => TransportStateTag::Playing,
            Self::Paused => TransportStateTag::Paused,
            Self::Recording => TransportStateTag::Recording,
        }
    }
}

/// The session transport
///
/// Holds the playhead, the loop window, and the stop anchor. The clock
/// outlives the transport (shared `Arc`), and supplies the musical-time
/// payload for position notifications.
pub struct Transport {
    clock: Arc<Clock>,
    state: AtomicU8,
    /// Playhead in samples
    position: AtomicU64,
    /// Position restored when `stop` is issued; updated by `seek` while
    /// Stopped
    stop_position: AtomicU64,
    loop_enabled: AtomicBool,
    loop_start: AtomicU64,
    loop_end: AtomicU64,
    /// Serializes control operations; never taken by `advance`
    control: Mutex<()>,
    events: EventSink,
}

impl Transport {
    pub fn new(clock: Arc<Clock>) -> Self {
        Self {
            clock,
            state: AtomicU8::new(TransportState::Stopped as u8),
            position: AtomicU64::new(0),
            stop_position: AtomicU64::new(0),
            loop_enabled: AtomicBool::new(false),
            loop_start: AtomicU64::new(0),
            loop_end: AtomicU64::new(0),
            control: Mutex::new(()),
            events: EventSink::disabled(),
        }
    }

    /// Attach an event sink (wire before sharing)
    pub fn with_event_sink(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATE READS (audio-thread safe)
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn state(&self) -> TransportState {
        TransportState::from(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.loop_enabled.load(Ordering::Relaxed)
    }

    pub fn loop_start(&self) -> u64 {
        self.loop_start.load(Ordering::Relaxed)
    }

    pub fn loop_end(&self) -> u64 {
        self.loop_end.load(Ordering::Relaxed)
    }

    pub fn stop_position(&self) -> u64 {
        self.stop_position.load(Ordering::Relaxed)
    }

    pub fn position_seconds(&self) -> f64 {
        self.clock.samples_to_seconds(self.position())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRANSITIONS (control thread)
    // ═══════════════════════════════════════════════════════════════════════

    /// Start playback; from Paused or Recording the position is kept
    pub fn play(&self) {
        let _guard = self.control.lock();
        self.set_state(TransportState::Playing);
    }

    /// Pause; only meaningful while Playing or Recording
    pub fn pause(&self) {
        let _guard = self.control.lock();
        match self.state() {
            TransportState::Playing | TransportState::Recording => {
                self.set_state(TransportState::Paused);
            }
            _ => {}
        }
    }

    /// Stop and restore the playhead to the stop anchor
    pub fn stop(&self) {
        let _guard = self.control.lock();
        self.set_state(TransportState::Stopped);
        let anchor = self.stop_position.load(Ordering::Relaxed);
        self.store_position(anchor);
    }

    /// Enter record mode; position is kept
    pub fn record(&self) {
        let _guard = self.control.lock();
        self.set_state(TransportState::Recording);
    }

    /// Move the playhead; while Stopped this also moves the stop anchor
    pub fn seek(&self, position: u64) {
        let _guard = self.control.lock();
        if self.state() == TransportState::Stopped {
            self.stop_position.store(position, Ordering::Relaxed);
        }
        self.store_position(position);
    }

    /// Seek to the session start
    pub fn rewind(&self) {
        self.seek(0);
    }

    fn set_state(&self, state: TransportState) {
        let previous = TransportState::from(
            self.state.swap(state as u8, Ordering::Relaxed),
        );
        if previous != state {
            self.events.emit(EngineEvent::Transport(
                TransportEvent::StateChanged(state.tag()),
            ));
        }
    }

    fn store_position(&self, position: u64) {
        let previous = self.position.swap(position, Ordering::Relaxed);
        if previous != position {
            self.events.emit(EngineEvent::Transport(
                TransportEvent::PositionChanged {
                    samples: position,
                    seconds: self.clock.samples_to_seconds(position),
                    musical: self.clock.samples_to_musical_time(position),
                },
            ));
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LOOP WINDOW
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_looping(&self, enabled: bool) {
        let _guard = self.control.lock();
        self.loop_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Set the loop start; if this would break `start < end`, the end is
    /// pushed one bar past the new start
    pub fn set_loop_start(&self, start: u64) {
        let _guard = self.control.lock();
        self.loop_start.store(start, Ordering::Relaxed);
        if start >= self.loop_end.load(Ordering::Relaxed) {
            let bar = self.clock.bar_length_samples().max(1);
            self.loop_end.store(start + bar, Ordering::Relaxed);
        }
    }

    /// Set the loop end; if this would break `start < end`, the start is
    /// pulled one bar ahead of the new end (clamped at zero)
    pub fn set_loop_end(&self, end: u64) {
        let _guard = self.control.lock();
        self.loop_end.store(end, Ordering::Relaxed);
        if self.loop_start.load(Ordering::Relaxed) >= end {
            let bar = self.clock.bar_length_samples().max(1);
            self.loop_start.store(end.saturating_sub(bar), Ordering::Relaxed);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ADVANCE (audio thread)
    // ═══════════════════════════════════════════════════════════════════════

    /// Advance the playhead by `frames` while Playing or Recording,
    /// wrapping inside the loop window when looping.
    ///
    /// Lock-free; the audio thread is the sole writer while the
    /// transport runs. Returns the new position.
    #[inline]
    pub fn advance(&self, frames: u64) -> u64 {
        let state = self.state();
        if state != TransportState::Playing && state != TransportState::Recording {
            return self.position();
        }

        let current = self.position.load(Ordering::Relaxed);
        let mut new_position = current + frames;

        if self.loop_enabled.load(Ordering::Relaxed) {
            let end = self.loop_end.load(Ordering::Relaxed);
            let start = self.loop_start.load(Ordering::Relaxed);
            if end > start && new_position >= end {
                let loop_len = end - start;
                new_position = start + (new_position - end) % loop_len;
            }
        }

        self.position.store(new_position, Ordering::Relaxed);
        new_position
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state())
            .field("position", &self.position())
            .field("looping", &self.is_looping())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> Transport {
        Transport::new(Arc::new(Clock::new(48_000).unwrap()))
    }

    #[test]
    fn test_initial_state() {
        let t = transport();
        assert_eq!(t.state(), TransportState::Stopped);
        assert_eq!(t.position(), 0);
        assert!(!t.is_looping());
    }

    #[test]
    fn test_transition_table() {
        let t = transport();

        t.play();
        assert_eq!(t.state(), TransportState::Playing);

        t.pause();
        assert_eq!(t.state(), TransportState::Paused);

        t.play();
        assert_eq!(t.state(), TransportState::Playing);

        t.record();
        assert_eq!(t.state(), TransportState::Recording);

        t.pause();
        assert_eq!(t.state(), TransportState::Paused);

        t.stop();
        assert_eq!(t.state(), TransportState::Stopped);

        // Pause from Stopped is a no-op
        t.pause();
        assert_eq!(t.state(), TransportState::Stopped);
    }

    #[test]
    fn test_pause_keeps_position() {
        let t = transport();
        t.play();
        t.advance(1000);
        t.pause();
        assert_eq!(t.position(), 1000);

        t.play();
        assert_eq!(t.position(), 1000);
    }

    #[test]
    fn test_stop_restores_anchor() {
        let t = transport();

        // Fresh session: anchor is 0
        t.play();
        t.advance(5000);
        t.stop();
        assert_eq!(t.position(), 0);

        // Seek while stopped moves the anchor
        t.seek(2000);
        t.play();
        t.advance(3000);
        assert_eq!(t.position(), 5000);
        t.stop();
        assert_eq!(t.position(), 2000);

        // Seek while playing does NOT move the anchor
        t.play();
        t.seek(9000);
        t.stop();
        assert_eq!(t.position(), 2000);
    }

    #[test]
    fn test_advance_ignored_unless_rolling() {
        let t = transport();
        t.advance(512);
        assert_eq!(t.position(), 0);

        t.play();
        t.pause();
        t.advance(512);
        assert_eq!(t.position(), 0);

        t.record();
        t.advance(512);
        assert_eq!(t.position(), 512);
    }

    #[test]
    fn test_advance_zero_is_noop() {
        let t = transport();
        t.play();
        t.advance(0);
        assert_eq!(t.position(), 0);
    }

    #[test]
    fn test_loop_wrap_around() {
        let t = transport();
        t.set_loop_start(0);
        t.set_loop_end(1000);
        t.set_looping(true);
        t.play();
        t.seek(900);

        t.advance(200);
        assert_eq!(t.position(), 100);
    }

    #[test]
    fn test_loop_wrap_multiple_lengths() {
        let t = transport();
        t.set_loop_start(100);
        t.set_loop_end(200);
        t.set_looping(true);
        t.play();
        t.seek(150);

        // 150 + 375 = 525; overflow 325 over a 100-sample loop → 100 + 25
        t.advance(375);
        assert_eq!(t.position(), 125);
        assert!(t.position() >= t.loop_start() && t.position() < t.loop_end());
    }

    #[test]
    fn test_loop_bounds_stay_ordered() {
        let t = transport();
        t.set_loop_end(1000);
        t.set_loop_start(5000);
        // End auto-adjusted one bar past start
        assert!(t.loop_start() < t.loop_end());
        assert_eq!(t.loop_end(), 5000 + t.clock().bar_length_samples());

        t.set_loop_end(2000);
        assert!(t.loop_start() < t.loop_end());
    }

    #[test]
    fn test_rewind() {
        let t = transport();
        t.play();
        t.advance(4242);
        t.rewind();
        assert_eq!(t.position(), 0);
    }

    #[test]
    fn test_position_never_escapes_loop_window() {
        let t = transport();
        t.set_loop_start(480);
        t.set_loop_end(4800);
        t.set_looping(true);
        t.seek(480);
        t.play();

        for step in [1u64, 63, 256, 511, 1024, 4321] {
            t.advance(step);
            let p = t.position();
            assert!(
                (480..4800).contains(&p),
                "position {p} escaped loop window after advance({step})"
            );
        }
    }

    #[test]
    fn test_state_and_position_events() {
        use sp_core::EventBus;

        let (sink, stream) = EventBus::bounded(64);
        let clock = Arc::new(Clock::new(48_000).unwrap());
        let t = Transport::new(clock).with_event_sink(sink);

        t.play();
        t.seek(24_000);
        t.stop();

        let events = stream.drain();
        assert!(events.contains(&EngineEvent::Transport(
            TransportEvent::StateChanged(TransportStateTag::Playing)
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Transport(TransportEvent::PositionChanged {
                samples: 24_000,
                ..
            })
        )));
        assert!(events.contains(&EngineEvent::Transport(
            TransportEvent::StateChanged(TransportStateTag::Stopped)
        )));
    }
}
