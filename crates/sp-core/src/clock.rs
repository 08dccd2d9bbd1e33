//! Musical clock
//!
//! Provides:
//! - Sample-rate-anchored conversions between samples, seconds, and
//!   musical time (bar/beat/tick)
//! - Tempo and time signature state, readable without locking from the
//!   audio thread
//! - Beat and bar lengths in samples
//!
//! The clock is stateless with respect to position: it holds only the
//! sample rate, tempo, and time signature. The transport owns the
//! playhead and asks the clock for conversions.

use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::events::{ClockEvent, EngineEvent, EventSink};

/// Default ticks per quarter note (MIDI-file resolution)
pub const DEFAULT_TICKS_PER_QUARTER: u32 = 480;

/// Default tempo in BPM
pub const DEFAULT_TEMPO: f64 = 120.0;

// ═══════════════════════════════════════════════════════════════════════════
// TIME SIGNATURE
// ═══════════════════════════════════════════════════════════════════════════

/// Time signature (e.g. 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats per bar
    pub numerator: u8,
    /// Note value that gets one beat (must be a power of two)
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    /// Common time (4/4)
    pub const COMMON: Self = Self {
        numerator: 4,
        denominator: 4,
    };

    /// Waltz time (3/4)
    pub const WALTZ: Self = Self {
        numerator: 3,
        denominator: 4,
    };

    pub fn new(numerator: u8, denominator: u8) -> EngineResult<Self> {
        if numerator == 0 {
            return Err(EngineError::invalid_arg(
                "time signature numerator must be positive",
            ));
        }
        if denominator == 0 || !denominator.is_power_of_two() {
            return Err(EngineError::invalid_arg(format!(
                "time signature denominator must be a positive power of two, got {denominator}"
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Pack into one word for atomic publication
    #[inline]
    fn as_u16(self) -> u16 {
        ((self.numerator as u16) << 8) | self.denominator as u16
    }

    #[inline]
    fn from_u16(bits: u16) -> Self {
        Self {
            numerator: (bits >> 8) as u8,
            denominator: (bits & 0xFF) as u8,
        }
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MUSICAL TIME
// ═══════════════════════════════════════════════════════════════════════════

/// Musical position: 1-based bar and beat, 0-based tick within the beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicalTime {
    pub bar: u32,
    pub beat: u32,
    pub tick: u32,
}

impl MusicalTime {
    pub fn new(bar: u32, beat: u32, tick: u32) -> Self {
        Self { bar, beat, tick }
    }
}

impl Default for MusicalTime {
    fn default() -> Self {
        Self {
            bar: 1,
            beat: 1,
            tick: 0,
        }
    }
}

impl std::fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{:03}", self.bar, self.beat, self.tick)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CLOCK
// ═══════════════════════════════════════════════════════════════════════════

/// Session clock: sample rate, tempo, and time signature
///
/// Tempo and signature are stored as single words so the audio thread
/// reads them with relaxed loads while the control thread changes them.
pub struct Clock {
    sample_rate: u32,
    ticks_per_quarter: u32,
    /// Tempo in BPM (f64 bits)
    tempo: AtomicU64,
    /// Packed time signature
    signature: AtomicU16,
    events: EventSink,
}

impl Clock {
    /// Create a clock at the given sample rate, 120 BPM, 4/4
    pub fn new(sample_rate: u32) -> EngineResult<Self> {
        Self::with_ticks_per_quarter(sample_rate, DEFAULT_TICKS_PER_QUARTER)
    }

    /// Create a clock with a non-default tick resolution
    pub fn with_ticks_per_quarter(sample_rate: u32, ticks_per_quarter: u32) -> EngineResult<Self> {
        if sample_rate == 0 {
            return Err(EngineError::invalid_arg("sample rate must be positive"));
        }
        if ticks_per_quarter == 0 {
            return Err(EngineError::invalid_arg(
                "ticks per quarter note must be positive",
            ));
        }
        Ok(Self {
            sample_rate,
            ticks_per_quarter,
            tempo: AtomicU64::new(DEFAULT_TEMPO.to_bits()),
            signature: AtomicU16::new(TimeSignature::default().as_u16()),
            events: EventSink::disabled(),
        })
    }

    /// Attach an event sink (consumes self; wire before sharing)
    pub fn with_event_sink(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo.load(Ordering::Relaxed))
    }

    /// Set the tempo in BPM; rejects non-positive or non-finite values
    pub fn set_tempo(&self, bpm: f64) -> EngineResult<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(EngineError::invalid_arg(format!(
                "tempo must be positive, got {bpm}"
            )));
        }
        self.tempo.store(bpm.to_bits(), Ordering::Relaxed);
        self.events
            .emit(EngineEvent::Clock(ClockEvent::TempoChanged(bpm)));
        Ok(())
    }

    #[inline]
    pub fn time_signature(&self) -> TimeSignature {
        TimeSignature::from_u16(self.signature.load(Ordering::Relaxed))
    }

    pub fn set_time_signature(&self, numerator: u8, denominator: u8) -> EngineResult<()> {
        let signature = TimeSignature::new(numerator, denominator)?;
        self.signature.store(signature.as_u16(), Ordering::Relaxed);
        self.events
            .emit(EngineEvent::Clock(ClockEvent::TimeSignatureChanged(
                signature,
            )));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CONVERSIONS
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate as f64
    }

    /// Floor conversion; negative input clamps to zero
    #[inline]
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate as f64) as u64
    }

    /// Length of one time-signature beat in samples, rounded
    pub fn beat_length_samples(&self) -> u64 {
        let signature = self.time_signature();
        let seconds = (60.0 / self.tempo()) * (4.0 / signature.denominator as f64);
        (seconds * self.sample_rate as f64).round() as u64
    }

    /// Length of one bar in samples
    pub fn bar_length_samples(&self) -> u64 {
        let signature = self.time_signature();
        self.beat_length_samples() * signature.numerator as u64
    }

    /// Ticks in one time-signature beat
    #[inline]
    fn ticks_per_beat(&self, signature: TimeSignature) -> u64 {
        self.ticks_per_quarter as u64 * 4 / signature.denominator as u64
    }

    /// Convert a sample position to bar/beat/tick
    ///
    /// Total ticks are rounded, not floored, so positions produced by
    /// `musical_time_to_samples` (which floors to a sample) convert back
    /// to the exact tick they came from.
    pub fn samples_to_musical_time(&self, samples: u64) -> MusicalTime {
        let signature = self.time_signature();
        let ticks_per_beat = self.ticks_per_beat(signature).max(1);
        let ticks_per_bar = ticks_per_beat * signature.numerator as u64;

        let quarters = self.samples_to_seconds(samples) * (self.tempo() / 60.0);
        let total_ticks = (quarters * self.ticks_per_quarter as f64).round() as u64;

        let bar = total_ticks / ticks_per_bar + 1;
        let remainder = total_ticks % ticks_per_bar;
        let beat = remainder / ticks_per_beat + 1;
        let tick = remainder % ticks_per_beat;

        MusicalTime {
            bar: bar as u32,
            beat: beat as u32,
            tick: tick as u32,
        }
    }

    /// Convert a musical position to a sample position (floored)
    ///
    /// Fails with `InvalidArgument` when `bar` or `beat` is zero (both
    /// are 1-based).
    pub fn musical_time_to_samples(&self, time: MusicalTime) -> EngineResult<u64> {
        if time.bar == 0 {
            return Err(EngineError::invalid_arg("bar is 1-based, got 0"));
        }
        if time.beat == 0 {
            return Err(EngineError::invalid_arg("beat is 1-based, got 0"));
        }

        let signature = self.time_signature();
        let ticks_per_beat = self.ticks_per_beat(signature).max(1);
        let total_ticks = ((time.bar as u64 - 1) * signature.numerator as u64
            + (time.beat as u64 - 1))
            * ticks_per_beat
            + time.tick as u64;

        let quarters = total_ticks as f64 / self.ticks_per_quarter as f64;
        let seconds = quarters * (60.0 / self.tempo());
        Ok(self.seconds_to_samples(seconds))
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("sample_rate", &self.sample_rate)
            .field("tempo", &self.tempo())
            .field("time_signature", &self.time_signature())
            .field("ticks_per_quarter", &self.ticks_per_quarter)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
