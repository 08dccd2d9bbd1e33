//! Engine change notifications
//!
//! Provides:
//! - Event payloads for transport, clock, track, and clip changes
//! - A bounded observer queue: mutators push without blocking, observers
//!   drain on their own thread
//!
//! Mutators call [`EventSink::emit`] while holding their own short
//! critical sections; a full queue drops the event and bumps a counter
//! instead of blocking. Audio-thread parameter reads never touch the
//! queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::clock::{MusicalTime, TimeSignature};

// ═══════════════════════════════════════════════════════════════════════════
// EVENT PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════

/// Transport state as observed by listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportStateTag {
    Stopped,
    Playing,
    Paused,
    Recording,
}

/// Transport notifications
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    StateChanged(TransportStateTag),
    PositionChanged {
        samples: u64,
        seconds: f64,
        musical: MusicalTime,
    },
}

/// Clock notifications
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    TempoChanged(f64),
    TimeSignatureChanged(TimeSignature),
}

/// Track property and structure notifications
#[derive(Debug, Clone, PartialEq)]
pub enum TrackChange {
    Volume(f32),
    Pan(f32),
    Muted(bool),
    Solo(bool),
    Armed(bool),
    Renamed(String),
    ClipAdded(u64),
    ClipRemoved(u64),
}

/// Clip property notifications
#[derive(Debug, Clone, PartialEq)]
pub enum ClipChange {
    StartPosition(u64),
    EndPosition(u64),
    Length(u64),
    SourceOffset(u64),
    Gain(f32),
    Muted(bool),
    FadeIn(u64),
    FadeOut(u64),
    Renamed(String),
}

/// One engine notification
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Transport(TransportEvent),
    Clock(ClockEvent),
    Track { track: u64, change: TrackChange },
    Clip { clip: u64, change: ClipChange },
}

// ═══════════════════════════════════════════════════════════════════════════
// OBSERVER QUEUE
// ═══════════════════════════════════════════════════════════════════════════

/// Sending half of the observer queue
///
/// Cloneable and cheap; every entity in a session holds one. The
/// default [`EventSink::disabled`] sink swallows events, so entities
/// work standalone before they are wired into a session.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<Sender<EngineEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// A sink that swallows everything
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Push an event without blocking
    ///
    /// A full or disconnected queue drops the event; fullness is
    /// counted so observers can detect overruns.
    pub fn emit(&self, event: EngineEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of events dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("enabled", &self.is_enabled())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Receiving half of the observer queue
pub struct EventStream {
    rx: Receiver<EngineEvent>,
}

impl EventStream {
    /// Block until the next event arrives or every sink is gone
    pub fn recv(&self) -> Option<EngineEvent> {
        self.rx.recv().ok()
    }

    /// Non-blocking poll
    pub fn try_recv(&self) -> Option<EngineEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a bounded observer queue
pub struct EventBus;

impl EventBus {
    pub fn bounded(capacity: usize) -> (EventSink, EventStream) {
        let (tx, rx) = bounded(capacity);
        (
            EventSink {
                tx: Some(tx),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            EventStream { rx },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_drain() {
        let (sink, stream) = EventBus::bounded(8);

        sink.emit(EngineEvent::Clock(ClockEvent::TempoChanged(140.0)));
        sink.emit(EngineEvent::Track {
            track: 3,
            change: TrackChange::Muted(true),
        });

        let events = stream.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            EngineEvent::Clock(ClockEvent::TempoChanged(140.0))
        );
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (sink, stream) = EventBus::bounded(2);

        for i in 0..5 {
            sink.emit(EngineEvent::Clip {
                clip: i,
                change: ClipChange::Gain(1.0),
            });
        }

        assert_eq!(stream.len(), 2);
        assert_eq!(sink.dropped(), 3);
    }

    #[test]
    fn test_disabled_sink_swallows() {
        let sink = EventSink::disabled();
        sink.emit(EngineEvent::Clock(ClockEvent::TempoChanged(99.0)));
        assert_eq!(sink.dropped(), 0);
    }
}
