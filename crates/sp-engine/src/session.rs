//! Session root
//!
//! One session owns the whole object graph: clock → transport → mixer,
//! plus the observer queue every entity reports into. There is no
//! global state; dropping the session drops its tracks and their clips.

use std::sync::Arc;

use sp_core::{Clock, EngineResult, EventSink, EventStream, EventBus, Sample};

use crate::mixer::Mixer;
use crate::track::Track;
use crate::transport::{Transport, TransportState};
use crate::ids::TrackId;

/// Session construction parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub channel_count: usize,
    /// Largest buffer the hardware callback may request
    pub max_block_frames: usize,
    /// Observer queue capacity
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channel_count: 2,
            max_block_frames: 8192,
            event_capacity: 1024,
        }
    }
}

/// A complete engine instance
pub struct Session {
    clock: Arc<Clock>,
    transport: Arc<Transport>,
    mixer: Mixer,
    events: EventSink,
    stream: Option<EventStream>,
}

impl Session {
    pub fn new(config: SessionConfig) -> EngineResult<Self> {
        let (sink, stream) = EventBus::bounded(config.event_capacity);

        let clock = Arc::new(Clock::new(config.sample_rate)?.with_event_sink(sink.clone()));
        let transport = Arc::new(
            Transport::new(Arc::clone(&clock)).with_event_sink(sink.clone()),
        );
        let mixer = Mixer::new(
            Arc::clone(&transport),
            config.sample_rate,
            config.channel_count,
            config.max_block_frames,
        )?;

        Ok(Self {
            clock,
            transport,
            mixer,
            events: sink,
            stream: Some(stream),
        })
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Take the observer stream; available once
    pub fn take_events(&mut self) -> Option<EventStream> {
        self.stream.take()
    }

    /// Create a track wired into the session's observer queue
    pub fn add_audio_track(&self, name: &str) -> TrackId {
        let track = Arc::new(Track::new(name).with_event_sink(self.events.clone()));
        let id = track.id();
        self.mixer.add_track(track);
        id
    }

    /// The hardware-callback contract in one call: render the block,
    /// then advance the transport iff it is Playing
    pub fn process_callback(&self, out: &mut [Sample], frame_count: usize) {
        self.mixer.process_buffer(out, frame_count);
        if self.transport.state() == TransportState::Playing {
            self.transport.advance(frame_count as u64);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sample_rate", &self.clock.sample_rate())
            .field("tracks", &self.mixer.track_count())
            .field("transport", &self.transport)
            .finish()
    }
}
