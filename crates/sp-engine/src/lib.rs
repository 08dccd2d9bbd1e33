//! sp-engine: the Spool engine core
//!
//! Provides:
//! - Transport state machine with loop wrap-around and sample-accurate
//!   position
//! - Clip model: timeline placement, gain, fades, owned sample storage
//! - Tracks with volume/pan/mute/solo and lock-free clip snapshots
//! - The per-buffer real-time mixer (constant-power pan, solo
//!   precedence, master stage)
//! - Session root wiring clock, transport, mixer, and the observer
//!   queue
//! - WAV importer producing stereo-normalized clips

mod clip;
mod ids;
mod import;
mod mixer;
mod session;
mod track;
mod transport;

pub use clip::{AudioClip, Clip};
pub use ids::{ClipId, TrackId};
pub use import::{clip_from_wav, export_clip_wav, import_wav, normalize_to_stereo};
pub use mixer::Mixer;
pub use session::{Session, SessionConfig};
pub use track::Track;
pub use transport::{Transport, TransportState};
