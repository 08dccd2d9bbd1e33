//! sp-core: Shared types for the Spool audio engine
//!
//! This crate provides the foundation used across all Spool crates:
//! - Sample type and atomic sample cell
//! - Musical clock (tempo, time signature, samples ↔ seconds ↔ bar/beat/tick)
//! - Error taxonomy
//! - Engine events and the bounded observer queue

mod clock;
mod error;
mod events;
mod sample;

pub use clock::*;
pub use error::*;
pub use events::*;
pub use sample::*;
