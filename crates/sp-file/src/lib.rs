//! sp-file: WAV codec boundary for Spool
//!
//! A pure codec: byte streams in, interleaved f32 samples plus
//! `{sample_rate, channel_count, bit_depth}` metadata out, and the
//! reverse on export. No engine types cross this boundary except the
//! `Sample` alias.

mod error;
mod wav;

pub use error::*;
pub use wav::*;
