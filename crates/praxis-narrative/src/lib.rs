//! praxis-narrative
//!
//! The streaming narrative wire format (line-delimited `data:` events),
//! its incremental decoder, and the narrative synthesizer used when no
//! model is reachable.

pub mod error;
pub mod events;
pub mod sse;
pub mod synth;
