//! Audio plumbing between the browser and the translation engine:
//! microphone ingress (sample conversion) and synthesized-speech egress
//! (per-turn playback ordering).

pub mod egress;
pub mod ingress;

pub use egress::PlaybackQueue;
