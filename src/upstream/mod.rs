//! Client side of the bridge: the WebSocket connection to the cloud
//! translation engine.

pub mod client;

pub use client::{connect, UpstreamHandle, UpstreamSignal};
