//! Upstream engine binary protocol.
//!
//! The translation engine speaks a tag-length-value binary format over its
//! WebSocket: each frame is a message made of numbered fields, where a field
//! is a varint tag `(field_number << 3) | wire_type` followed by either a
//! varint or a length-prefixed byte string. Nested blocks are encoded
//! messages carried as byte strings. The layout is byte-compatible with the
//! engine's protobuf wiring, which is an interoperability requirement, not
//! an internal choice.
//!
//! - [`wire`]: the low-level varint/TLV reader and writer
//! - [`events`]: the fixed upstream event-code enumeration
//! - [`frames`]: typed request builders and the response parser

pub mod events;
pub mod frames;
pub mod wire;

pub use events::EventType;
pub use frames::TranslateResponse;
