//! # Microphone Ingress
//!
//! Converts browser-captured audio into the PCM16 little-endian stream the
//! translation engine expects. Two client paths land here: raw Float32
//! sample buffers sent as binary WebSocket frames, and base64-encoded
//! PCM16 sent inside JSON audio messages.

use crate::error::BridgeError;
use base64::{engine::general_purpose, Engine as _};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Convert 32-bit float samples in [-1.0, 1.0] to PCM16 little-endian
/// bytes. Out-of-range samples are clamped rather than wrapped.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * 32767.0) as i16;
        // Writing to a Vec cannot fail.
        let _ = out.write_i16::<LittleEndian>(value);
    }
    out
}

/// Reinterpret a binary WebSocket frame as Float32 LE samples and convert
/// to PCM16. A frame whose length is not a multiple of 4 is rejected as a
/// framing error; the caller drops the block and keeps the session alive.
pub fn float_frame_to_pcm16(frame: &[u8]) -> Result<Vec<u8>, BridgeError> {
    if frame.len() % 4 != 0 {
        return Err(BridgeError::Framing(format!(
            "binary audio frame length {} is not a multiple of 4",
            frame.len()
        )));
    }

    let mut cursor = Cursor::new(frame);
    let mut samples = Vec::with_capacity(frame.len() / 4);
    while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
        samples.push(sample);
    }
    Ok(f32_to_pcm16(&samples))
}

/// Decode the base64 PCM16 payload of a JSON audio message. The bytes are
/// forwarded as-is; an odd byte count still gets rejected so a misaligned
/// client shows up in the logs instead of producing static upstream.
pub fn decode_base64_pcm16(data: &str) -> Result<Vec<u8>, BridgeError> {
    let bytes = general_purpose::STANDARD
        .decode(data)
        .map_err(|e| BridgeError::Framing(format!("invalid base64 audio payload: {}", e)))?;

    if bytes.len() % 2 != 0 {
        return Err(BridgeError::Framing(format!(
            "PCM16 payload length {} is odd",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Peak amplitude of a PCM16 LE block, for debug-level ingress logging.
pub fn peak_amplitude(pcm: &[u8]) -> i16 {
    let mut peak = 0i16;
    for chunk in pcm.chunks_exact(2) {
        let sample = LittleEndian::read_i16(chunk);
        peak = peak.max(sample.saturating_abs());
    }
    peak
}
