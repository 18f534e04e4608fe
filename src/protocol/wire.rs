//! Low-level tag-length-value wire codec.
//!
//! Varints carry 7 payload bits per byte, least-significant group first,
//! with the high bit as a continuation flag. Strings, byte blobs and nested
//! messages are length-prefixed. Decoding tolerates unknown field numbers
//! (skipped according to their wire type) and zero-length payloads; the only
//! hard failures are truncation mid-varint or mid-length-prefixed value,
//! which are framing errors.

use crate::error::BridgeError;

/// Wire type for varint-encoded fields.
pub const WIRE_VARINT: u8 = 0;
/// Wire type for 8-byte fixed-width fields.
pub const WIRE_FIXED64: u8 = 1;
/// Wire type for length-prefixed fields (strings, bytes, nested messages).
pub const WIRE_LEN: u8 = 2;
/// Wire type for 4-byte fixed-width fields.
pub const WIRE_FIXED32: u8 = 5;

/// Incremental reader over an immutable frame buffer.
///
/// Carries the buffer and a mutable offset; every read advances the offset
/// and fails predictably (never silently) when the buffer runs out.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset into the buffer, for error reporting.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read one varint. Fails if the buffer ends mid-varint or the value
    /// does not fit in 64 bits.
    pub fn read_varint(&mut self) -> Result<u64, BridgeError> {
        let start = self.pos;
        let mut value: u64 = 0;
        let mut shift: u32 = 0;

        loop {
            let byte = match self.buf.get(self.pos) {
                Some(b) => *b,
                None => return Err(BridgeError::truncated("varint", start)),
            };
            self.pos += 1;

            if shift >= 64 {
                return Err(BridgeError::Framing(format!(
                    "varint at offset {} exceeds 64 bits",
                    start
                )));
            }
            value |= u64::from(byte & 0x7f) << shift;

            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a field tag, returning `(field_number, wire_type)`.
    pub fn read_tag(&mut self) -> Result<(u32, u8), BridgeError> {
        let start = self.pos;
        let tag = self.read_varint()?;
        let field = (tag >> 3) as u32;
        let wire_type = (tag & 0x07) as u8;
        if field == 0 {
            return Err(BridgeError::Framing(format!(
                "field number 0 at offset {}",
                start
            )));
        }
        Ok((field, wire_type))
    }

    /// Read a length-prefixed value and return the payload slice.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], BridgeError> {
        let start = self.pos;
        let len = self.read_varint()? as usize;
        if self.buf.len() - self.pos < len {
            return Err(BridgeError::truncated("length-delimited value", start));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_fixed(&mut self, width: usize, what: &str) -> Result<(), BridgeError> {
        if self.buf.len() - self.pos < width {
            return Err(BridgeError::truncated(what, self.pos));
        }
        self.pos += width;
        Ok(())
    }

    /// Skip over one value of the given wire type. Used for field numbers
    /// the fixed schema does not recognize.
    pub fn skip_value(&mut self, wire_type: u8) -> Result<(), BridgeError> {
        match wire_type {
            WIRE_VARINT => self.read_varint().map(|_| ()),
            WIRE_FIXED64 => self.read_fixed(8, "fixed64 value"),
            WIRE_LEN => self.read_length_delimited().map(|_| ()),
            WIRE_FIXED32 => self.read_fixed(4, "fixed32 value"),
            other => Err(BridgeError::Framing(format!(
                "unsupported wire type {} at offset {}",
                other, self.pos
            ))),
        }
    }
}

/// Append-only frame writer.
#[derive(Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn push_tag(&mut self, field: u32, wire_type: u8) {
        self.push_varint((u64::from(field) << 3) | u64::from(wire_type));
    }

    /// Emit an unsigned integer field.
    pub fn varint_field(&mut self, field: u32, value: u64) {
        self.push_tag(field, WIRE_VARINT);
        self.push_varint(value);
    }

    /// Emit a signed integer field (two's complement varint, matching the
    /// engine's plain int encoding).
    pub fn int_field(&mut self, field: u32, value: i64) {
        self.varint_field(field, value as u64);
    }

    /// Emit a boolean field as a 0/1 varint.
    pub fn bool_field(&mut self, field: u32, value: bool) {
        self.varint_field(field, u64::from(value));
    }

    /// Emit a UTF-8 string field.
    pub fn string_field(&mut self, field: u32, value: &str) {
        self.bytes_field(field, value.as_bytes());
    }

    /// Emit a raw byte-string field.
    pub fn bytes_field(&mut self, field: u32, value: &[u8]) {
        self.push_tag(field, WIRE_LEN);
        self.push_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    /// Emit a nested message field. The inner writer is finished and its
    /// bytes carried as a length-prefixed blob.
    pub fn message_field(&mut self, field: u32, inner: WireWriter) {
        self.bytes_field(field, &inner.finish());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Encode a lone varint (used by tests and the codec round-trip law).
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.push_varint(value);
    w.finish()
}

/// Decode a lone varint from the start of `buf`.
pub fn decode_varint(buf: &[u8]) -> Result<u64, BridgeError> {
    WireReader::new(buf).read_varint()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_round_trip_small_values() {
        for v in [0u64, 1, 127, 128, 300, 16383, 16384] {
            assert_eq!(decode_varint(&encode_varint(v)).unwrap(), v);
        }
    }

    #[test]
    fn test_varint_round_trip_32_bit_range() {
        // Boundary values across the full [0, 2^32) range.
        for shift in 0..32 {
            let v = 1u64 << shift;
            assert_eq!(decode_varint(&encode_varint(v)).unwrap(), v);
            assert_eq!(decode_varint(&encode_varint(v - 1)).unwrap(), v - 1);
        }
        let max = u64::from(u32::MAX);
        assert_eq!(decode_varint(&encode_varint(max)).unwrap(), max);
    }

    #[test]
    fn test_varint_round_trip_beyond_five_bytes() {
        // Values needing more than 5 encoded bytes still round-trip.
        for v in [1u64 << 35, 1 << 42, 1 << 56, u64::MAX] {
            let encoded = encode_varint(v);
            assert!(encoded.len() > 5);
            assert_eq!(decode_varint(&encoded).unwrap(), v);
        }
    }

    #[test]
    fn test_varint_known_encoding() {
        // 300 = 0b10_0101100 -> AC 02 (LSB group first, continuation bit).
        assert_eq!(encode_varint(300), vec![0xac, 0x02]);
        assert_eq!(encode_varint(1), vec![0x01]);
    }

    #[test]
    fn test_varint_truncated_mid_value() {
        let err = decode_varint(&[0x80]).unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
        assert!(decode_varint(&[]).is_err());
    }

    #[test]
    fn test_length_delimited_truncation_is_framing_error() {
        // Claims 5 payload bytes but only carries 2.
        let mut w = WireWriter::new();
        w.push_varint(5);
        let mut buf = w.finish();
        buf.extend_from_slice(&[1, 2]);

        let mut r = WireReader::new(&buf);
        let err = r.read_length_delimited().unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
    }

    #[test]
    fn test_zero_length_payload_is_valid() {
        let mut w = WireWriter::new();
        w.bytes_field(4, &[]);
        let buf = w.finish();

        let mut r = WireReader::new(&buf);
        let (field, wt) = r.read_tag().unwrap();
        assert_eq!((field, wt), (4, WIRE_LEN));
        assert_eq!(r.read_length_delimited().unwrap(), &[] as &[u8]);
        assert!(r.is_at_end());
    }

    #[test]
    fn test_unknown_fields_are_skippable() {
        let mut w = WireWriter::new();
        w.varint_field(99, 7);
        w.string_field(100, "ignored");
        w.varint_field(3, 42);
        let buf = w.finish();

        let mut r = WireReader::new(&buf);
        let mut seen = None;
        while !r.is_at_end() {
            let (field, wt) = r.read_tag().unwrap();
            if field == 3 {
                seen = Some(r.read_varint().unwrap());
            } else {
                r.skip_value(wt).unwrap();
            }
        }
        assert_eq!(seen, Some(42));
    }

    #[test]
    fn test_fixed_width_fields_skip_by_width() {
        // Hand-built frame with fixed64 and fixed32 fields our schema does
        // not use; the reader must consume exactly their widths.
        let mut buf = encode_varint((1 << 3) | u64::from(WIRE_FIXED64));
        buf.extend_from_slice(&[0u8; 8]);
        buf.extend_from_slice(&encode_varint((2 << 3) | u64::from(WIRE_FIXED32)));
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&encode_varint((3 << 3) | u64::from(WIRE_VARINT)));
        buf.extend_from_slice(&encode_varint(9));

        let mut r = WireReader::new(&buf);
        let (f, wt) = r.read_tag().unwrap();
        assert_eq!(f, 1);
        r.skip_value(wt).unwrap();
        let (f, wt) = r.read_tag().unwrap();
        assert_eq!(f, 2);
        r.skip_value(wt).unwrap();
        let (f, _) = r.read_tag().unwrap();
        assert_eq!(f, 3);
        assert_eq!(r.read_varint().unwrap(), 9);
    }

    #[test]
    fn test_truncated_fixed_width_is_framing_error() {
        let mut buf = encode_varint((1 << 3) | u64::from(WIRE_FIXED64));
        buf.extend_from_slice(&[0u8; 3]);

        let mut r = WireReader::new(&buf);
        let (_, wt) = r.read_tag().unwrap();
        assert!(r.skip_value(wt).is_err());
    }

    #[test]
    fn test_nested_message_round_trip() {
        let mut inner = WireWriter::new();
        inner.string_field(1, "session-123");
        inner.int_field(2, -4);

        let mut outer = WireWriter::new();
        outer.varint_field(1, 150);
        outer.message_field(2, inner);
        let buf = outer.finish();

        let mut r = WireReader::new(&buf);
        let (f, _) = r.read_tag().unwrap();
        assert_eq!(f, 1);
        assert_eq!(r.read_varint().unwrap(), 150);

        let (f, wt) = r.read_tag().unwrap();
        assert_eq!((f, wt), (2, WIRE_LEN));
        let nested = r.read_length_delimited().unwrap();

        let mut nr = WireReader::new(nested);
        let (f, _) = nr.read_tag().unwrap();
        assert_eq!(f, 1);
        assert_eq!(nr.read_length_delimited().unwrap(), b"session-123");
        let (f, _) = nr.read_tag().unwrap();
        assert_eq!(f, 2);
        assert_eq!(nr.read_varint().unwrap() as i64, -4);
    }
}
