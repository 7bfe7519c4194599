//! Primitive encoding/decoding.
//!
//! Implements varint, signed varint (zigzag), fixed-width integers,
//! length-prefixed bytes and strings, and timestamps.

use crate::error::DecodeError;
use crate::limits::MAX_VARINT_BYTES;
use crate::model::Timestamp;

/// Key of the timestamp seconds field: field 1, varint.
const TIME_SECONDS_KEY: u64 = 0x08;

/// Key of the timestamp nanos field: field 2, varint.
const TIME_NANOS_KEY: u64 = 0x10;

// =============================================================================
// DECODING
// =============================================================================

/// Reader for decoding binary data.
///
/// Wraps a byte slice and provides methods for reading primitives
/// with bounds checking and error handling.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of remaining bytes.
    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the next byte without consuming it.
    #[inline]
    pub fn peek_byte(&self, context: &'static str) -> Result<u8, DecodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof { context })
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let byte = self.peek_byte(context)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads exactly n bytes.
    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining_len() {
            return Err(DecodeError::UnexpectedEof { context });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Reads a fixed-size byte array.
    #[inline]
    pub fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(N, context)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads an unsigned varint (LEB128).
    #[inline]
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let mut result: u64 = 0;
        let mut shift = 0;

        for _ in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context)?;
            let value = (byte & 0x7F) as u64;

            // The tenth byte may only carry the top bit of a u64
            if shift == 63 && value > 1 {
                return Err(DecodeError::VarintOverflow);
            }

            result |= value << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }

        Err(DecodeError::VarintTooLong)
    }

    /// Reads a signed varint (zigzag encoded).
    pub fn read_signed_varint(&mut self, context: &'static str) -> Result<i64, DecodeError> {
        let unsigned = self.read_varint(context)?;
        Ok(zigzag_decode(unsigned))
    }

    /// Reads a little-endian u32.
    #[inline]
    pub fn read_fixed32(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a little-endian u64.
    #[inline]
    pub fn read_fixed64(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a varint length and checks it against `max_len` and the remaining input.
    pub fn read_length(&mut self, max_len: usize, field: &'static str) -> Result<usize, DecodeError> {
        let raw = self.read_varint(field)?;
        let len = usize::try_from(raw).unwrap_or(usize::MAX);
        if len > max_len {
            return Err(DecodeError::LimitExceeded {
                what: field,
                len,
                max: max_len,
            });
        }
        if len > self.remaining_len() {
            return Err(DecodeError::UnexpectedEof { context: field });
        }
        Ok(len)
    }

    /// Reads a length-prefixed byte slice without copying.
    pub fn read_bytes_prefixed(
        &mut self,
        max_len: usize,
        field: &'static str,
    ) -> Result<&'a [u8], DecodeError> {
        let len = self.read_length(max_len, field)?;
        self.read_bytes(len, field)
    }

    /// Reads a length-prefixed UTF-8 string.
    #[inline]
    pub fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        let bytes = self.read_bytes_prefixed(max_len, field)?;
        // Validate UTF-8 on borrowed slice, then allocate once
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    /// Reads a length-delimited timestamp.
    ///
    /// The payload holds field 1 (zigzag seconds) and field 2 (nanos), in
    /// that order, each omitted when zero.
    pub fn read_timestamp(&mut self, max_len: usize) -> Result<Timestamp, DecodeError> {
        let payload = self.read_bytes_prefixed(max_len, "time")?;
        let mut inner = Reader::new(payload);
        let mut ts = Timestamp::default();
        let mut last_key = 0u64;

        while !inner.is_empty() {
            let key = inner.read_varint("time field key")?;
            if key <= last_key {
                return Err(DecodeError::InvalidTime {
                    reason: "fields out of order",
                });
            }
            match key {
                TIME_SECONDS_KEY => ts.seconds = inner.read_signed_varint("time seconds")?,
                TIME_NANOS_KEY => {
                    let nanos = inner.read_varint("time nanos")?;
                    ts.nanos = u32::try_from(nanos).map_err(|_| DecodeError::InvalidTime {
                        reason: "nanos out of range",
                    })?;
                }
                _ => {
                    return Err(DecodeError::InvalidTime {
                        reason: "unexpected field",
                    });
                }
            }
            last_key = key;
        }

        ts.validate()
            .map_err(|reason| DecodeError::InvalidTime { reason })?;
        Ok(ts)
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for encoding binary data.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates a new writer with capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a reference to the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes an unsigned varint (LEB128).
    #[inline]
    pub fn write_varint(&mut self, mut value: u64) {
        // Use stack buffer to batch writes (faster than multiple push calls)
        let mut buf = [0u8; MAX_VARINT_BYTES];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.buf.extend_from_slice(&buf[..len]);
    }

    /// Writes a signed varint (zigzag encoded).
    pub fn write_signed_varint(&mut self, value: i64) {
        self.write_varint(zigzag_encode(value));
    }

    /// Writes a little-endian u32.
    pub fn write_fixed32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian u64.
    pub fn write_fixed64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes_prefixed(s.as_bytes());
    }

    /// Writes a length-prefixed byte array.
    pub fn write_bytes_prefixed(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a length-delimited timestamp. The caller validates the range.
    pub fn write_timestamp(&mut self, ts: &Timestamp) {
        let mut payload = Writer::with_capacity(16);
        if ts.seconds != 0 {
            payload.write_varint(TIME_SECONDS_KEY);
            payload.write_signed_varint(ts.seconds);
        }
        if ts.nanos != 0 {
            payload.write_varint(TIME_NANOS_KEY);
            payload.write_varint(ts.nanos as u64);
        }
        self.write_bytes_prefixed(payload.as_bytes());
    }
}

// =============================================================================
// ZIGZAG ENCODING
// =============================================================================

/// Encodes a signed integer using zigzag encoding.
///
/// Maps negative numbers to odd positive numbers:
/// 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, 2 -> 4, ...
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Decodes a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
