//! Wire constants and security limits for decoding.
//!
//! The constants describe fixed parts of the wire format. [`Limits`] holds
//! the configurable bounds applied to untrusted input; every bound is finite.

use serde::{Deserialize, Serialize};

// =============================================================================
// WIRE CONSTANTS
// =============================================================================

/// Maximum bytes in a 64-bit LEB128 varint.
pub const MAX_VARINT_BYTES: usize = 10;

/// Largest field number that fits in a key alongside the 3-bit wire type
/// without exceeding 32 bits.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Leading byte of an escaped (disambiguation + prefix) type identifier.
pub const ESCAPE_BYTE: u8 = 0x00;

/// Key terminating a nested struct: field number 0, wire type end-group.
pub const END_GROUP_KEY: u8 = 0x04;

/// Wrapper bit marking a bare (non-struct) interface payload: `0000_1XXX`.
pub const BARE_VALUE_FLAG: u8 = 0x08;

/// List header bit marking pointer elements that carry presence markers.
pub const NULLABLE_ELEMENTS_FLAG: u8 = 0x10;

/// Presence marker for a null pointer.
pub const POINTER_NULL: u8 = 0x00;

/// Presence marker for a present pointer.
pub const POINTER_PRESENT: u8 = 0x01;

/// Length of the disambiguation bytes.
pub const DISAMBIGUATION_LEN: usize = 3;

/// Length of the prefix bytes.
pub const PREFIX_LEN: usize = 4;

/// Earliest representable timestamp: 0001-01-01T00:00:00Z.
pub const MIN_TIMESTAMP_SECONDS: i64 = -62_135_596_800;

/// First unrepresentable timestamp: 10000-01-01T00:00:00Z.
pub const MAX_TIMESTAMP_SECONDS: i64 = 253_402_300_800;

/// Nanoseconds per second; timestamp nanos must stay below this.
pub const NANOS_PER_SECOND: u32 = 1_000_000_000;

// =============================================================================
// DEFAULT LIMITS
// =============================================================================

/// Default maximum size of a decoded buffer (64 MiB).
pub const DEFAULT_MAX_INPUT_SIZE: usize = 64 * 1024 * 1024;

/// Default maximum nesting of structs, lists, pointers and interfaces.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default maximum length of a single string or byte array (16 MiB).
pub const DEFAULT_MAX_BYTES_LEN: usize = 16 * 1024 * 1024;

/// Default maximum element count of a single list.
pub const DEFAULT_MAX_LIST_LEN: usize = 1 << 20;

/// Configurable bounds for encoding and decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum size of an input buffer accepted by the decoder.
    pub max_input_size: usize,
    /// Maximum nesting depth.
    pub max_depth: usize,
    /// Maximum length of a string or byte array.
    pub max_bytes_len: usize,
    /// Maximum element count of a list.
    pub max_list_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            max_bytes_len: DEFAULT_MAX_BYTES_LEN,
            max_list_len: DEFAULT_MAX_LIST_LEN,
        }
    }
}

impl Limits {
    /// Creates the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum input size.
    pub fn with_max_input_size(mut self, max: usize) -> Self {
        self.max_input_size = max;
        self
    }

    /// Sets the maximum nesting depth.
    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    /// Sets the maximum string/bytes length.
    pub fn with_max_bytes_len(mut self, max: usize) -> Self {
        self.max_bytes_len = max;
        self
    }

    /// Sets the maximum list element count.
    pub fn with_max_list_len(mut self, max: usize) -> Self {
        self.max_list_len = max;
        self
    }
}
