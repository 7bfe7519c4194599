//! Binary encoding/decoding.
//!
//! Values are written as a stream of field keys (`(number << 3) | wire_type`)
//! followed by payloads. Interface values carry a 4-byte type prefix, or the
//! escaped 8-byte form when the prefix is shared by several types.

pub mod decode;
pub mod encode;
pub mod primitives;

pub use decode::{
    decode, decode_interface, decode_interface_with_options, decode_with_options, DecodeOptions,
};
pub use encode::{
    encode, encode_interface, encode_interface_with_options, encode_with_options, EncodeOptions,
};
pub use primitives::{Reader, Writer, zigzag_decode, zigzag_encode};

use crate::error::{DecodeError, EncodeError};
use crate::model::{FieldType, InterfaceValue, Value};
use crate::registry::Registry;

impl Registry {
    /// Encodes `value` as a top-level value of type `ty`.
    pub fn encode(&self, ty: &FieldType, value: &Value) -> Result<Vec<u8>, EncodeError> {
        encode(self, ty, value)
    }

    /// Decodes a top-level value of type `ty`.
    pub fn decode(&self, ty: &FieldType, input: &[u8]) -> Result<Value, DecodeError> {
        decode(self, ty, input)
    }

    /// Encodes a value of a registered concrete type, prefixed with its identifier.
    pub fn encode_interface(&self, value: &InterfaceValue) -> Result<Vec<u8>, EncodeError> {
        encode_interface(self, value)
    }

    /// Decodes an identifier-prefixed value.
    pub fn decode_interface(&self, input: &[u8]) -> Result<InterfaceValue, DecodeError> {
        decode_interface(self, input)
    }
}
