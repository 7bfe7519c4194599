//! Binary decoder.
//!
//! Mirrors the encoder. Decoding is driven by the expected [`FieldType`];
//! interface payloads are driven by the schema of the type their identifier
//! resolves to. Fields the schema does not know, or whose wire type differs
//! from the declared one, are skipped using the wire type alone.
//!
//! # Security
//!
//! Input size, nesting depth, string/bytes length and list length are all
//! bounded by [`Limits`]. Lengths are checked against the remaining input
//! before anything is allocated.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::codec::primitives::Reader;
use crate::error::DecodeError;
use crate::limits::{
    Limits, BARE_VALUE_FLAG, END_GROUP_KEY, ESCAPE_BYTE, MAX_FIELD_NUMBER,
    NULLABLE_ELEMENTS_FLAG, POINTER_NULL, POINTER_PRESENT,
};
use crate::model::{format_identifier, FieldType, InterfaceValue, StructSchema, Value, WireType};
use crate::registry::{ConcreteType, Registry};

/// Options for decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Permit `Float32`/`Float64` fields.
    pub allow_unsafe_floats: bool,
    /// Bounds applied to untrusted input.
    pub limits: Limits,
}

impl DecodeOptions {
    /// Creates default decoding options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables float fields.
    pub fn with_unsafe_floats(mut self) -> Self {
        self.allow_unsafe_floats = true;
        self
    }

    /// Replaces the limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// Decodes a top-level value of type `ty`.
///
/// The whole input must be consumed. A fresh value is returned only on success.
pub fn decode(registry: &Registry, ty: &FieldType, input: &[u8]) -> Result<Value, DecodeError> {
    decode_with_options(registry, ty, input, DecodeOptions::default())
}

/// Decodes a top-level value of type `ty` with the given options.
pub fn decode_with_options(
    registry: &Registry,
    ty: &FieldType,
    input: &[u8],
    options: DecodeOptions,
) -> Result<Value, DecodeError> {
    ty.check().map_err(|reason| DecodeError::InvalidSchema { reason })?;
    let mut decoder = Decoder::new(registry, input, options)?;
    let value = decoder.decode_value(ty, false)?;
    decoder.finish()?;
    Ok(value)
}

/// Decodes a top-level interface value.
pub fn decode_interface(registry: &Registry, input: &[u8]) -> Result<InterfaceValue, DecodeError> {
    decode_interface_with_options(registry, input, DecodeOptions::default())
}

/// Decodes a top-level interface value with the given options.
pub fn decode_interface_with_options(
    registry: &Registry,
    input: &[u8],
    options: DecodeOptions,
) -> Result<InterfaceValue, DecodeError> {
    let mut decoder = Decoder::new(registry, input, options)?;
    let value = decoder.decode_interface(false)?;
    decoder.finish()?;
    Ok(value)
}

struct Decoder<'r, 'a> {
    registry: &'r Registry,
    options: DecodeOptions,
    reader: Reader<'a>,
    depth: usize,
}

impl<'r, 'a> Decoder<'r, 'a> {
    fn new(registry: &'r Registry, input: &'a [u8], options: DecodeOptions) -> Result<Self, DecodeError> {
        if input.len() > options.limits.max_input_size {
            return Err(DecodeError::LimitExceeded {
                what: "input size",
                len: input.len(),
                max: options.limits.max_input_size,
            });
        }
        Ok(Self {
            registry,
            options,
            reader: Reader::new(input),
            depth: 0,
        })
    }

    fn finish(&self) -> Result<(), DecodeError> {
        if !self.reader.is_empty() {
            return Err(DecodeError::TrailingBytes {
                remaining: self.reader.remaining_len(),
            });
        }
        Ok(())
    }

    fn descend(&mut self) -> Result<(), DecodeError> {
        self.depth += 1;
        if self.depth > self.options.limits.max_depth {
            return Err(DecodeError::LimitExceeded {
                what: "depth",
                len: self.depth,
                max: self.options.limits.max_depth,
            });
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// Decodes one value. `nested` is false only for the outermost value, whose
    /// struct form runs to the end of the input.
    fn decode_value(&mut self, ty: &FieldType, nested: bool) -> Result<Value, DecodeError> {
        let value = match ty {
            FieldType::Bool => match self.reader.read_varint("bool")? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                value => return Err(DecodeError::InvalidBool { value }),
            },
            FieldType::Uvarint => Value::Uint(self.reader.read_varint("uvarint")?),
            FieldType::Varint => Value::Int(self.reader.read_signed_varint("varint")?),
            FieldType::Fixed32 => Value::Uint(self.reader.read_fixed32("fixed32")? as u64),
            FieldType::Fixed64 => Value::Uint(self.reader.read_fixed64("fixed64")?),
            FieldType::Float32 => {
                self.check_float()?;
                Value::Float32(f32::from_bits(self.reader.read_fixed32("float32")?))
            }
            FieldType::Float64 => {
                self.check_float()?;
                Value::Float64(f64::from_bits(self.reader.read_fixed64("float64")?))
            }
            FieldType::Bytes => {
                let max = self.options.limits.max_bytes_len;
                Value::Bytes(self.reader.read_bytes_prefixed(max, "bytes")?.to_vec())
            }
            FieldType::String => {
                let max = self.options.limits.max_bytes_len;
                Value::String(self.reader.read_string(max, "string")?)
            }
            FieldType::Time => {
                let max = self.options.limits.max_bytes_len;
                Value::Time(self.reader.read_timestamp(max)?)
            }
            FieldType::Struct(schema) => self.decode_struct(schema, nested)?,
            FieldType::Named(name) => {
                let registry = self.registry;
                let schema = registry
                    .concrete(name)
                    .and_then(ConcreteType::struct_schema)
                    .ok_or_else(|| {
                        DecodeError::mismatch(format!("{} is not a registered struct type", name))
                    })?;
                self.decode_struct(schema, nested)?
            }
            FieldType::Pointer(inner) => {
                self.descend()?;
                let marker = self.reader.read_byte("pointer marker")?;
                let value = match marker {
                    POINTER_NULL => Value::Pointer(None),
                    POINTER_PRESENT => Value::some(self.decode_value(inner, true)?),
                    marker => return Err(DecodeError::MalformedPointer { marker }),
                };
                self.ascend();
                value
            }
            FieldType::List(element) => self.decode_list(element)?,
            FieldType::Interface(_) => {
                Value::Interface(Some(Box::new(self.decode_interface(nested)?)))
            }
        };
        Ok(value)
    }

    fn check_float(&self) -> Result<(), DecodeError> {
        if self.options.allow_unsafe_floats {
            Ok(())
        } else {
            Err(DecodeError::UnsafeFloat)
        }
    }

    /// Reads a field key, returning `None` for the end-group key.
    fn read_key(&mut self) -> Result<Option<(u32, WireType)>, DecodeError> {
        let key = self.reader.read_varint("field key")?;
        if key == END_GROUP_KEY as u64 {
            return Ok(None);
        }
        let number = key >> 3;
        if number == 0 || number > MAX_FIELD_NUMBER as u64 {
            return Err(DecodeError::mismatch(format!("invalid field key {:#x}", key)));
        }
        // 3 bits always map to a wire type
        let wire = WireType::from_u8((key & 0x07) as u8)
            .ok_or_else(|| DecodeError::mismatch("invalid wire type"))?;
        Ok(Some((number as u32, wire)))
    }

    fn decode_struct(&mut self, schema: &StructSchema, terminated: bool) -> Result<Value, DecodeError> {
        self.descend()?;
        let mut fields: Vec<Option<Value>> = vec![None; schema.fields.len()];

        loop {
            if !terminated && self.reader.is_empty() {
                break;
            }
            let Some((number, wire)) = self.read_key()? else {
                if terminated {
                    break;
                }
                return Err(DecodeError::mismatch("end-group outside a nested struct"));
            };

            match schema.index_of(number) {
                Some(i) if schema.fields[i].ty.wire_type() == wire => {
                    let value = match &schema.fields[i].ty {
                        FieldType::Pointer(inner) => Value::some(self.decode_value(inner, true)?),
                        ty => self.decode_value(ty, true)?,
                    };
                    fields[i] = Some(value);
                }
                known => {
                    trace!(
                        number,
                        wire = wire as u8,
                        known = known.is_some(),
                        "skipping field"
                    );
                    self.skip_value(wire)?;
                }
            }
        }

        let registry = self.registry;
        let values = fields
            .into_iter()
            .zip(&schema.fields)
            .map(|(value, field)| value.unwrap_or_else(|| registry.zero_value(&field.ty)))
            .collect();
        self.ascend();
        Ok(Value::Struct(values))
    }

    fn read_list_count(&mut self) -> Result<usize, DecodeError> {
        let raw = self.reader.read_varint("list count")?;
        let count = usize::try_from(raw).unwrap_or(usize::MAX);
        let max = self.options.limits.max_list_len;
        if count > max {
            return Err(DecodeError::LimitExceeded {
                what: "list length",
                len: count,
                max,
            });
        }
        Ok(count)
    }

    fn decode_list(&mut self, element: &FieldType) -> Result<Value, DecodeError> {
        self.descend()?;
        let header = self.reader.read_byte("list element type")?;
        let expected = element.list_header();
        if header != expected {
            return Err(DecodeError::mismatch(format!(
                "list element tag {:#04x}, expected {:#04x}",
                header, expected
            )));
        }
        let count = self.read_list_count()?;
        // Every element occupies at least one byte
        let mut items = Vec::with_capacity(count.min(self.reader.remaining_len()));
        for _ in 0..count {
            items.push(self.decode_value(element, true)?);
        }
        self.ascend();
        Ok(Value::List(items))
    }

    /// Reads a type identifier and resolves it to a registered type.
    fn read_type(&mut self) -> Result<&'r ConcreteType, DecodeError> {
        let registry = self.registry;
        if self.reader.peek_byte("type identifier")? == ESCAPE_BYTE {
            self.reader.read_byte("type identifier")?;
            let disambiguation = self.reader.read_array("disambiguation bytes")?;
            let prefix = self.reader.read_array("prefix bytes")?;
            return registry
                .lookup_by_long(&disambiguation, &prefix)
                .ok_or_else(|| {
                    let mut identifier = disambiguation.to_vec();
                    identifier.extend_from_slice(&prefix);
                    DecodeError::UnknownType {
                        identifier: format_identifier(&identifier),
                    }
                });
        }

        let prefix = self.reader.read_array("prefix bytes")?;
        match registry.lookup_by_short(&prefix) {
            Some(c) if c.requires_full() => Err(DecodeError::AmbiguousPrefix {
                prefix: format_identifier(&prefix),
            }),
            Some(c) => Ok(c),
            None => Err(DecodeError::UnknownType {
                identifier: format_identifier(&prefix),
            }),
        }
    }

    fn decode_interface(&mut self, nested: bool) -> Result<InterfaceValue, DecodeError> {
        self.descend()?;
        let concrete = self.read_type()?;
        let value = self.decode_payload(concrete, nested)?;
        let value = if concrete.pointer_preferred() {
            Value::some(value)
        } else {
            value
        };
        self.ascend();
        Ok(InterfaceValue {
            type_name: concrete.name().to_string(),
            value,
        })
    }

    /// Decodes an interface payload.
    ///
    /// The wrapper byte `0000_1XXX` has the bit pattern of a key for field 1,
    /// so the resolved type decides whether a wrapper is expected.
    fn decode_payload(&mut self, concrete: &'r ConcreteType, nested: bool) -> Result<Value, DecodeError> {
        if concrete.is_struct() {
            return self.decode_value(concrete.schema(), nested);
        }
        let wrapper = self.reader.read_byte("bare value wrapper")?;
        let expected = BARE_VALUE_FLAG | concrete.wire_type() as u8;
        if wrapper != expected {
            return Err(DecodeError::mismatch(format!(
                "{} expects wrapper {:#04x}, found {:#04x}",
                concrete.name(),
                expected,
                wrapper
            )));
        }
        self.decode_value(concrete.schema(), true)
    }

    // =========================================================================
    // Skipping
    // =========================================================================

    /// Skips one value framed by `wire`, without a schema.
    ///
    /// Interface values are the exception: their payload framing depends on the
    /// resolved type, so an unknown field holding a type this registry does not
    /// know fails with `UnknownType` instead of being skipped. Readers that must
    /// tolerate newer writers need every type those writers may embed registered.
    fn skip_value(&mut self, wire: WireType) -> Result<(), DecodeError> {
        match wire {
            WireType::Varint => {
                self.reader.read_varint("skipped varint")?;
            }
            WireType::Fixed64 => {
                self.reader.read_bytes(8, "skipped fixed64")?;
            }
            WireType::Fixed32 => {
                self.reader.read_bytes(4, "skipped fixed32")?;
            }
            WireType::LengthDelimited => {
                let max = self.options.limits.max_bytes_len;
                self.reader.read_bytes_prefixed(max, "skipped bytes")?;
            }
            WireType::StartStruct => self.skip_struct()?,
            WireType::List => self.skip_list()?,
            WireType::Interface => {
                self.descend()?;
                let concrete = self.read_type()?;
                self.decode_payload(concrete, true)?;
                self.ascend();
            }
            WireType::EndGroup => {
                return Err(DecodeError::mismatch("end-group cannot be skipped"));
            }
        }
        Ok(())
    }

    fn skip_struct(&mut self) -> Result<(), DecodeError> {
        self.descend()?;
        while let Some((_, wire)) = self.read_key()? {
            self.skip_value(wire)?;
        }
        self.ascend();
        Ok(())
    }

    fn skip_list(&mut self) -> Result<(), DecodeError> {
        self.descend()?;
        let header = self.reader.read_byte("list element type")?;
        if header & !(NULLABLE_ELEMENTS_FLAG | 0x07) != 0 {
            return Err(DecodeError::mismatch(format!("invalid list header {:#04x}", header)));
        }
        let nullable = header & NULLABLE_ELEMENTS_FLAG != 0;
        let wire = WireType::from_u8(header & 0x07)
            .ok_or_else(|| DecodeError::mismatch("invalid wire type"))?;
        let count = self.read_list_count()?;
        for _ in 0..count {
            if nullable {
                match self.reader.read_byte("pointer marker")? {
                    POINTER_NULL => continue,
                    POINTER_PRESENT => {}
                    marker => return Err(DecodeError::MalformedPointer { marker }),
                }
            }
            self.skip_value(wire)?;
        }
        self.ascend();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode::{encode, encode_with_options, EncodeOptions};
    use crate::error::ErrorKind;
    use crate::registry::RegistryBuilder;

    fn empty_registry() -> Registry {
        RegistryBuilder::new().build().unwrap()
    }

    fn one_field() -> FieldType {
        FieldType::Struct(StructSchema::new().field(1, "n", FieldType::Uvarint))
    }

    #[test]
    fn test_decode_varint_field() {
        let value = decode(&empty_registry(), &one_field(), &[0x08, 0xAC, 0x02]).unwrap();
        assert_eq!(value, Value::Struct(vec![Value::Uint(300)]));
    }

    #[test]
    fn test_missing_field_is_zero() {
        let schema = FieldType::Struct(
            StructSchema::new()
                .field(1, "a", FieldType::Uvarint)
                .field(2, "b", FieldType::String)
                .field(3, "c", FieldType::pointer(FieldType::Bool)),
        );
        let value = decode(&empty_registry(), &schema, &[]).unwrap();
        assert_eq!(
            value,
            Value::Struct(vec![Value::Uint(0), Value::String(String::new()), Value::Pointer(None)])
        );
    }

    #[test]
    fn test_unknown_fixed32_field_skipped() {
        // field 1 varint = 5, field 9 fixed32 = 4 raw bytes
        let input = [0x08, 0x05, 0x4D, 0xDE, 0xAD, 0xBE, 0xEF];
        let value = decode(&empty_registry(), &one_field(), &input).unwrap();
        assert_eq!(value, Value::Struct(vec![Value::Uint(5)]));
    }

    #[test]
    fn test_unknown_nested_fields_skipped() {
        let input = [
            0x12, 0x02, 0x08, b'x', // field 2, length-delimited
            0x1B, 0x08, 0x01, 0x11, 1, 2, 3, 4, 5, 6, 7, 8, 0x04, // field 3, struct
            0x26, 0x10, 0x02, 0x01, 0x07, 0x00, // field 4, list of pointers
            0x08, 0x2A, // field 1
        ];
        let value = decode(&empty_registry(), &one_field(), &input).unwrap();
        assert_eq!(value, Value::Struct(vec![Value::Uint(42)]));
    }

    #[test]
    fn test_mismatched_wire_type_skipped() {
        // field 1 arrives as fixed32 while the schema says uvarint
        let input = [0x0D, 1, 0, 0, 0];
        let value = decode(&empty_registry(), &one_field(), &input).unwrap();
        assert_eq!(value, Value::Struct(vec![Value::Uint(0)]));
    }

    #[test]
    fn test_stray_end_group_rejected() {
        let result = decode(&empty_registry(), &one_field(), &[0x04]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::SchemaMismatch);

        // end-group as the wire type of a real field
        let result = decode(&empty_registry(), &one_field(), &[0x4C]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_truncated_varint() {
        let result = decode(&empty_registry(), &one_field(), &[0x08, 0xAC]);
        assert!(matches!(result, Err(DecodeError::UnexpectedEof { .. })));

        let result = decode(&empty_registry(), &FieldType::Uvarint, &[0xAC]);
        assert!(matches!(result, Err(DecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_unterminated_nested_struct() {
        let schema = FieldType::Struct(
            StructSchema::new().field(1, "inner", one_field()),
        );
        let result = decode(&empty_registry(), &schema, &[0x0B, 0x08, 0x01]);
        assert!(matches!(result, Err(DecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_pointer_markers() {
        let registry = empty_registry();
        let ty = FieldType::pointer(FieldType::Uvarint);
        assert_eq!(decode(&registry, &ty, &[0x00]).unwrap(), Value::Pointer(None));
        assert_eq!(decode(&registry, &ty, &[0x01, 0x07]).unwrap(), Value::some(Value::Uint(7)));
        assert!(matches!(
            decode(&registry, &ty, &[0x02, 0x07]),
            Err(DecodeError::MalformedPointer { marker: 0x02 })
        ));
    }

    #[test]
    fn test_list_header_mismatch() {
        let ty = FieldType::list(FieldType::Uvarint);
        let result = decode(&empty_registry(), &ty, &[0x02, 0x00]);
        assert!(matches!(result, Err(DecodeError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_list_length_limit() {
        let ty = FieldType::list(FieldType::Uvarint);
        let options = DecodeOptions::new().with_limits(Limits::new().with_max_list_len(2));
        let result = decode_with_options(&empty_registry(), &ty, &[0x00, 0x03, 1, 2, 3], options);
        assert!(matches!(result, Err(DecodeError::LimitExceeded { what: "list length", .. })));
    }

    #[test]
    fn test_huge_list_count_fails_without_allocating() {
        let ty = FieldType::list(FieldType::Uvarint);
        let options = DecodeOptions::new().with_limits(Limits::new().with_max_list_len(usize::MAX));
        let input = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        let result = decode_with_options(&empty_registry(), &ty, &input, options);
        assert!(matches!(result, Err(DecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_input_size_limit() {
        let options = DecodeOptions::new().with_limits(Limits::new().with_max_input_size(2));
        let result = decode_with_options(&empty_registry(), &one_field(), &[0x08, 0xAC, 0x02], options);
        assert!(matches!(result, Err(DecodeError::LimitExceeded { what: "input size", .. })));
    }

    #[test]
    fn test_depth_limit_on_skipped_structs() {
        // 100 nested unknown struct fields
        let mut input = Vec::new();
        for _ in 0..100 {
            input.push(0x13); // field 2, start-struct
        }
        for _ in 0..100 {
            input.push(0x04);
        }
        let result = decode(&empty_registry(), &one_field(), &input);
        assert!(matches!(result, Err(DecodeError::LimitExceeded { what: "depth", .. })));
    }

    #[test]
    fn test_trailing_bytes() {
        let result = decode(&empty_registry(), &FieldType::Uvarint, &[0x01, 0x02]);
        assert!(matches!(result, Err(DecodeError::TrailingBytes { remaining: 1 })));
    }

    #[test]
    fn test_invalid_bool() {
        let result = decode(&empty_registry(), &FieldType::Bool, &[0x02]);
        assert!(matches!(result, Err(DecodeError::InvalidBool { value: 2 })));
    }

    #[test]
    fn test_floats_require_opt_in() {
        let bytes = 2.5f32.to_bits().to_le_bytes();
        let result = decode(&empty_registry(), &FieldType::Float32, &bytes);
        assert!(matches!(result, Err(DecodeError::UnsafeFloat)));

        let options = DecodeOptions::new().with_unsafe_floats();
        let value = decode_with_options(&empty_registry(), &FieldType::Float32, &bytes, options).unwrap();
        assert_eq!(value, Value::Float32(2.5));
    }

    fn shape_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder.register_interface("shape").unwrap();
        builder
            .register_concrete(
                "circle",
                StructSchema::new().field(1, "radius", FieldType::Uvarint),
                false,
            )
            .unwrap();
        builder.register_concrete("label", FieldType::String, true).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_interface_struct_payload() {
        let registry = shape_registry();
        let mut input = registry.concrete("circle").unwrap().prefix().to_vec();
        input.extend_from_slice(&[0x08, 0x03]);
        let iv = decode_interface(&registry, &input).unwrap();
        assert_eq!(iv.type_name, "circle");
        assert_eq!(iv.value, Value::Struct(vec![Value::Uint(3)]));
    }

    #[test]
    fn test_interface_bare_pointer_preferred() {
        let registry = shape_registry();
        let mut input = registry.concrete("label").unwrap().prefix().to_vec();
        input.extend_from_slice(&[0x0A, 0x02, b'h', b'i']);
        let iv = decode_interface(&registry, &input).unwrap();
        assert_eq!(iv.value, Value::some(Value::String("hi".into())));
    }

    #[test]
    fn test_interface_wrong_wrapper() {
        let registry = shape_registry();
        let mut input = registry.concrete("label").unwrap().prefix().to_vec();
        input.extend_from_slice(&[0x08, 0x02]);
        let result = decode_interface(&registry, &input);
        assert!(matches!(result, Err(DecodeError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_unknown_type() {
        let registry = shape_registry();
        let result = decode_interface(&registry, &[0xFF, 0xFF, 0xFF, 0xFF, 0x08, 0x01]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownType);

        let result = decode_interface(&registry, &[0x00, 1, 2, 3, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownType);
    }

    #[test]
    fn test_truncated_identifier() {
        let registry = shape_registry();
        let prefix = registry.concrete("circle").unwrap().prefix();
        let result = decode_interface(&registry, &prefix[..3]);
        assert!(matches!(result, Err(DecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_ambiguous_short_prefix_rejected() {
        let prefix = [0x5A, 0x5A, 0x5A, 0x5A];
        let schema: FieldType = StructSchema::new().field(1, "v", FieldType::Uvarint).into();
        let mut builder = RegistryBuilder::new();
        builder
            .insert_concrete("a", [1, 1, 1], prefix, schema.clone(), false)
            .unwrap();
        builder
            .insert_concrete("b", [2, 2, 2], prefix, schema, false)
            .unwrap();
        let registry = builder.build().unwrap();

        let mut short = prefix.to_vec();
        short.extend_from_slice(&[0x08, 0x01]);
        let result = decode_interface(&registry, &short);
        assert!(matches!(result, Err(DecodeError::AmbiguousPrefix { .. })));

        let mut long = vec![0x00, 2, 2, 2];
        long.extend_from_slice(&short);
        let iv = decode_interface(&registry, &long).unwrap();
        assert_eq!(iv.type_name, "b");
    }

    #[test]
    fn test_skip_unknown_interface_field() {
        let registry = shape_registry();
        let mut input = vec![0x17]; // field 2, interface
        input.extend_from_slice(&registry.concrete("circle").unwrap().prefix());
        input.extend_from_slice(&[0x08, 0x09, 0x04]);
        input.extend_from_slice(&[0x08, 0x01]);
        let value = decode(&registry, &one_field(), &input).unwrap();
        assert_eq!(value, Value::Struct(vec![Value::Uint(1)]));
    }

    #[test]
    fn test_roundtrip_nested_interfaces() {
        let registry = shape_registry();
        let schema = FieldType::Struct(
            StructSchema::new()
                .field(1, "shapes", FieldType::list(FieldType::interface("shape")))
                .field(2, "main", FieldType::interface("shape")),
        );
        let value = Value::Struct(vec![
            Value::List(vec![
                Value::interface("circle", Value::Struct(vec![Value::Uint(2)])),
                Value::interface("label", Value::some(Value::String("x".into()))),
                Value::interface("circle", Value::Struct(vec![Value::Uint(0)])),
            ]),
            Value::interface("circle", Value::Struct(vec![Value::Uint(7)])),
        ]);
        let bytes = encode(&registry, &schema, &value).unwrap();
        assert_eq!(decode(&registry, &schema, &bytes).unwrap(), value);
    }

    #[test]
    fn test_invalid_inline_schema_rejected() {
        let registry = empty_registry();
        let unsorted = FieldType::Struct(
            StructSchema::new()
                .field(3, "a", FieldType::Uvarint)
                .field(1, "b", FieldType::Uvarint)
                .field(2, "c", FieldType::Uvarint),
        );
        let result = decode(&registry, &unsorted, &[0x08, 0x01, 0x18, 0x03]);
        assert!(matches!(result, Err(DecodeError::InvalidSchema { .. })));

        let zero = FieldType::Struct(StructSchema::new().field(0, "a", FieldType::Uvarint));
        let result = decode(&registry, &zero, &[]);
        assert!(matches!(result, Err(DecodeError::InvalidSchema { .. })));

        let double = FieldType::pointer(FieldType::pointer(FieldType::Uvarint));
        let result = decode(&registry, &double, &[0x00]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_negative_zero_float_roundtrip() {
        let registry = empty_registry();
        let ty = FieldType::Struct(StructSchema::new().field(1, "x", FieldType::Float64));
        let value = Value::Struct(vec![Value::Float64(-0.0)]);
        let bytes = encode_with_options(&registry, &ty, &value, EncodeOptions::new().with_unsafe_floats())
            .unwrap();
        let options = DecodeOptions::new().with_unsafe_floats();
        match decode_with_options(&registry, &ty, &bytes, options).unwrap() {
            Value::Struct(fields) => match fields[0] {
                Value::Float64(v) => assert!(v == 0.0 && v.is_sign_negative()),
                ref other => panic!("unexpected field {:?}", other),
            },
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_skip_interface_of_unknown_type_fails() {
        let registry = shape_registry();
        let mut input = vec![0x17]; // field 2, interface
        input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        input.extend_from_slice(&[0x08, 0x09, 0x04]);
        input.extend_from_slice(&[0x08, 0x01]);
        let err = decode(&registry, &one_field(), &input).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownType { .. }));
    }
}
