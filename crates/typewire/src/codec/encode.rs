//! Binary encoder.
//!
//! Walks a [`Value`] tree alongside its [`FieldType`] and writes the wire
//! format:
//!
//! - struct fields as `varint((number << 3) | wire_type)` + value, zero values omitted
//! - nested structs terminated by the end-group key `0x04`
//! - pointers as `[0x00]` or `[0x01][pointee]` outside struct fields
//! - lists as `[element_tag][count][elements...]`
//! - interfaces as `[prefix4]` or `[0x00][disamb3][prefix4]`, then the payload

use serde::{Deserialize, Serialize};

use crate::codec::primitives::Writer;
use crate::error::EncodeError;
use crate::limits::{
    Limits, BARE_VALUE_FLAG, END_GROUP_KEY, POINTER_NULL, POINTER_PRESENT,
};
use crate::model::{FieldType, InterfaceValue, StructSchema, Value};
use crate::registry::{ConcreteType, Registry};

/// Options for encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Permit `Float32`/`Float64` fields.
    ///
    /// Float encodings are not canonical across platforms, so they are
    /// rejected unless explicitly enabled.
    pub allow_unsafe_floats: bool,
    /// Bounds on nesting and lengths.
    pub limits: Limits,
}

impl EncodeOptions {
    /// Creates default encoding options.
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

/// Encodes `value` as a top-level value of type `ty`.
///
/// A top-level struct is written without a terminator; it ends with the buffer.
pub fn encode(registry: &Registry, ty: &FieldType, value: &Value) -> Result<Vec<u8>, EncodeError> {
    encode_with_options(registry, ty, value, EncodeOptions::default())
}

/// Encodes `value` as a top-level value of type `ty` with the given options.
pub fn encode_with_options(
    registry: &Registry,
    ty: &FieldType,
    value: &Value,
    options: EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    ty.check().map_err(|reason| EncodeError::InvalidSchema { reason })?;
    let mut encoder = Encoder::new(registry, options);
    encoder.encode_value(ty, value, false)?;
    Ok(encoder.writer.into_bytes())
}

/// Encodes a top-level interface value: type identifier followed by the payload.
pub fn encode_interface(registry: &Registry, value: &InterfaceValue) -> Result<Vec<u8>, EncodeError> {
    encode_interface_with_options(registry, value, EncodeOptions::default())
}

/// Encodes a top-level interface value with the given options.
pub fn encode_interface_with_options(
    registry: &Registry,
    value: &InterfaceValue,
    options: EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::new(registry, options);
    encoder.encode_interface(value, false)?;
    Ok(encoder.writer.into_bytes())
}

struct Encoder<'r> {
    registry: &'r Registry,
    options: EncodeOptions,
    writer: Writer,
    depth: usize,
}

impl<'r> Encoder<'r> {
    fn new(registry: &'r Registry, options: EncodeOptions) -> Self {
        Self {
            registry,
            options,
            writer: Writer::with_capacity(64),
            depth: 0,
        }
    }

    fn descend(&mut self) -> Result<(), EncodeError> {
        self.depth += 1;
        if self.depth > self.options.limits.max_depth {
            return Err(EncodeError::LimitExceeded {
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

    fn check_len(&self, what: &'static str, len: usize, max: usize) -> Result<(), EncodeError> {
        if len > max {
            return Err(EncodeError::LimitExceeded { what, len, max });
        }
        Ok(())
    }

    /// Encodes one value. `nested` is false only for the outermost value, whose
    /// struct form runs to the end of the buffer.
    fn encode_value(&mut self, ty: &FieldType, value: &Value, nested: bool) -> Result<(), EncodeError> {
        match (ty, value) {
            (FieldType::Bool, Value::Bool(b)) => self.writer.write_varint(*b as u64),
            (FieldType::Uvarint, Value::Uint(v)) => self.writer.write_varint(*v),
            (FieldType::Varint, Value::Int(v)) => self.writer.write_signed_varint(*v),
            (FieldType::Fixed32, Value::Uint(v)) => {
                let v = u32::try_from(*v).map_err(|_| EncodeError::SchemaMismatch {
                    expected: "fixed32 value within u32".to_string(),
                    found: "uint",
                })?;
                self.writer.write_fixed32(v);
            }
            (FieldType::Fixed64, Value::Uint(v)) => self.writer.write_fixed64(*v),
            (FieldType::Float32, Value::Float32(v)) => {
                self.check_float(v.is_nan())?;
                self.writer.write_fixed32(v.to_bits());
            }
            (FieldType::Float64, Value::Float64(v)) => {
                self.check_float(v.is_nan())?;
                self.writer.write_fixed64(v.to_bits());
            }
            (FieldType::Bytes, Value::Bytes(b)) => {
                self.check_len("bytes length", b.len(), self.options.limits.max_bytes_len)?;
                self.writer.write_bytes_prefixed(b);
            }
            (FieldType::String, Value::String(s)) => {
                self.check_len("string length", s.len(), self.options.limits.max_bytes_len)?;
                self.writer.write_string(s);
            }
            (FieldType::Time, Value::Time(ts)) => {
                ts.validate()
                    .map_err(|reason| EncodeError::InvalidTime { reason })?;
                self.writer.write_timestamp(ts);
            }
            (FieldType::Struct(schema), Value::Struct(fields)) => {
                self.encode_struct(schema, fields, nested)?;
            }
            (FieldType::Named(name), Value::Struct(fields)) => {
                let registry = self.registry;
                let concrete = resolve(registry, name)?;
                let schema = concrete.struct_schema().ok_or_else(|| mismatch(ty, value))?;
                self.encode_struct(schema, fields, nested)?;
            }
            (FieldType::Pointer(inner), Value::Pointer(pointee)) => {
                self.descend()?;
                match pointee {
                    None => self.writer.write_byte(POINTER_NULL),
                    Some(p) => {
                        self.writer.write_byte(POINTER_PRESENT);
                        self.encode_value(inner, p, true)?;
                    }
                }
                self.ascend();
            }
            (FieldType::List(element), Value::List(items)) => {
                self.encode_list(element, items)?;
            }
            (FieldType::Interface(_), Value::Interface(iface)) => match iface {
                Some(iv) => self.encode_interface(iv, nested)?,
                None => return Err(EncodeError::NilInterfaceElement),
            },
            _ => return Err(mismatch(ty, value)),
        }
        Ok(())
    }

    fn check_float(&self, is_nan: bool) -> Result<(), EncodeError> {
        if !self.options.allow_unsafe_floats {
            return Err(EncodeError::UnsafeFloat);
        }
        if is_nan {
            return Err(EncodeError::FloatIsNan);
        }
        Ok(())
    }

    fn encode_struct(
        &mut self,
        schema: &StructSchema,
        fields: &[Value],
        terminated: bool,
    ) -> Result<(), EncodeError> {
        if fields.len() != schema.fields.len() {
            return Err(EncodeError::SchemaMismatch {
                expected: format!("struct with {} fields", schema.fields.len()),
                found: "struct with a different field count",
            });
        }
        self.descend()?;
        for (field, value) in schema.fields.iter().zip(fields) {
            if value.is_zero() {
                continue;
            }
            self.writer
                .write_varint(field.ty.wire_type().key(field.number));
            match (&field.ty, value) {
                // A present pointer field carries no presence marker
                (FieldType::Pointer(inner), Value::Pointer(Some(pointee))) => {
                    self.encode_value(inner, pointee, true)?;
                }
                _ => self.encode_value(&field.ty, value, true)?,
            }
        }
        if terminated {
            self.writer.write_byte(END_GROUP_KEY);
        }
        self.ascend();
        Ok(())
    }

    fn encode_list(&mut self, element: &FieldType, items: &[Value]) -> Result<(), EncodeError> {
        self.check_len("list length", items.len(), self.options.limits.max_list_len)?;
        self.descend()?;
        self.writer.write_byte(element.list_header());
        self.writer.write_varint(items.len() as u64);
        for item in items {
            self.encode_value(element, item, true)?;
        }
        self.ascend();
        Ok(())
    }

    fn encode_interface(&mut self, iv: &InterfaceValue, nested: bool) -> Result<(), EncodeError> {
        let registry = self.registry;
        let concrete = resolve(registry, &iv.type_name)?;
        self.descend()?;
        self.writer.write_bytes(&concrete.identifier_bytes());

        // Pointer-preferred values may arrive wrapped; the wire holds the pointee
        let value = match &iv.value {
            Value::Pointer(Some(pointee)) => pointee.as_ref(),
            Value::Pointer(None) => return Err(EncodeError::NilInterfaceElement),
            other => other,
        };

        if concrete.is_struct() {
            self.encode_value(concrete.schema(), value, nested)?;
        } else {
            self.writer
                .write_byte(BARE_VALUE_FLAG | concrete.wire_type() as u8);
            self.encode_value(concrete.schema(), value, true)?;
        }
        self.ascend();
        Ok(())
    }
}

fn resolve<'r>(registry: &'r Registry, name: &str) -> Result<&'r ConcreteType, EncodeError> {
    registry
        .concrete(name)
        .ok_or_else(|| EncodeError::UnregisteredType {
            name: name.to_string(),
        })
}

fn mismatch(ty: &FieldType, value: &Value) -> EncodeError {
    EncodeError::SchemaMismatch {
        expected: ty.to_string(),
        found: value.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;

    fn empty_registry() -> Registry {
        RegistryBuilder::new().build().unwrap()
    }

    #[test]
    fn test_varint_field_300() {
        let schema = FieldType::Struct(StructSchema::new().field(1, "n", FieldType::Uvarint));
        let bytes = encode(&empty_registry(), &schema, &Value::Struct(vec![Value::Uint(300)])).unwrap();
        assert_eq!(bytes, vec![0x08, 0xAC, 0x02]);
    }

    #[test]
    fn test_list_of_uvarints() {
        let ty = FieldType::list(FieldType::Uvarint);
        let value = Value::List(vec![Value::Uint(5), Value::Uint(300)]);
        let bytes = encode(&empty_registry(), &ty, &value).unwrap();
        assert_eq!(bytes, vec![0x00, 0x02, 0x05, 0xAC, 0x02]);
    }

    #[test]
    fn test_pointer_markers() {
        let registry = empty_registry();
        let ty = FieldType::pointer(FieldType::Uvarint);
        assert_eq!(encode(&registry, &ty, &Value::Pointer(None)).unwrap(), vec![0x00]);
        assert_eq!(
            encode(&registry, &ty, &Value::some(Value::Uint(7))).unwrap(),
            vec![0x01, 0x07]
        );
    }

    #[test]
    fn test_zero_fields_omitted() {
        let schema = FieldType::Struct(
            StructSchema::new()
                .field(1, "a", FieldType::Uvarint)
                .field(2, "b", FieldType::String)
                .field(3, "c", FieldType::pointer(FieldType::Uvarint))
                .field(4, "d", FieldType::list(FieldType::Bool)),
        );
        let value = Value::Struct(vec![
            Value::Uint(0),
            Value::String("hi".into()),
            Value::Pointer(None),
            Value::List(vec![]),
        ]);
        let bytes = encode(&empty_registry(), &schema, &value).unwrap();
        assert_eq!(bytes, vec![0x12, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_pointer_field_has_no_marker() {
        let schema = FieldType::Struct(
            StructSchema::new().field(1, "p", FieldType::pointer(FieldType::Uvarint)),
        );
        let value = Value::Struct(vec![Value::some(Value::Uint(0))]);
        let bytes = encode(&empty_registry(), &schema, &value).unwrap();
        assert_eq!(bytes, vec![0x08, 0x00]);
    }

    #[test]
    fn test_nested_struct_terminated() {
        let inner = StructSchema::new().field(1, "v", FieldType::Uvarint);
        let schema = FieldType::Struct(
            StructSchema::new().field(1, "inner", FieldType::Struct(inner)),
        );
        let value = Value::Struct(vec![Value::Struct(vec![Value::Uint(3)])]);
        let bytes = encode(&empty_registry(), &schema, &value).unwrap();
        assert_eq!(bytes, vec![0x0B, 0x08, 0x03, END_GROUP_KEY]);
    }

    #[test]
    fn test_list_of_pointers_is_flagged() {
        let ty = FieldType::list(FieldType::pointer(FieldType::Uvarint));
        let value = Value::List(vec![Value::some(Value::Uint(1)), Value::Pointer(None)]);
        let bytes = encode(&empty_registry(), &ty, &value).unwrap();
        assert_eq!(bytes, vec![0x10, 0x02, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_interface_short_and_bare() {
        let mut builder = RegistryBuilder::new();
        builder.register_interface("any").unwrap();
        builder.register_concrete("num", FieldType::Uvarint, false).unwrap();
        let registry = builder.build().unwrap();
        let prefix = registry.concrete("num").unwrap().prefix();

        let bytes = encode_interface(&registry, &InterfaceValue::new("num", Value::Uint(5))).unwrap();
        let mut expected = prefix.to_vec();
        expected.extend_from_slice(&[0x08, 0x05]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_unregistered_interface_type() {
        let registry = empty_registry();
        let result = encode_interface(&registry, &InterfaceValue::new("nope", Value::Uint(1)));
        assert!(matches!(result, Err(EncodeError::UnregisteredType { .. })));
    }

    #[test]
    fn test_nil_interface_in_list() {
        let mut builder = RegistryBuilder::new();
        builder.register_interface("any").unwrap();
        let registry = builder.build().unwrap();
        let ty = FieldType::list(FieldType::interface("any"));
        let result = encode(&registry, &ty, &Value::List(vec![Value::Interface(None)]));
        assert!(matches!(result, Err(EncodeError::NilInterfaceElement)));
    }

    #[test]
    fn test_floats_require_opt_in() {
        let registry = empty_registry();
        let ty = FieldType::Float64;
        let value = Value::Float64(1.5);
        assert!(matches!(encode(&registry, &ty, &value), Err(EncodeError::UnsafeFloat)));

        let options = EncodeOptions::new().with_unsafe_floats();
        let bytes = encode_with_options(&registry, &ty, &value, options).unwrap();
        assert_eq!(bytes, 1.5f64.to_bits().to_le_bytes().to_vec());

        let nan = encode_with_options(&registry, &ty, &Value::Float64(f64::NAN), options);
        assert!(matches!(nan, Err(EncodeError::FloatIsNan)));
    }

    #[test]
    fn test_schema_mismatch() {
        let registry = empty_registry();
        let result = encode(&registry, &FieldType::Uvarint, &Value::String("x".into()));
        assert!(matches!(result, Err(EncodeError::SchemaMismatch { .. })));

        let schema = FieldType::Struct(StructSchema::new().field(1, "a", FieldType::Bool));
        let result = encode(&registry, &schema, &Value::Struct(vec![]));
        assert!(matches!(result, Err(EncodeError::SchemaMismatch { .. })));

        let result = encode(&registry, &FieldType::Fixed32, &Value::Uint(u64::MAX));
        assert!(matches!(result, Err(EncodeError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let registry = empty_registry();
        let mut ty = FieldType::Uvarint;
        let mut value = Value::Uint(1);
        for _ in 0..10 {
            ty = FieldType::list(ty);
            value = Value::List(vec![value]);
        }
        let options = EncodeOptions::new().with_limits(Limits::new().with_max_depth(5));
        let result = encode_with_options(&registry, &ty, &value, options);
        assert!(matches!(result, Err(EncodeError::LimitExceeded { what: "depth", .. })));
        assert!(encode(&registry, &ty, &value).is_ok());
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
        let value = Value::Struct(vec![Value::Uint(1), Value::Uint(2), Value::Uint(3)]);
        let result = encode(&registry, &unsorted, &value);
        assert!(matches!(result, Err(EncodeError::InvalidSchema { .. })));

        let zero = FieldType::Struct(StructSchema::new().field(0, "a", FieldType::Uvarint));
        let result = encode(&registry, &zero, &Value::Struct(vec![Value::Uint(1)]));
        assert!(matches!(result, Err(EncodeError::InvalidSchema { .. })));

        let nested = FieldType::list(FieldType::Struct(
            StructSchema::new()
                .field(2, "a", FieldType::Uvarint)
                .field(2, "b", FieldType::Uvarint),
        ));
        let result = encode(&registry, &nested, &Value::List(vec![]));
        assert!(matches!(result, Err(EncodeError::InvalidSchema { .. })));

        let double = FieldType::pointer(FieldType::pointer(FieldType::Uvarint));
        let result = encode(&registry, &double, &Value::Pointer(None));
        assert!(matches!(result, Err(EncodeError::InvalidSchema { .. })));
        assert_eq!(result.unwrap_err().kind(), crate::error::ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_negative_zero_float_field_written() {
        let ty = FieldType::Struct(StructSchema::new().field(1, "x", FieldType::Float64));
        let options = EncodeOptions::new().with_unsafe_floats();
        let registry = empty_registry();
        let negative = Value::Struct(vec![Value::Float64(-0.0)]);
        let bytes = encode_with_options(&registry, &ty, &negative, options).unwrap();
        let mut expected = vec![0x09];
        expected.extend_from_slice(&(-0.0f64).to_bits().to_le_bytes());
        assert_eq!(bytes, expected);

        let positive = Value::Struct(vec![Value::Float64(0.0)]);
        assert!(encode_with_options(&registry, &ty, &positive, options).unwrap().is_empty());
    }
}
