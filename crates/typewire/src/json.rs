//! JSON rendition of values, addressed by registered type names.
//!
//! Shares only the name-to-type mapping with the binary codec; no identifier
//! bytes appear in the output. Interface values are written as
//! `{"type": "<name>", "value": ...}`. 64-bit integers are decimal strings,
//! bytes are standard base64 and timestamps are RFC 3339 in UTC.

use std::borrow::Cow;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};

use crate::error::JsonError;
use crate::limits::DEFAULT_MAX_DEPTH;
use crate::model::{FieldType, InterfaceValue, StructSchema, Value};
use crate::registry::{ConcreteType, Registry};
use crate::util::{format_timestamp_rfc3339, parse_timestamp_rfc3339};

const TYPE_KEY: &str = "type";
const VALUE_KEY: &str = "value";

/// Options for the JSON codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    /// Permit `Float32`/`Float64` fields.
    pub allow_unsafe_floats: bool,
    /// Maximum nesting of structs, lists and interfaces.
    pub max_depth: usize,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            allow_unsafe_floats: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl JsonOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables float fields.
    pub fn with_unsafe_floats(mut self) -> Self {
        self.allow_unsafe_floats = true;
        self
    }

    /// Sets the maximum nesting depth.
    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }
}

/// Renders `value` of type `ty` as JSON.
pub fn to_json(registry: &Registry, ty: &FieldType, value: &Value) -> Result<Json, JsonError> {
    to_json_with_options(registry, ty, value, JsonOptions::default())
}

/// Renders `value` of type `ty` as JSON with the given options.
pub fn to_json_with_options(
    registry: &Registry,
    ty: &FieldType,
    value: &Value,
    options: JsonOptions,
) -> Result<Json, JsonError> {
    ty.check().map_err(|reason| JsonError::InvalidSchema { reason })?;
    Converter::new(registry, options).to_json(ty, value)
}

/// Parses a value of type `ty` from JSON.
///
/// Missing struct fields take their zero value; unknown keys are ignored.
pub fn from_json(registry: &Registry, ty: &FieldType, json: &Json) -> Result<Value, JsonError> {
    from_json_with_options(registry, ty, json, JsonOptions::default())
}

/// Parses a value of type `ty` from JSON with the given options.
pub fn from_json_with_options(
    registry: &Registry,
    ty: &FieldType,
    json: &Json,
    options: JsonOptions,
) -> Result<Value, JsonError> {
    ty.check().map_err(|reason| JsonError::InvalidSchema { reason })?;
    Converter::new(registry, options).from_json(ty, json)
}

/// Renders a top-level interface value as `{"type", "value"}`.
pub fn interface_to_json(registry: &Registry, value: &InterfaceValue) -> Result<Json, JsonError> {
    Converter::new(registry, JsonOptions::default()).interface_to_json(value)
}

/// Parses a top-level `{"type", "value"}` object.
pub fn interface_from_json(registry: &Registry, json: &Json) -> Result<InterfaceValue, JsonError> {
    Converter::new(registry, JsonOptions::default()).interface_from_json(json)
}

struct Converter<'r> {
    registry: &'r Registry,
    options: JsonOptions,
    path: Vec<String>,
}

impl<'r> Converter<'r> {
    fn new(registry: &'r Registry, options: JsonOptions) -> Self {
        Self {
            registry,
            options,
            path: Vec::new(),
        }
    }

    fn path(&self) -> String {
        let mut path = String::from("$");
        for segment in &self.path {
            path.push_str(segment);
        }
        path
    }

    fn descend(&mut self, segment: String) -> Result<(), JsonError> {
        if self.path.len() >= self.options.max_depth {
            return Err(JsonError::DepthExceeded {
                max: self.options.max_depth,
            });
        }
        self.path.push(segment);
        Ok(())
    }

    fn ascend(&mut self) {
        self.path.pop();
    }

    fn mismatch(&self, expected: impl std::fmt::Display) -> JsonError {
        JsonError::SchemaMismatch {
            path: self.path(),
            expected: expected.to_string(),
        }
    }

    fn check_float(&self) -> Result<(), JsonError> {
        if self.options.allow_unsafe_floats {
            Ok(())
        } else {
            Err(JsonError::UnsafeFloat)
        }
    }

    fn resolve(&self, name: &str) -> Result<&'r ConcreteType, JsonError> {
        self.registry
            .concrete(name)
            .ok_or_else(|| JsonError::UnregisteredType {
                name: name.to_string(),
            })
    }

    fn named_schema(&self, name: &str) -> Result<&'r StructSchema, JsonError> {
        let concrete = self.resolve(name)?;
        concrete
            .struct_schema()
            .ok_or_else(|| self.mismatch(format!("struct type {}", name)))
    }

    // =========================================================================
    // Value -> JSON
    // =========================================================================

    fn to_json(&mut self, ty: &FieldType, value: &Value) -> Result<Json, JsonError> {
        let json = match (ty, value) {
            (FieldType::Bool, Value::Bool(b)) => Json::Bool(*b),
            (FieldType::Uvarint | FieldType::Fixed64, Value::Uint(n)) => Json::String(n.to_string()),
            (FieldType::Fixed32, Value::Uint(n)) => {
                if *n > u32::MAX as u64 {
                    return Err(JsonError::InvalidNumber {
                        path: self.path(),
                        value: n.to_string(),
                    });
                }
                Json::from(*n)
            }
            (FieldType::Varint, Value::Int(n)) => Json::String(n.to_string()),
            (FieldType::Float32, Value::Float32(f)) => {
                self.check_float()?;
                self.float(*f as f64)?
            }
            (FieldType::Float64, Value::Float64(f)) => {
                self.check_float()?;
                self.float(*f)?
            }
            (FieldType::Bytes, Value::Bytes(b)) => Json::String(STANDARD.encode(b)),
            (FieldType::String, Value::String(s)) => Json::String(s.clone()),
            (FieldType::Time, Value::Time(ts)) => {
                ts.validate().map_err(|reason| JsonError::InvalidTime {
                    path: self.path(),
                    message: reason.to_string(),
                })?;
                Json::String(format_timestamp_rfc3339(ts))
            }
            (FieldType::Struct(schema), Value::Struct(fields)) => self.struct_to_json(schema, fields)?,
            (FieldType::Named(name), Value::Struct(fields)) => {
                let schema = self.named_schema(name)?;
                self.struct_to_json(schema, fields)?
            }
            (FieldType::Pointer(_), Value::Pointer(None)) => Json::Null,
            (FieldType::Pointer(inner), Value::Pointer(Some(pointee))) => self.to_json(inner, pointee)?,
            (FieldType::List(element), Value::List(items)) => {
                let mut array = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    self.descend(format!("[{}]", i))?;
                    array.push(self.to_json(element, item)?);
                    self.ascend();
                }
                Json::Array(array)
            }
            (FieldType::Interface(_), Value::Interface(None)) => Json::Null,
            (FieldType::Interface(_), Value::Interface(Some(iv))) => self.interface_to_json(iv)?,
            _ => return Err(self.mismatch(ty)),
        };
        Ok(json)
    }

    fn float(&self, f: f64) -> Result<Json, JsonError> {
        Number::from_f64(f)
            .map(Json::Number)
            .ok_or_else(|| JsonError::InvalidNumber {
                path: self.path(),
                value: f.to_string(),
            })
    }

    fn struct_to_json(&mut self, schema: &StructSchema, fields: &[Value]) -> Result<Json, JsonError> {
        if fields.len() != schema.fields.len() {
            return Err(self.mismatch(format!("struct with {} fields", schema.fields.len())));
        }
        let mut map = Map::new();
        for (field, value) in schema.fields.iter().zip(fields) {
            self.descend(format!(".{}", field.name))?;
            map.insert(field.name.clone(), self.to_json(&field.ty, value)?);
            self.ascend();
        }
        Ok(Json::Object(map))
    }

    fn interface_to_json(&mut self, iv: &InterfaceValue) -> Result<Json, JsonError> {
        let concrete = self.resolve(&iv.type_name)?;
        // Pointer-preferred values may arrive behind one pointer level
        let value = match &iv.value {
            Value::Pointer(Some(inner)) => inner.as_ref(),
            value => value,
        };

        self.descend(format!(".{}", VALUE_KEY))?;
        let payload = self.to_json(concrete.schema(), value)?;
        self.ascend();

        let mut map = Map::new();
        map.insert(TYPE_KEY.to_string(), Json::String(concrete.name().to_string()));
        map.insert(VALUE_KEY.to_string(), payload);
        Ok(Json::Object(map))
    }

    // =========================================================================
    // JSON -> Value
    // =========================================================================

    fn from_json(&mut self, ty: &FieldType, json: &Json) -> Result<Value, JsonError> {
        let value = match ty {
            FieldType::Bool => Value::Bool(json.as_bool().ok_or_else(|| self.mismatch(ty))?),
            FieldType::Uvarint | FieldType::Fixed64 => Value::Uint(self.integer(ty, json)?),
            FieldType::Fixed32 => Value::Uint(self.integer::<u32>(ty, json)? as u64),
            FieldType::Varint => Value::Int(self.integer(ty, json)?),
            FieldType::Float32 => {
                self.check_float()?;
                Value::Float32(json.as_f64().ok_or_else(|| self.mismatch(ty))? as f32)
            }
            FieldType::Float64 => {
                self.check_float()?;
                Value::Float64(json.as_f64().ok_or_else(|| self.mismatch(ty))?)
            }
            FieldType::Bytes => {
                let text = json.as_str().ok_or_else(|| self.mismatch(ty))?;
                let bytes = STANDARD
                    .decode(text)
                    .map_err(|_| JsonError::InvalidBase64 { path: self.path() })?;
                Value::Bytes(bytes)
            }
            FieldType::String => Value::String(json.as_str().ok_or_else(|| self.mismatch(ty))?.to_string()),
            FieldType::Time => {
                let text = json.as_str().ok_or_else(|| self.mismatch(ty))?;
                let ts = parse_timestamp_rfc3339(text).map_err(|e| JsonError::InvalidTime {
                    path: self.path(),
                    message: e.message,
                })?;
                Value::Time(ts)
            }
            FieldType::Struct(schema) => self.struct_from_json(schema, json)?,
            FieldType::Named(name) => {
                let schema = self.named_schema(name)?;
                self.struct_from_json(schema, json)?
            }
            FieldType::Pointer(_) if json.is_null() => Value::Pointer(None),
            FieldType::Pointer(inner) => Value::some(self.from_json(inner, json)?),
            FieldType::List(element) => {
                let array = json.as_array().ok_or_else(|| self.mismatch(ty))?;
                let mut items = Vec::with_capacity(array.len());
                for (i, item) in array.iter().enumerate() {
                    self.descend(format!("[{}]", i))?;
                    items.push(self.from_json(element, item)?);
                    self.ascend();
                }
                Value::List(items)
            }
            FieldType::Interface(_) if json.is_null() => Value::Interface(None),
            FieldType::Interface(_) => Value::Interface(Some(Box::new(self.interface_from_json(json)?))),
        };
        Ok(value)
    }

    /// Reads an integer written either as a decimal string or a JSON number.
    fn integer<T: FromStr>(&self, ty: &FieldType, json: &Json) -> Result<T, JsonError> {
        let text: Cow<'_, str> = match json {
            Json::String(s) => Cow::Borrowed(s),
            Json::Number(n) => Cow::Owned(n.to_string()),
            _ => return Err(self.mismatch(ty)),
        };
        text.parse().map_err(|_| JsonError::InvalidNumber {
            path: self.path(),
            value: text.to_string(),
        })
    }

    fn struct_from_json(&mut self, schema: &StructSchema, json: &Json) -> Result<Value, JsonError> {
        let object = json.as_object().ok_or_else(|| self.mismatch("object"))?;
        let mut values = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let value = match object.get(&field.name) {
                Some(item) => {
                    self.descend(format!(".{}", field.name))?;
                    let value = self.from_json(&field.ty, item)?;
                    self.ascend();
                    value
                }
                None => self.registry.zero_value(&field.ty),
            };
            values.push(value);
        }
        Ok(Value::Struct(values))
    }

    fn interface_from_json(&mut self, json: &Json) -> Result<InterfaceValue, JsonError> {
        let object = json
            .as_object()
            .ok_or_else(|| self.mismatch("{\"type\", \"value\"} object"))?;
        let name = object
            .get(TYPE_KEY)
            .and_then(Json::as_str)
            .ok_or_else(|| self.mismatch("string \"type\""))?;
        let concrete = self.resolve(name)?;

        let value = match object.get(VALUE_KEY) {
            Some(payload) => {
                self.descend(format!(".{}", VALUE_KEY))?;
                let value = self.from_json(concrete.schema(), payload)?;
                self.ascend();
                value
            }
            None => self.registry.zero_value(concrete.schema()),
        };
        let value = if concrete.pointer_preferred() {
            Value::some(value)
        } else {
            value
        };

        Ok(InterfaceValue {
            type_name: concrete.name().to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::Timestamp;
    use crate::registry::RegistryBuilder;

    fn registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder.register_interface("event").unwrap();
        builder
            .register_concrete(
                "app/Click",
                StructSchema::new()
                    .field(1, "x", FieldType::Fixed32)
                    .field(2, "at", FieldType::Time),
                false,
            )
            .unwrap();
        builder.register_concrete("app/Note", FieldType::String, true).unwrap();
        builder.implement("event", "app/Click").implement("event", "app/Note");
        builder.build().unwrap()
    }

    fn record() -> FieldType {
        StructSchema::new()
            .field(1, "id", FieldType::Uvarint)
            .field(2, "delta", FieldType::Varint)
            .field(3, "ok", FieldType::Bool)
            .field(4, "data", FieldType::Bytes)
            .field(5, "tags", FieldType::list(FieldType::String))
            .field(6, "parent", FieldType::pointer(FieldType::Uvarint))
            .field(7, "event", FieldType::interface("event"))
            .into()
    }

    #[test]
    fn test_struct_to_json() {
        let registry = registry();
        let value = Value::Struct(vec![
            Value::Uint(u64::MAX),
            Value::Int(-5),
            Value::Bool(true),
            Value::Bytes(vec![1, 2, 3]),
            Value::List(vec![Value::String("a".into())]),
            Value::Pointer(None),
            Value::interface(
                "app/Click",
                Value::Struct(vec![Value::Uint(7), Value::Time(Timestamp::new(1_710_513_000, 0))]),
            ),
        ]);

        let json = to_json(&registry, &record(), &value).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "18446744073709551615",
                "delta": "-5",
                "ok": true,
                "data": "AQID",
                "tags": ["a"],
                "parent": null,
                "event": {"type": "app/Click", "value": {"x": 7, "at": "2024-03-15T14:30:00Z"}}
            })
        );
        assert_eq!(from_json(&registry, &record(), &json).unwrap(), value);
    }

    #[test]
    fn test_missing_fields_are_zero() {
        let registry = registry();
        let value = from_json(&registry, &record(), &json!({"id": 3, "extra": [1, 2]})).unwrap();
        assert_eq!(
            value,
            Value::Struct(vec![
                Value::Uint(3),
                Value::Int(0),
                Value::Bool(false),
                Value::Bytes(Vec::new()),
                Value::List(Vec::new()),
                Value::Pointer(None),
                Value::Interface(None),
            ])
        );
    }

    #[test]
    fn test_pointer_preferred_interface() {
        let registry = registry();
        let iv = InterfaceValue::new("app/Note", Value::some(Value::String("hi".into())));
        let json = interface_to_json(&registry, &iv).unwrap();
        assert_eq!(json, json!({"type": "app/Note", "value": "hi"}));
        assert_eq!(interface_from_json(&registry, &json).unwrap(), iv);
    }

    #[test]
    fn test_errors_carry_path() {
        let registry = registry();
        let err = from_json(&registry, &record(), &json!({"data": "not base64!"})).unwrap_err();
        assert_eq!(err, JsonError::InvalidBase64 { path: "$.data".into() });

        let err = from_json(&registry, &record(), &json!({"tags": ["a", 1]})).unwrap_err();
        assert!(matches!(err, JsonError::SchemaMismatch { ref path, .. } if path == "$.tags[1]"));

        let err = from_json(&registry, &record(), &json!({"id": "-1"})).unwrap_err();
        assert!(matches!(err, JsonError::InvalidNumber { ref path, .. } if path == "$.id"));
    }

    #[test]
    fn test_unregistered_type() {
        let registry = registry();
        let err = interface_from_json(&registry, &json!({"type": "app/Missing"})).unwrap_err();
        assert_eq!(err, JsonError::UnregisteredType { name: "app/Missing".into() });
    }

    #[test]
    fn test_invalid_time() {
        let registry = registry();
        let err = from_json(&registry, &FieldType::Time, &json!("2024-02-30T00:00:00Z")).unwrap_err();
        assert!(matches!(err, JsonError::InvalidTime { .. }));
    }

    #[test]
    fn test_floats_require_opt_in() {
        let registry = registry();
        let err = to_json(&registry, &FieldType::Float64, &Value::Float64(1.5)).unwrap_err();
        assert_eq!(err, JsonError::UnsafeFloat);

        let options = JsonOptions::new().with_unsafe_floats();
        let json = to_json_with_options(&registry, &FieldType::Float64, &Value::Float64(1.5), options).unwrap();
        assert_eq!(json, json!(1.5));
        let err = to_json_with_options(&registry, &FieldType::Float64, &Value::Float64(f64::NAN), options);
        assert!(matches!(err, Err(JsonError::InvalidNumber { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let mut ty = FieldType::Uvarint;
        let mut json = json!(1);
        for _ in 0..10 {
            ty = FieldType::list(ty);
            json = json!([json]);
        }
        let options = JsonOptions::new().with_max_depth(5);
        let err = from_json_with_options(&registry(), &ty, &json, options).unwrap_err();
        assert_eq!(err, JsonError::DepthExceeded { max: 5 });
        assert!(from_json(&registry(), &ty, &json).is_ok());
    }

    #[test]
    fn test_invalid_inline_schema_rejected() {
        let ty = FieldType::Struct(
            StructSchema::new()
                .field(2, "a", FieldType::Uvarint)
                .field(1, "b", FieldType::Uvarint),
        );
        let err = from_json(&registry(), &ty, &json!({"a": 1, "b": 2})).unwrap_err();
        assert!(matches!(err, JsonError::InvalidSchema { .. }));

        let value = Value::Struct(vec![Value::Uint(1), Value::Uint(2)]);
        let err = to_json(&registry(), &ty, &value).unwrap_err();
        assert!(matches!(err, JsonError::InvalidSchema { .. }));
    }
}
