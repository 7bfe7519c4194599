//! Schema types: wire types, field types and struct layouts.
//!
//! A schema is described once, when a type is registered, and consumed by
//! the encoder and decoder. Nothing is discovered by runtime reflection.

use std::fmt;

use crate::limits::{MAX_FIELD_NUMBER, NULLABLE_ELEMENTS_FLAG};

/// Wire types (3 bits) framing the bytes that follow a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartStruct = 3,
    EndGroup = 4,
    Fixed32 = 5,
    List = 6,
    Interface = 7,
}

impl WireType {
    /// Creates a WireType from its 3-bit wire representation.
    pub fn from_u8(v: u8) -> Option<WireType> {
        match v {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartStruct),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            6 => Some(WireType::List),
            7 => Some(WireType::Interface),
            _ => None,
        }
    }

    /// Returns the field key `(number << 3) | wire_type`.
    pub fn key(self, number: u32) -> u64 {
        ((number as u64) << 3) | self as u64
    }
}

/// Declared type of a field, list element, pointee or registered concrete type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Boolean as varint 0/1.
    Bool,
    /// Unsigned LEB128 varint.
    Uvarint,
    /// Signed zigzag LEB128 varint.
    Varint,
    /// Little-endian unsigned 32-bit.
    Fixed32,
    /// Little-endian unsigned 64-bit.
    Fixed64,
    /// IEEE-754 single precision; requires `allow_unsafe_floats`.
    Float32,
    /// IEEE-754 double precision; requires `allow_unsafe_floats`.
    Float64,
    /// Length-delimited raw bytes.
    Bytes,
    /// Length-delimited UTF-8 string.
    String,
    /// Timestamp, length-delimited.
    Time,
    /// Inline struct layout.
    Struct(StructSchema),
    /// Reference to a registered struct-shaped concrete type.
    Named(String),
    /// Nullable indirection.
    Pointer(Box<FieldType>),
    /// Homogeneous list.
    List(Box<FieldType>),
    /// Polymorphic slot holding any registered concrete type.
    Interface(String),
}

impl FieldType {
    /// Shorthand for `FieldType::Pointer(Box::new(inner))`.
    pub fn pointer(inner: FieldType) -> Self {
        FieldType::Pointer(Box::new(inner))
    }

    /// Shorthand for `FieldType::List(Box::new(element))`.
    pub fn list(element: FieldType) -> Self {
        FieldType::List(Box::new(element))
    }

    /// Shorthand for `FieldType::Named(name.into())`.
    pub fn named(name: impl Into<String>) -> Self {
        FieldType::Named(name.into())
    }

    /// Shorthand for `FieldType::Interface(name.into())`.
    pub fn interface(name: impl Into<String>) -> Self {
        FieldType::Interface(name.into())
    }

    /// Returns the wire type written in keys for this type.
    ///
    /// Pointers take the wire type of their pointee.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Bool | FieldType::Uvarint | FieldType::Varint => WireType::Varint,
            FieldType::Fixed32 | FieldType::Float32 => WireType::Fixed32,
            FieldType::Fixed64 | FieldType::Float64 => WireType::Fixed64,
            FieldType::Bytes | FieldType::String | FieldType::Time => WireType::LengthDelimited,
            FieldType::Struct(_) | FieldType::Named(_) => WireType::StartStruct,
            FieldType::Pointer(inner) => inner.wire_type(),
            FieldType::List(_) => WireType::List,
            FieldType::Interface(_) => WireType::Interface,
        }
    }

    /// Returns the header byte written before the elements of a list of this type.
    pub fn list_header(&self) -> u8 {
        match self {
            FieldType::Pointer(inner) => NULLABLE_ELEMENTS_FLAG | inner.wire_type() as u8,
            other => other.wire_type() as u8,
        }
    }

    /// Returns true if values of this type encode as a field list.
    pub fn is_struct(&self) -> bool {
        matches!(self, FieldType::Struct(_) | FieldType::Named(_))
    }

    /// Checks field numbering and pointer nesting throughout this type.
    ///
    /// `Named` references are not followed; the registry checks those at build.
    pub fn check(&self) -> Result<(), String> {
        match self {
            FieldType::Struct(schema) => {
                schema.check_numbering()?;
                for field in &schema.fields {
                    field.ty.check()?;
                }
                Ok(())
            }
            FieldType::Pointer(inner) => {
                if matches!(**inner, FieldType::Pointer(_)) {
                    return Err("pointer to pointer is not supported".to_string());
                }
                inner.check()
            }
            FieldType::List(inner) => inner.check(),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => f.write_str("bool"),
            FieldType::Uvarint => f.write_str("uvarint"),
            FieldType::Varint => f.write_str("varint"),
            FieldType::Fixed32 => f.write_str("fixed32"),
            FieldType::Fixed64 => f.write_str("fixed64"),
            FieldType::Float32 => f.write_str("float32"),
            FieldType::Float64 => f.write_str("float64"),
            FieldType::Bytes => f.write_str("bytes"),
            FieldType::String => f.write_str("string"),
            FieldType::Time => f.write_str("time"),
            FieldType::Struct(s) => write!(f, "struct({} fields)", s.fields.len()),
            FieldType::Named(name) => write!(f, "{}", name),
            FieldType::Pointer(inner) => write!(f, "*{}", inner),
            FieldType::List(inner) => write!(f, "[]{}", inner),
            FieldType::Interface(name) => write!(f, "interface {}", name),
        }
    }
}

/// One field of a struct layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// 1-based field number written in the key.
    pub number: u32,
    /// Field name, used by the JSON codec and diagnostics.
    pub name: String,
    /// Declared type.
    pub ty: FieldType,
}

/// Ordered field layout of a struct.
///
/// ```rust
/// use typewire::{FieldType, StructSchema};
///
/// let schema = StructSchema::new()
///     .field(1, "name", FieldType::String)
///     .field(2, "age", FieldType::Uvarint);
/// assert_eq!(schema.fields.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructSchema {
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl StructSchema {
    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    pub fn field(mut self, number: u32, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDescriptor {
            number,
            name: name.into(),
            ty,
        });
        self
    }

    /// Returns the index of the field with this number.
    pub fn index_of(&self, number: u32) -> Option<usize> {
        self.fields.binary_search_by_key(&number, |f| f.number).ok()
    }

    /// Checks field numbering: strictly increasing, within `1..=MAX_FIELD_NUMBER`.
    pub fn check_numbering(&self) -> Result<(), String> {
        let mut last = 0u32;
        for field in &self.fields {
            if field.number == 0 || field.number > MAX_FIELD_NUMBER {
                return Err(format!(
                    "field {:?} has number {} outside 1..={}",
                    field.name, field.number, MAX_FIELD_NUMBER
                ));
            }
            if field.number <= last {
                return Err(format!(
                    "field {:?} number {} is not greater than {}",
                    field.name, field.number, last
                ));
            }
            last = field.number;
        }
        Ok(())
    }
}

impl From<StructSchema> for FieldType {
    fn from(schema: StructSchema) -> Self {
        FieldType::Struct(schema)
    }
}
