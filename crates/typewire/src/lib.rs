//! typewire: compact binary encoding for polymorphic, schema-described values.
//!
//! Every registered concrete type gets a short identifier derived from the
//! SHA-256 digest of its name: a 4-byte prefix written in front of interface
//! values, plus 3 disambiguation bytes used only when two registered types
//! share a prefix.
//!
//! # Quick Start
//!
//! ```rust
//! use typewire::{FieldType, InterfaceValue, Registry, StructSchema, Value};
//!
//! let mut builder = Registry::builder();
//! builder.register_interface("shapes/Shape").unwrap();
//! builder
//!     .register_concrete(
//!         "shapes/Circle",
//!         StructSchema::new().field(1, "radius", FieldType::Uvarint),
//!         false,
//!     )
//!     .unwrap();
//! builder.implement("shapes/Shape", "shapes/Circle");
//! let registry = builder.build().unwrap();
//!
//! let circle = InterfaceValue::new("shapes/Circle", Value::Struct(vec![Value::Uint(300)]));
//! let bytes = registry.encode_interface(&circle).unwrap();
//!
//! // 4 prefix bytes, then field 1 as a varint
//! assert_eq!(&bytes[4..], &[0x08, 0xAC, 0x02]);
//! assert_eq!(registry.decode_interface(&bytes).unwrap(), circle);
//! ```
//!
//! # Modules
//!
//! - [`model`]: Identifiers, schemas and the dynamic value tree
//! - [`registry`]: Type registration and identifier lookup
//! - [`codec`]: Binary encoding/decoding
//! - [`json`]: JSON rendition addressed by registered names
//! - [`error`]: Error types
//! - [`limits`]: Wire constants and decoding limits
//!
//! # Security
//!
//! The decoder is designed to safely handle untrusted input:
//! - Input size, nesting depth and all lengths are bounded by [`Limits`]
//! - Varints are limited to 10 bytes and checked for overflow
//! - Invalid data is rejected with descriptive errors, never partially returned
//!
//! # Wire Format
//!
//! Fields are written as `(number << 3) | wire_type` keys followed by their
//! payload; zero values are omitted. Interface values start with the 4-byte
//! prefix, or `0x00` + disambiguation + prefix when the prefix is shared.

pub mod codec;
pub mod error;
pub mod json;
pub mod limits;
pub mod model;
pub mod registry;
pub mod util;

// Re-export commonly used types at crate root
pub use codec::{decode, decode_interface, encode, encode_interface, DecodeOptions, EncodeOptions};
pub use error::{DecodeError, EncodeError, ErrorKind, JsonError, RegistryError};
pub use limits::Limits;
pub use model::{
    compute_identifiers, format_identifier, Disambiguation, FieldDescriptor, FieldType,
    InterfaceValue, Prefix, StructSchema, Timestamp, Value, WireType,
};
pub use registry::{ConcreteType, InterfaceType, Registry, RegistryBuilder};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
