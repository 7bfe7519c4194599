//! Data model types for typewire.
//!
//! - Identifiers (hash-derived disambiguation and prefix bytes)
//! - Schemas (wire types, field types, struct layouts)
//! - Values (the dynamic tree the codec reads and writes)

pub mod id;
pub mod schema;
pub mod value;

pub use id::{compute_identifiers, format_identifier, Disambiguation, Prefix};
pub use schema::{FieldDescriptor, FieldType, StructSchema, WireType};
pub use value::{InterfaceValue, Timestamp, Value};
