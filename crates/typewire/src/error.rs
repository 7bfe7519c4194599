//! Error types for registration, encoding, decoding and the JSON codec.

use thiserror::Error;

/// Coarse classification shared by encode and decode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Identifier bytes resolve to no registered type.
    UnknownType,
    /// A short prefix matched a type that must be written in full form.
    AmbiguousPrefix,
    /// Bytes or value do not fit the expected schema.
    SchemaMismatch,
    /// Pointer presence byte was neither 0x00 nor 0x01.
    MalformedPointer,
    /// Input ended early.
    UnexpectedEof,
    /// A configured bound was exceeded.
    LimitExceeded,
    /// Encoding an interface value of an unregistered type.
    UnregisteredType,
    /// Varint, UTF-8, time or float payload is not well formed.
    MalformedEncoding,
}

/// Error while building a type registry.
///
/// These are configuration errors: a registry that failed to build has no
/// usable encode/decode surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("name {name:?} is already registered")]
    DuplicateName { name: String },

    #[error("cannot derive type identifiers for {name:?}: digest ran out of non-zero bytes")]
    IdentifierDerivation { name: String },

    #[error("{name:?} and {existing:?} share the full type identifier {identifier}")]
    IdentifierCollision {
        name: String,
        existing: String,
        identifier: String,
    },

    #[error("invalid schema for {name:?}: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("{context} references unknown {kind} {name:?}")]
    UnknownReference {
        context: String,
        kind: &'static str,
        name: String,
    },
}

/// Error during binary decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("{what} {len} exceeds limit {max}")]
    LimitExceeded {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("invalid bool value: {value} (expected 0 or 1)")]
    InvalidBool { value: u64 },

    #[error("invalid timestamp: {reason}")]
    InvalidTime { reason: &'static str },

    #[error("unknown type identifier {identifier}")]
    UnknownType { identifier: String },

    #[error("prefix {prefix} is shared by several types and must be escaped with disambiguation bytes")]
    AmbiguousPrefix { prefix: String },

    #[error("schema mismatch: {context}")]
    SchemaMismatch { context: String },

    #[error("invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("malformed pointer marker 0x{marker:02x}")]
    MalformedPointer { marker: u8 },

    #[error("float fields require allow_unsafe_floats")]
    UnsafeFloat,

    #[error("{remaining} trailing bytes after value")]
    TrailingBytes { remaining: usize },
}

impl DecodeError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::UnexpectedEof { .. } => ErrorKind::UnexpectedEof,
            DecodeError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            DecodeError::UnknownType { .. } => ErrorKind::UnknownType,
            DecodeError::AmbiguousPrefix { .. } => ErrorKind::AmbiguousPrefix,
            DecodeError::SchemaMismatch { .. }
            | DecodeError::InvalidSchema { .. }
            | DecodeError::UnsafeFloat
            | DecodeError::TrailingBytes { .. } => ErrorKind::SchemaMismatch,
            DecodeError::MalformedPointer { .. } => ErrorKind::MalformedPointer,
            DecodeError::VarintTooLong
            | DecodeError::VarintOverflow
            | DecodeError::InvalidUtf8 { .. }
            | DecodeError::InvalidBool { .. }
            | DecodeError::InvalidTime { .. } => ErrorKind::MalformedEncoding,
        }
    }

    pub(crate) fn mismatch(context: impl Into<String>) -> Self {
        DecodeError::SchemaMismatch {
            context: context.into(),
        }
    }
}

/// Error during binary encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("type {name:?} is not registered")]
    UnregisteredType { name: String },

    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: &'static str },

    #[error("invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("nil interface value cannot be encoded here; wrap it in a pointer")]
    NilInterfaceElement,

    #[error("float fields require allow_unsafe_floats")]
    UnsafeFloat,

    #[error("float value is NaN")]
    FloatIsNan,

    #[error("invalid timestamp: {reason}")]
    InvalidTime { reason: &'static str },

    #[error("{what} {len} exceeds limit {max}")]
    LimitExceeded {
        what: &'static str,
        len: usize,
        max: usize,
    },
}

impl EncodeError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::UnregisteredType { .. } => ErrorKind::UnregisteredType,
            EncodeError::SchemaMismatch { .. }
            | EncodeError::InvalidSchema { .. }
            | EncodeError::NilInterfaceElement
            | EncodeError::UnsafeFloat => ErrorKind::SchemaMismatch,
            EncodeError::FloatIsNan | EncodeError::InvalidTime { .. } => {
                ErrorKind::MalformedEncoding
            }
            EncodeError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
        }
    }
}

/// Error in the JSON sibling codec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JsonError {
    #[error("type {name:?} is not registered")]
    UnregisteredType { name: String },

    #[error("schema mismatch at {path}: expected {expected}")]
    SchemaMismatch { path: String, expected: String },

    #[error("invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("invalid number at {path}: {value}")]
    InvalidNumber { path: String, value: String },

    #[error("invalid base64 at {path}")]
    InvalidBase64 { path: String },

    #[error("invalid timestamp at {path}: {message}")]
    InvalidTime { path: String, message: String },

    #[error("float fields require allow_unsafe_floats")]
    UnsafeFloat,

    #[error("nesting depth exceeds limit {max}")]
    DepthExceeded { max: usize },
}
