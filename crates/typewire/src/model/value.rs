//! Dynamic value tree encoded and decoded against a schema.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::limits::{MAX_TIMESTAMP_SECONDS, MIN_TIMESTAMP_SECONDS, NANOS_PER_SECOND};

/// A point in time as seconds and nanoseconds since the Unix epoch.
///
/// The zero value is the epoch itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    /// Creates a timestamp without validating it.
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Returns true for the Unix epoch.
    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }

    /// Checks that the timestamp lies in years 0001..=9999 with nanos below one second.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.nanos >= NANOS_PER_SECOND {
            return Err("nanos out of range");
        }
        if self.seconds < MIN_TIMESTAMP_SECONDS {
            return Err("seconds before year 1");
        }
        if self.seconds >= MAX_TIMESTAMP_SECONDS {
            return Err("seconds after year 9999");
        }
        Ok(())
    }

    /// Converts to a `SystemTime`.
    pub fn to_system_time(&self) -> SystemTime {
        if self.seconds >= 0 {
            UNIX_EPOCH + Duration::new(self.seconds as u64, self.nanos)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.seconds.unsigned_abs())
                + Duration::from_nanos(self.nanos as u64)
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Timestamp::new(d.as_secs() as i64, d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                let mut seconds = -(d.as_secs() as i64);
                let mut nanos = d.subsec_nanos();
                if nanos > 0 {
                    seconds -= 1;
                    nanos = NANOS_PER_SECOND - nanos;
                }
                Timestamp::new(seconds, nanos)
            }
        }
    }
}

/// A concrete value stored behind an interface slot.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceValue {
    /// Registered name of the concrete type.
    pub type_name: String,
    /// The concrete value, shaped by the registered schema.
    pub value: Value,
}

impl InterfaceValue {
    pub fn new(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }
}

/// A value shaped by a [`FieldType`](crate::FieldType).
///
/// Struct values hold one entry per schema field, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    /// Uvarint, Fixed32 and Fixed64 fields.
    Uint(u64),
    /// Varint fields.
    Int(i64),
    Float32(f32),
    Float64(f64),
    Bytes(Vec<u8>),
    String(String),
    Time(Timestamp),
    Struct(Vec<Value>),
    Pointer(Option<Box<Value>>),
    List(Vec<Value>),
    /// `None` is the nil interface.
    Interface(Option<Box<InterfaceValue>>),
}

impl Value {
    /// Wraps a value in a present pointer.
    pub fn some(value: Value) -> Self {
        Value::Pointer(Some(Box::new(value)))
    }

    /// Wraps a concrete value in an interface.
    pub fn interface(type_name: impl Into<String>, value: Value) -> Self {
        Value::Interface(Some(Box::new(InterfaceValue::new(type_name, value))))
    }

    /// Returns true if this is its type's zero/empty/nil value.
    ///
    /// Struct fields holding a zero value are omitted on the wire.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(b) => !*b,
            Value::Uint(v) => *v == 0,
            Value::Int(v) => *v == 0,
            Value::Float32(v) => v.to_bits() == 0,
            Value::Float64(v) => v.to_bits() == 0,
            Value::Bytes(b) => b.is_empty(),
            Value::String(s) => s.is_empty(),
            Value::Time(t) => t.is_zero(),
            Value::Struct(fields) => fields.iter().all(Value::is_zero),
            Value::Pointer(p) => p.is_none(),
            Value::List(items) => items.is_empty(),
            Value::Interface(i) => i.is_none(),
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Uint(_) => "uint",
            Value::Int(_) => "int",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
            Value::Time(_) => "time",
            Value::Struct(_) => "struct",
            Value::Pointer(_) => "pointer",
            Value::List(_) => "list",
            Value::Interface(_) => "interface",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Time(v)
    }
}
