//! Type registry.
//!
//! Registration happens once, through a [`RegistryBuilder`]. [`RegistryBuilder::build`]
//! validates cross references and freezes the tables into a [`Registry`], which
//! is immutable and can be shared between threads without locking.
//!
//! # Prefix collisions
//!
//! Every concrete type gets a 4-byte prefix and 3 disambiguation bytes derived
//! from its name (see [`compute_identifiers`]). When two or more registered
//! types share a prefix, all of them are marked as requiring the full form and
//! are always written as `0x00 [disambiguation] [prefix]`. Types with a unique
//! prefix are written as the bare 4 bytes.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::model::{
    compute_identifiers, format_identifier, Disambiguation, FieldType, Prefix, StructSchema,
    Value, WireType,
};

/// A registered concrete (non-interface) type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteType {
    name: String,
    disambiguation: Disambiguation,
    prefix: Prefix,
    pointer_preferred: bool,
    schema: FieldType,
    requires_full: bool,
}

impl ConcreteType {
    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Disambiguation bytes.
    pub fn disambiguation(&self) -> Disambiguation {
        self.disambiguation
    }

    /// Prefix bytes.
    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    /// Whether decoding into an interface slot yields a pointer.
    pub fn pointer_preferred(&self) -> bool {
        self.pointer_preferred
    }

    /// Registered schema.
    pub fn schema(&self) -> &FieldType {
        &self.schema
    }

    /// Struct layout, for struct-shaped types.
    pub fn struct_schema(&self) -> Option<&StructSchema> {
        match &self.schema {
            FieldType::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this type must always be written with its disambiguation bytes.
    pub fn requires_full(&self) -> bool {
        self.requires_full
    }

    /// Whether values of this type encode as a field list.
    pub fn is_struct(&self) -> bool {
        self.schema.is_struct()
    }

    /// Wire type of the registered schema.
    pub fn wire_type(&self) -> WireType {
        self.schema.wire_type()
    }

    /// Identifier bytes as written on the wire.
    pub fn identifier_bytes(&self) -> Vec<u8> {
        if self.requires_full {
            let mut bytes = Vec::with_capacity(8);
            bytes.push(crate::limits::ESCAPE_BYTE);
            bytes.extend_from_slice(&self.disambiguation);
            bytes.extend_from_slice(&self.prefix);
            bytes
        } else {
            self.prefix.to_vec()
        }
    }
}

/// A registered interface (polymorphic slot).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceType {
    name: String,
    implementors: BTreeSet<String>,
}

impl InterfaceType {
    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concrete types declared to implement this interface.
    ///
    /// Informational only: any registered concrete type decodes into any slot.
    pub fn implementors(&self) -> impl Iterator<Item = &str> {
        self.implementors.iter().map(String::as_str)
    }
}

/// Lookup tables shared by the builder and the frozen registry.
#[derive(Debug, Clone, Default)]
struct Tables {
    interfaces: FxHashMap<String, InterfaceType>,
    concretes: Vec<ConcreteType>,
    by_name: FxHashMap<String, usize>,
    by_prefix: FxHashMap<Prefix, Vec<usize>>,
}

impl Tables {
    fn is_registered(&self, name: &str) -> bool {
        self.interfaces.contains_key(name) || self.by_name.contains_key(name)
    }

    fn concrete(&self, name: &str) -> Option<&ConcreteType> {
        self.by_name.get(name).map(|&i| &self.concretes[i])
    }

    fn lookup_by_short(&self, prefix: &Prefix) -> Option<&ConcreteType> {
        let group = self.by_prefix.get(prefix)?;
        group.first().map(|&i| &self.concretes[i])
    }

    fn lookup_by_long(&self, disambiguation: &Disambiguation, prefix: &Prefix) -> Option<&ConcreteType> {
        let group = self.by_prefix.get(prefix)?;
        group
            .iter()
            .map(|&i| &self.concretes[i])
            .find(|c| c.disambiguation == *disambiguation)
    }

    /// Marks every type whose prefix group has two or more members.
    fn recompute_full_forms(&mut self) {
        for group in self.by_prefix.values() {
            let shared = group.len() > 1;
            for &i in group {
                self.concretes[i].requires_full = shared;
            }
        }
    }
}

/// Mutable registry used during initialization.
///
/// ```rust
/// use typewire::{FieldType, RegistryBuilder, StructSchema};
///
/// let mut builder = RegistryBuilder::new();
/// builder.register_interface("shapes/Shape").unwrap();
/// builder
///     .register_concrete(
///         "shapes/Circle",
///         StructSchema::new().field(1, "radius", FieldType::Uvarint),
///         false,
///     )
///     .unwrap();
/// builder.implement("shapes/Shape", "shapes/Circle");
/// let registry = builder.build().unwrap();
/// assert!(registry.concrete("shapes/Circle").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    tables: Tables,
    implementations: Vec<(String, String)>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interface name.
    pub fn register_interface(&mut self, name: &str) -> Result<(), RegistryError> {
        if self.tables.is_registered(name) {
            return Err(RegistryError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.tables.interfaces.insert(
            name.to_string(),
            InterfaceType {
                name: name.to_string(),
                implementors: BTreeSet::new(),
            },
        );
        debug!(name, "registered interface");
        Ok(())
    }

    /// Registers a concrete type under `name`.
    ///
    /// `schema` may be a [`StructSchema`] or any non-pointer, non-interface
    /// [`FieldType`]; non-struct types travel behind interfaces as bare values.
    pub fn register_concrete(
        &mut self,
        name: &str,
        schema: impl Into<FieldType>,
        pointer_preferred: bool,
    ) -> Result<&ConcreteType, RegistryError> {
        if self.tables.is_registered(name) {
            return Err(RegistryError::DuplicateName {
                name: name.to_string(),
            });
        }
        let (disambiguation, prefix) = compute_identifiers(name)?;
        self.insert_concrete(name, disambiguation, prefix, schema.into(), pointer_preferred)
    }

    /// Inserts a concrete type with already derived identifiers.
    pub(crate) fn insert_concrete(
        &mut self,
        name: &str,
        disambiguation: Disambiguation,
        prefix: Prefix,
        schema: FieldType,
        pointer_preferred: bool,
    ) -> Result<&ConcreteType, RegistryError> {
        if self.tables.is_registered(name) {
            return Err(RegistryError::DuplicateName {
                name: name.to_string(),
            });
        }
        check_concrete_schema(name, &schema)?;

        if let Some(existing) = self.tables.lookup_by_long(&disambiguation, &prefix) {
            let mut identifier = disambiguation.to_vec();
            identifier.extend_from_slice(&prefix);
            return Err(RegistryError::IdentifierCollision {
                name: name.to_string(),
                existing: existing.name.clone(),
                identifier: format_identifier(&identifier),
            });
        }

        let index = self.tables.concretes.len();
        self.tables.concretes.push(ConcreteType {
            name: name.to_string(),
            disambiguation,
            prefix,
            pointer_preferred,
            schema,
            requires_full: false,
        });
        self.tables.by_name.insert(name.to_string(), index);
        let group = self.tables.by_prefix.entry(prefix).or_default();
        group.push(index);
        let group_len = group.len();
        self.tables.recompute_full_forms();

        debug!(
            name,
            prefix = %format_identifier(&prefix),
            disambiguation = %format_identifier(&disambiguation),
            "registered concrete type"
        );
        if group_len > 1 {
            info!(
                name,
                prefix = %format_identifier(&prefix),
                sharing = group_len,
                "prefix collision, types will use the full identifier form"
            );
        }

        Ok(&self.tables.concretes[index])
    }

    /// Records that `concrete` implements `interface`.
    ///
    /// Both names are checked when the registry is built.
    pub fn implement(&mut self, interface: &str, concrete: &str) -> &mut Self {
        self.implementations
            .push((interface.to_string(), concrete.to_string()));
        self
    }

    /// Looks up a concrete type registered so far.
    pub fn concrete(&self, name: &str) -> Option<&ConcreteType> {
        self.tables.concrete(name)
    }

    /// Validates references and freezes the registry.
    pub fn build(mut self) -> Result<Registry, RegistryError> {
        for (interface, concrete) in std::mem::take(&mut self.implementations) {
            if self.tables.concrete(&concrete).is_none() {
                return Err(RegistryError::UnknownReference {
                    context: format!("implementation of {}", interface),
                    kind: "concrete type",
                    name: concrete,
                });
            }
            match self.tables.interfaces.get_mut(&interface) {
                Some(iface) => {
                    iface.implementors.insert(concrete);
                }
                None => {
                    return Err(RegistryError::UnknownReference {
                        context: format!("implementation by {}", concrete),
                        kind: "interface",
                        name: interface,
                    });
                }
            }
        }

        for concrete in &self.tables.concretes {
            check_references(&self.tables, &concrete.name, &concrete.schema)?;
        }
        for concrete in &self.tables.concretes {
            let mut path = vec![concrete.name.as_str()];
            check_inline_cycle(&self.tables, &mut path, &concrete.schema)?;
        }

        debug!(
            interfaces = self.tables.interfaces.len(),
            concretes = self.tables.concretes.len(),
            "type registry built"
        );
        Ok(Registry {
            tables: self.tables,
        })
    }
}

/// Rejects schemas that cannot be registered as concrete types.
fn check_concrete_schema(name: &str, schema: &FieldType) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidSchema {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    match schema {
        FieldType::Pointer(_) => {
            return Err(invalid("a concrete type cannot be a pointer; use pointer_preferred"));
        }
        FieldType::Interface(_) => return Err(invalid("a concrete type cannot be an interface")),
        FieldType::Named(_) => return Err(invalid("a concrete type cannot alias another type")),
        _ => {}
    }
    schema.check().map_err(|reason| invalid(&reason))
}

/// Checks that every Named and Interface reference resolves.
fn check_references(tables: &Tables, owner: &str, ty: &FieldType) -> Result<(), RegistryError> {
    match ty {
        FieldType::Struct(schema) => {
            for field in &schema.fields {
                check_references(tables, owner, &field.ty)?;
            }
            Ok(())
        }
        FieldType::Pointer(inner) | FieldType::List(inner) => check_references(tables, owner, inner),
        FieldType::Named(name) => match tables.concrete(name) {
            Some(c) if c.is_struct() => Ok(()),
            Some(_) => Err(RegistryError::InvalidSchema {
                name: owner.to_string(),
                reason: format!("named reference {:?} is not struct-shaped", name),
            }),
            None => Err(RegistryError::UnknownReference {
                context: owner.to_string(),
                kind: "concrete type",
                name: name.clone(),
            }),
        },
        FieldType::Interface(name) => {
            if tables.interfaces.contains_key(name) {
                Ok(())
            } else {
                Err(RegistryError::UnknownReference {
                    context: owner.to_string(),
                    kind: "interface",
                    name: name.clone(),
                })
            }
        }
        _ => Ok(()),
    }
}

/// Rejects structs that contain themselves without pointer, list or interface
/// indirection; their zero value would be infinite.
fn check_inline_cycle<'a>(
    tables: &'a Tables,
    path: &mut Vec<&'a str>,
    ty: &'a FieldType,
) -> Result<(), RegistryError> {
    match ty {
        FieldType::Struct(schema) => {
            for field in &schema.fields {
                check_inline_cycle(tables, path, &field.ty)?;
            }
            Ok(())
        }
        FieldType::Named(name) => {
            if path.contains(&name.as_str()) {
                return Err(RegistryError::InvalidSchema {
                    name: path[0].to_string(),
                    reason: format!("{} contains itself without indirection", name),
                });
            }
            // References were checked before cycles
            let Some(target) = tables.concrete(name) else {
                return Ok(());
            };
            path.push(&target.name);
            check_inline_cycle(tables, path, &target.schema)?;
            path.pop();
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Frozen, read-only type registry.
#[derive(Debug, Clone)]
pub struct Registry {
    tables: Tables,
}

impl Registry {
    /// Starts a new registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Looks up a concrete type by name.
    pub fn concrete(&self, name: &str) -> Option<&ConcreteType> {
        self.tables.concrete(name)
    }

    /// Looks up an interface by name.
    pub fn interface(&self, name: &str) -> Option<&InterfaceType> {
        self.tables.interfaces.get(name)
    }

    /// Concrete types declared to implement `interface`.
    pub fn implementors(&self, interface: &str) -> Vec<&ConcreteType> {
        self.interface(interface)
            .map(|iface| {
                iface
                    .implementors
                    .iter()
                    .filter_map(|name| self.concrete(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `concrete` was declared to implement `interface`.
    pub fn implements(&self, interface: &str, concrete: &str) -> bool {
        self.interface(interface)
            .is_some_and(|iface| iface.implementors.contains(concrete))
    }

    /// All concrete types in registration order.
    pub fn iter_concrete(&self) -> impl Iterator<Item = &ConcreteType> {
        self.tables.concretes.iter()
    }

    /// Resolves a 4-byte prefix.
    ///
    /// When several types share the prefix this returns one of them, marked
    /// [`requires_full`](ConcreteType::requires_full); callers must treat that
    /// as ambiguous.
    pub fn lookup_by_short(&self, prefix: &Prefix) -> Option<&ConcreteType> {
        self.tables.lookup_by_short(prefix)
    }

    /// Resolves the full disambiguation + prefix identifier.
    pub fn lookup_by_long(&self, disambiguation: &Disambiguation, prefix: &Prefix) -> Option<&ConcreteType> {
        self.tables.lookup_by_long(disambiguation, prefix)
    }

    /// Returns the zero value of a field type.
    ///
    /// An unregistered named type yields an empty struct.
    pub fn zero_value(&self, ty: &FieldType) -> Value {
        match ty {
            FieldType::Bool => Value::Bool(false),
            FieldType::Uvarint | FieldType::Fixed32 | FieldType::Fixed64 => Value::Uint(0),
            FieldType::Varint => Value::Int(0),
            FieldType::Float32 => Value::Float32(0.0),
            FieldType::Float64 => Value::Float64(0.0),
            FieldType::Bytes => Value::Bytes(Vec::new()),
            FieldType::String => Value::String(String::new()),
            FieldType::Time => Value::Time(Default::default()),
            FieldType::Struct(schema) => {
                Value::Struct(schema.fields.iter().map(|f| self.zero_value(&f.ty)).collect())
            }
            FieldType::Named(name) => match self.concrete(name) {
                Some(c) => self.zero_value(&c.schema),
                None => Value::Struct(Vec::new()),
            },
            FieldType::Pointer(_) => Value::Pointer(None),
            FieldType::List(_) => Value::List(Vec::new()),
            FieldType::Interface(_) => Value::Interface(None),
        }
    }
}
