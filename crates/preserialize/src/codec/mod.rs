//! Pre-serialization and de-pre-serialization.
//!
//! A [`Preserializer`] is built once from a reference scheme, a type table,
//! an optional key encoder and [`Limits`], then used for any number of
//! independent [`preserialize`](Preserializer::preserialize) and
//! [`depreserialize`](Preserializer::depreserialize) calls. Both walks run on
//! an explicit frame stack, so nesting depth is bounded by memory and
//! [`Limits`], never by the native call stack.

mod decode;
mod encode;

use serde_json::Value;

use crate::deconstruct::{DictDeconstructor, IterableDeconstructor};
use crate::error::{PreserializeError, Result};
use crate::key::{IdentifierEscapeEncoder, KeyEncoder};
use crate::limits::Limits;
use crate::link::{JsonReference, ReferenceScheme};
use crate::model::{Object, RuntimeType};
use crate::registry::{TypeRegistry, TypeRow};

/// Converts object graphs to wire trees and back.
///
/// Registration needs `&mut self`; passes only need `&self`, so a configured
/// preserializer can be shared between threads.
#[derive(Debug)]
pub struct Preserializer<S: ReferenceScheme = JsonReference> {
    scheme: S,
    registry: TypeRegistry,
    encoder: Box<dyn KeyEncoder>,
    type_key: String,
    version_key: String,
    limits: Limits,
}

/// A preserializer using JSON References.
pub type JsonPreserializer = Preserializer<JsonReference>;

/// Type rows for JSON output: scalars pass through, tuples and sets become
/// positional lists and mappings use [`DictDeconstructor`].
///
/// Lists need no row; they are always written as wire sequences.
pub fn json_types() -> Vec<TypeRow> {
    vec![
        TypeRow::passthrough(RuntimeType::Int),
        TypeRow::passthrough(RuntimeType::Float),
        TypeRow::passthrough(RuntimeType::Str),
        TypeRow::with(RuntimeType::Tuple, IterableDeconstructor),
        TypeRow::with(RuntimeType::Set, IterableDeconstructor),
        TypeRow::passthrough(RuntimeType::Bool),
        TypeRow::passthrough(RuntimeType::Null),
        TypeRow::with(RuntimeType::Dict, DictDeconstructor),
    ]
}

impl Preserializer<JsonReference> {
    /// Creates a JSON preserializer with [`json_types`] registered.
    pub fn json() -> Result<Self> {
        PreserializerBuilder::new(JsonReference).types(json_types()).build()
    }
}

impl<S: ReferenceScheme> Preserializer<S> {
    /// Starts configuring a preserializer for `scheme`.
    pub fn builder(scheme: S) -> PreserializerBuilder<S> {
        PreserializerBuilder::new(scheme)
    }

    /// Registers one more type row.
    pub fn register(&mut self, row: TypeRow) -> Result<()> {
        self.registry.register(row)
    }

    /// Pre-serializes `obj` into a wire tree.
    pub fn preserialize(&self, obj: &Object) -> Result<Value> {
        encode::preserialize(self, obj)
    }

    /// Rebuilds an object graph from a wire tree.
    pub fn depreserialize(&self, data: &Value) -> Result<Object> {
        decode::depreserialize(self, data)
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Returns the attribute key encoder, including the escape layer.
    pub fn key_encoder(&self) -> &dyn KeyEncoder {
        self.encoder.as_ref()
    }

    /// Returns the reserved type tag key (`$type` for JSON References).
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Returns the reserved version key (`$version` for JSON References).
    pub fn version_key(&self) -> &str {
        &self.version_key
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Returns true if `key` is one of the reserved wire keys.
    pub(crate) fn is_reserved(&self, key: &str) -> bool {
        key == self.type_key || key == self.version_key || key == crate::model::ARGS_KEY
    }
}

/// Drops a wire tree without native recursion.
pub(crate) fn dispose(value: Value) {
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => pending.extend(items),
            Value::Object(map) => pending.extend(map.into_iter().map(|(_, value)| value)),
            _ => {}
        }
    }
}

/// Builder for [`Preserializer`].
#[derive(Debug)]
pub struct PreserializerBuilder<S: ReferenceScheme> {
    scheme: S,
    rows: Vec<TypeRow>,
    key_encoder: Option<Box<dyn KeyEncoder>>,
    limits: Limits,
}

impl<S: ReferenceScheme> PreserializerBuilder<S> {
    /// Creates a builder with no types registered.
    pub fn new(scheme: S) -> Self {
        Self {
            scheme,
            rows: Vec::new(),
            key_encoder: None,
            limits: Limits::default(),
        }
    }

    /// Appends rows to the registration table.
    pub fn types(mut self, rows: impl IntoIterator<Item = TypeRow>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Appends one row to the registration table.
    pub fn register(mut self, row: TypeRow) -> Self {
        self.rows.push(row);
        self
    }

    /// Sets an encoder applied to attribute keys after escaping.
    pub fn key_encoder(mut self, encoder: impl KeyEncoder + 'static) -> Self {
        self.key_encoder = Some(Box::new(encoder));
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Validates the configuration and registers every row in order.
    pub fn build(self) -> Result<Preserializer<S>> {
        let escape = self
            .scheme
            .key()
            .chars()
            .next()
            .ok_or_else(|| PreserializeError::InvalidEscapeChar { escape: String::new() })?;

        let escape_encoder = IdentifierEscapeEncoder::new(escape)?;
        let encoder: Box<dyn KeyEncoder> = match self.key_encoder {
            Some(outer) => Box::new(outer.compose(escape_encoder)),
            None => Box::new(escape_encoder),
        };

        let mut registry = TypeRegistry::new(escape)?;
        for row in self.rows {
            registry.register(row)?;
        }

        Ok(Preserializer {
            scheme: self.scheme,
            registry,
            encoder,
            type_key: format!("{}type", escape),
            version_key: format!("{}version", escape),
            limits: self.limits,
        })
    }
}
