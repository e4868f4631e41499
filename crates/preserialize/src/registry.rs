//! Type registry: runtime types and versions to wire tags, and back.
//!
//! Encoding dispatches on an object's [`RuntimeType`] and its most recently
//! registered version. Decoding dispatches on the wire `(tag, version)` pair
//! and accepts every version that was ever registered.

use std::sync::Arc;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::deconstruct::{Deconstructor, TypeBinding};
use crate::error::{PreserializeError, Result};
use crate::model::types::display_version;
use crate::model::{RuntimeType, Version};

/// Options of one registration row.
#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    name: Option<String>,
    version: Option<Version>,
    ignore: FxHashSet<String>,
}

impl TypeOptions {
    /// Creates empty options: default tag, no version, nothing ignored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wire type tag. Defaults to the lowercased type name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the payload version.
    pub fn version(mut self, version: impl Into<Version>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Excludes attributes from decomposition.
    pub fn ignore<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(keys.into_iter().map(Into::into));
        self
    }
}

/// One row of a type registration table.
#[derive(Debug, Clone)]
pub struct TypeRow {
    ty: RuntimeType,
    deconstructor: Option<Arc<dyn Deconstructor>>,
    options: TypeOptions,
}

impl TypeRow {
    /// A scalar type written to the wire as itself.
    pub fn passthrough(ty: impl Into<RuntimeType>) -> Self {
        Self {
            ty: ty.into(),
            deconstructor: None,
            options: TypeOptions::default(),
        }
    }

    /// A type with a deconstructor and default options.
    pub fn with(ty: impl Into<RuntimeType>, deconstructor: impl Deconstructor + 'static) -> Self {
        Self::with_options(ty, deconstructor, TypeOptions::default())
    }

    /// A type with a deconstructor and explicit options.
    pub fn with_options(
        ty: impl Into<RuntimeType>,
        deconstructor: impl Deconstructor + 'static,
        options: TypeOptions,
    ) -> Self {
        Self {
            ty: ty.into(),
            deconstructor: Some(Arc::new(deconstructor)),
            options,
        }
    }
}

/// Bidirectional (type, version) <-> (tag, version) table.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    tag_grammar: Regex,
    /// `None` marks a passthrough registration.
    bindings: FxHashMap<(RuntimeType, Option<Version>), Option<TypeBinding>>,
    /// Version used when encoding each type.
    versions: FxHashMap<RuntimeType, Version>,
    types: FxHashMap<(String, Option<Version>), RuntimeType>,
}

impl TypeRegistry {
    /// Creates an empty registry whose tag grammar admits `escape` as an
    /// optional leading character.
    pub fn new(escape: char) -> Result<Self> {
        let pattern = format!(
            r"^[{}]?([^\d\W]\w*)?([.][^\d\W]\w*)*$",
            regex::escape(&escape.to_string())
        );
        let tag_grammar = Regex::new(&pattern).map_err(|_| PreserializeError::InvalidEscapeChar {
            escape: escape.to_string(),
        })?;
        Ok(Self {
            tag_grammar,
            bindings: FxHashMap::default(),
            versions: FxHashMap::default(),
            types: FxHashMap::default(),
        })
    }

    /// Returns true if `tag` is a valid wire type tag.
    pub fn is_type_name(&self, tag: &str) -> bool {
        self.tag_grammar.is_match(tag)
    }

    /// Registers one row.
    ///
    /// A versioned row becomes the encoding version of its type; an
    /// unversioned row never replaces an earlier version.
    pub fn register(&mut self, row: TypeRow) -> Result<()> {
        let TypeRow {
            ty,
            deconstructor,
            options,
        } = row;

        let Some(deconstructor) = deconstructor else {
            if !is_scalar(&ty) {
                return Err(PreserializeError::NotPassthrough {
                    type_name: ty.to_string(),
                });
            }
            debug!(ty = %ty, "registered passthrough type");
            self.bindings.insert((ty, None), None);
            return Ok(());
        };

        let name = options.name.unwrap_or_else(|| ty.default_tag());
        if !self.is_type_name(&name) {
            return Err(PreserializeError::InvalidTypeName { name });
        }
        let version = options.version;

        debug!(
            ty = %ty,
            tag = %name,
            version = %display_version(version.as_ref()),
            "registered type"
        );

        self.types.insert((name.clone(), version.clone()), ty.clone());
        if let Some(v) = &version {
            self.versions.insert(ty.clone(), v.clone());
        }
        let binding = TypeBinding::new(ty.clone(), name, version.clone(), options.ignore, deconstructor);
        self.bindings.insert((ty, version), Some(binding));
        Ok(())
    }

    /// Returns true if `ty` has any registration.
    pub fn is_registered(&self, ty: &RuntimeType) -> bool {
        self.bindings.contains_key(&(ty.clone(), self.versions.get(ty).cloned()))
    }

    /// Resolves the binding used to encode values of `ty`.
    ///
    /// `Ok(None)` means the type passes through unchanged.
    pub fn binding_for_type(&self, ty: &RuntimeType) -> Result<Option<&TypeBinding>> {
        let version = self.versions.get(ty).cloned();
        match self.bindings.get(&(ty.clone(), version)) {
            Some(binding) => Ok(binding.as_ref()),
            None => Err(PreserializeError::UnregisteredType {
                type_name: ty.to_string(),
            }),
        }
    }

    /// Resolves the binding used to decode a node tagged `(tag, version)`.
    pub fn binding_for_tag(&self, tag: &str, version: Option<&Version>) -> Result<&TypeBinding> {
        let unregistered = || PreserializeError::UnregisteredTag {
            tag: tag.to_string(),
            version: display_version(version),
        };
        let ty = self
            .types
            .get(&(tag.to_string(), version.cloned()))
            .ok_or_else(unregistered)?;
        self.bindings
            .get(&(ty.clone(), version.cloned()))
            .and_then(Option::as_ref)
            .ok_or_else(unregistered)
    }
}

fn is_scalar(ty: &RuntimeType) -> bool {
    matches!(
        ty,
        RuntimeType::Null | RuntimeType::Bool | RuntimeType::Int | RuntimeType::Float | RuntimeType::Str
    )
}
