//! The deconstructor contract.
//!
//! A [`Deconstructor`] decomposes one object into positional arguments and/or
//! an attribute mapping, and rebuilds it in two phases: [`make_shell`]
//! allocates an addressable object, then [`setattr`] populates it. The second
//! phase is also how deferred references close cycles once every object has
//! been constructed.
//!
//! A deconstructor is stateless; everything specific to one registered
//! (type, version) pair lives in the [`TypeBinding`] passed to each call.
//!
//! [`make_shell`]: Deconstructor::make_shell
//! [`setattr`]: Deconstructor::setattr

pub mod builtins;
pub mod weakref;

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::error::{PreserializeError, Result};
use crate::model::{Attributes, Object, PathKey, RuntimeType, Version};

pub use builtins::{
    ClassResolver, ClassTable, DictDeconstructor, InstanceDeconstructor, IterableDeconstructor,
    TypeDeconstructor,
};
pub use weakref::WeakRefDeconstructor;

/// Decomposition of one object.
#[derive(Debug, Clone, Default)]
pub struct Parts {
    /// Positional arguments, written under the empty key.
    pub args: Option<Vec<Object>>,
    /// Attributes, written under their escaped keys.
    pub kwargs: Option<Attributes>,
}

impl Parts {
    /// Decomposition into positional arguments only.
    pub fn args(args: Vec<Object>) -> Self {
        Self {
            args: Some(args),
            kwargs: None,
        }
    }

    /// Decomposition into attributes only.
    pub fn kwargs(kwargs: Attributes) -> Self {
        Self {
            args: None,
            kwargs: Some(kwargs),
        }
    }
}

/// Per-type decomposition and two-phase reconstruction.
pub trait Deconstructor: fmt::Debug + Send + Sync {
    /// Decomposes `obj` without side effects.
    fn deconstruct(&self, binding: &TypeBinding, obj: &Object) -> Result<Parts>;

    /// Allocates an object of the bound type.
    ///
    /// With non-empty `args` this is a positional initializer; with empty
    /// `args` it is an empty, field-settable shell.
    fn make_shell(&self, binding: &TypeBinding, args: Vec<Object>) -> Result<Object>;

    /// Assigns `value` at `key` on an already allocated object.
    fn setattr(&self, binding: &TypeBinding, obj: &Object, key: &PathKey, value: Object) -> Result<()>;

    /// Builds an object from decoded arguments and attributes.
    fn construct(&self, binding: &TypeBinding, args: Vec<Object>, kwargs: Attributes) -> Result<Object> {
        let obj = self.make_shell(binding, args)?;
        for (key, value) in kwargs {
            self.setattr(binding, &obj, &PathKey::Key(key), value)?;
        }
        Ok(obj)
    }

    /// Re-applies a resolved reference nested below a positional argument.
    ///
    /// `arg_path` starts at the argument index. Deconstructors that copy
    /// values out of their arguments (rather than keeping them) must patch
    /// the copy here; the default does nothing.
    fn relink_arg(
        &self,
        _binding: &TypeBinding,
        _obj: &Object,
        _arg_path: &[PathKey],
        _value: &Object,
    ) -> Result<()> {
        Ok(())
    }
}

/// A deconstructor bound to one registered (type, version) pair.
#[derive(Debug, Clone)]
pub struct TypeBinding {
    ty: RuntimeType,
    name: String,
    version: Option<Version>,
    ignore: FxHashSet<String>,
    deconstructor: Arc<dyn Deconstructor>,
}

impl TypeBinding {
    pub(crate) fn new(
        ty: RuntimeType,
        name: String,
        version: Option<Version>,
        ignore: FxHashSet<String>,
        deconstructor: Arc<dyn Deconstructor>,
    ) -> Self {
        Self {
            ty,
            name,
            version,
            ignore,
            deconstructor,
        }
    }

    /// Returns the bound runtime type.
    pub fn runtime_type(&self) -> &RuntimeType {
        &self.ty
    }

    /// Returns the wire type tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the payload version, if any.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Returns true if attribute `key` is excluded from decomposition.
    pub fn ignores(&self, key: &str) -> bool {
        self.ignore.contains(key)
    }

    /// See [`Deconstructor::deconstruct`].
    pub fn deconstruct(&self, obj: &Object) -> Result<Parts> {
        self.deconstructor.deconstruct(self, obj)
    }

    /// See [`Deconstructor::construct`].
    pub fn construct(&self, args: Vec<Object>, kwargs: Attributes) -> Result<Object> {
        self.deconstructor.construct(self, args, kwargs)
    }

    /// See [`Deconstructor::setattr`].
    pub fn setattr(&self, obj: &Object, key: &PathKey, value: Object) -> Result<()> {
        self.deconstructor.setattr(self, obj, key, value)
    }

    /// See [`Deconstructor::relink_arg`].
    pub fn relink_arg(&self, obj: &Object, arg_path: &[PathKey], value: &Object) -> Result<()> {
        self.deconstructor.relink_arg(self, obj, arg_path, value)
    }

    pub(crate) fn mismatch(&self, found: &Object) -> PreserializeError {
        PreserializeError::TypeMismatch {
            expected: self.ty.to_string(),
            found: found.runtime_type().to_string(),
        }
    }

    pub(crate) fn unsupported_attribute(&self, key: &PathKey) -> PreserializeError {
        PreserializeError::UnsupportedAttribute {
            type_name: self.ty.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn bad_arguments(&self, context: &'static str) -> PreserializeError {
        PreserializeError::BadArguments {
            type_name: self.ty.to_string(),
            context,
        }
    }
}
