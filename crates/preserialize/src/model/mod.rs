//! Data model types.
//!
//! - Object graph (shared, possibly cyclic values)
//! - Runtime types, classes and versions
//! - Paths addressing nodes within a wire tree

pub mod object;
pub mod path;
pub mod types;

pub use object::{Attributes, DictKey, Instance, Node, ObjRef, Object, WeakObj, WeakRef};
pub use path::{format_path, PathId, PathKey, PathTable, ARGS_KEY};
pub use types::{Class, RuntimeType, Version};
