//! Preserialize: cycle-safe object graphs to JSON-safe trees and back.
//!
//! This crate converts a graph of typed objects, which may share nodes and
//! contain cycles, into a tree made only of scalars, sequences and string-keyed
//! mappings (a "wire tree"), and rebuilds an equivalent graph from such a
//! tree. Shared nodes and cycles survive the round trip with identity intact.
//!
//! # Overview
//!
//! - **Identity-based linking**: the first visit of an object writes its full
//!   substructure; every later visit writes a reference marker to that path
//! - **Two-phase construction**: objects are allocated, then patched, so a
//!   cycle can be closed once both ends exist
//! - **Stack-safe**: both directions run on an explicit frame stack
//!
//! # Quick Start
//!
//! ```rust
//! use preserialize::{Class, InstanceDeconstructor, Object, Preserializer, TypeRow};
//!
//! let mut p = Preserializer::json().unwrap();
//! p.register(TypeRow::with(Class::new("Parrot"), InstanceDeconstructor)).unwrap();
//!
//! // The same parrot twice: the second visit becomes a reference
//! let parrot = Object::instance(Class::new("Parrot"), [("is_dead".to_string(), Object::Bool(true))]);
//! let list = Object::list([parrot.clone(), parrot.clone()]);
//!
//! let data = p.preserialize(&list).unwrap();
//! assert_eq!(
//!     serde_json::to_string(&data).unwrap(),
//!     r##"[{"$type":"parrot","is_dead":true},{"$ref":"#/0"}]"##
//! );
//!
//! let decoded = p.depreserialize(&data).unwrap();
//! assert!(decoded.item(0).unwrap().ptr_eq(&decoded.item(1).unwrap()));
//! ```
//!
//! # Modules
//!
//! - [`model`]: Object graph, runtime types, versions and paths
//! - [`deconstruct`]: The deconstructor contract and built-in adapters
//! - [`registry`]: Type registration and lookup
//! - [`key`]: Bijective attribute-key encoders
//! - [`link`]: Reference schemes, identity tracking and deferred patches
//! - [`codec`]: The preserializer and its traversal engines
//! - [`error`]: Error types
//! - [`limits`]: Depth and size limits for a single pass
//!
//! # Wire Format
//!
//! A tagged mapping carries reserved keys built from the reference scheme's
//! escape character (`$` for JSON References):
//! - `$type`: the registered type tag
//! - `$version`: the payload version, when the type is versioned
//! - `""`: positional arguments, as a list
//!
//! Every other key is an escaped attribute name. Lists are written as plain
//! sequences and registered scalars as themselves.

pub mod codec;
pub mod deconstruct;
pub mod error;
pub mod key;
pub mod limits;
pub mod link;
pub mod model;
pub mod registry;

// Re-export commonly used types at crate root
pub use codec::{json_types, JsonPreserializer, Preserializer, PreserializerBuilder};
pub use deconstruct::{
    ClassResolver, ClassTable, Deconstructor, DictDeconstructor, InstanceDeconstructor,
    IterableDeconstructor, Parts, TypeBinding, TypeDeconstructor, WeakRefDeconstructor,
};
pub use error::{ErrorKind, PreserializeError, Result};
pub use key::{ComposedEncoder, DoubleQuoteEncoder, IdentifierEscapeEncoder, IdentityEncoder, KeyEncoder};
pub use limits::Limits;
pub use link::{JsonReference, Link, LinkManager, ReferenceScheme};
pub use model::{
    Attributes, Class, DictKey, Instance, Node, ObjRef, Object, PathId, PathKey, RuntimeType, Version,
    WeakObj, WeakRef,
};
pub use registry::{TypeOptions, TypeRegistry, TypeRow};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
