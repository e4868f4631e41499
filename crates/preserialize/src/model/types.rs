//! Runtime type identifiers and payload versions.

use std::fmt;

use serde_json::Value;

/// A user-defined class: the runtime type of an [`Instance`](crate::model::Instance).
///
/// Classes are identified by module and name, so two classes with the same
/// name in different modules are distinct types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Class {
    module: String,
    name: String,
}

impl Class {
    /// Creates a class in the default (empty) module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: String::new(),
            name: name.into(),
        }
    }

    /// Creates a class in the given module.
    pub fn in_module(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Returns the class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the module the class lives in.
    pub fn module(&self) -> &str {
        &self.module
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.module, self.name)
        }
    }
}

/// Runtime type of an [`Object`](crate::model::Object).
///
/// This is the key the type registry dispatches on when encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Set,
    Dict,
    /// A class value (the type of a [`Node::Class`](crate::model::Node::Class)).
    Type,
    WeakRef,
    /// Instance of a user-defined class.
    Class(Class),
}

impl RuntimeType {
    /// Returns the type's name.
    pub fn name(&self) -> &str {
        match self {
            RuntimeType::Null => "NoneType",
            RuntimeType::Bool => "bool",
            RuntimeType::Int => "int",
            RuntimeType::Float => "float",
            RuntimeType::Str => "str",
            RuntimeType::List => "list",
            RuntimeType::Tuple => "tuple",
            RuntimeType::Set => "set",
            RuntimeType::Dict => "dict",
            RuntimeType::Type => "type",
            RuntimeType::WeakRef => "weakref",
            RuntimeType::Class(class) => class.name(),
        }
    }

    /// Returns the wire tag used when no name is configured: the lowercased name.
    pub fn default_tag(&self) -> String {
        self.name().to_lowercase()
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeType::Class(class) => class.fmt(f),
            other => f.write_str(other.name()),
        }
    }
}

impl From<Class> for RuntimeType {
    fn from(class: Class) -> Self {
        RuntimeType::Class(class)
    }
}

/// Identifier distinguishing payload shapes of one type over time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Int(i64),
    Str(String),
}

impl Version {
    /// Returns the wire representation.
    pub fn to_wire(&self) -> Value {
        match self {
            Version::Int(v) => Value::from(*v),
            Version::Str(s) => Value::from(s.as_str()),
        }
    }

    /// Reads a version from its wire representation.
    pub fn from_wire(value: &Value) -> Option<Version> {
        match value {
            Value::Number(n) => n.as_i64().map(Version::Int),
            Value::String(s) => Some(Version::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Int(v) => write!(f, "{}", v),
            Version::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Version {
    fn from(v: i64) -> Self {
        Version::Int(v)
    }
}

impl From<i32> for Version {
    fn from(v: i32) -> Self {
        Version::Int(v.into())
    }
}

impl From<&str> for Version {
    fn from(v: &str) -> Self {
        Version::Str(v.to_string())
    }
}

impl From<String> for Version {
    fn from(v: String) -> Self {
        Version::Str(v)
    }
}

/// Formats an optional version the way diagnostics report it.
pub(crate) fn display_version(version: Option<&Version>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tags() {
        assert_eq!(RuntimeType::Dict.default_tag(), "dict");
        assert_eq!(RuntimeType::Null.default_tag(), "nonetype");
        assert_eq!(RuntimeType::Class(Class::new("Parrot")).default_tag(), "parrot");
    }

    #[test]
    fn test_class_display() {
        assert_eq!(Class::new("Parrot").to_string(), "Parrot");
        assert_eq!(Class::in_module("zoo.birds", "Parrot").to_string(), "zoo.birds.Parrot");
    }

    #[test]
    fn test_version_wire() {
        assert_eq!(Version::from(2).to_wire(), Value::from(2));
        assert_eq!(Version::from_wire(&Value::from(2)), Some(Version::Int(2)));
        assert_eq!(Version::from_wire(&Value::from("v2")), Some(Version::from("v2")));
        assert_eq!(Version::from_wire(&Value::Bool(true)), None);
        assert_eq!(display_version(None), "None");
    }
}
