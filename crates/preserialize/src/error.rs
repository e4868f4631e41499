//! Error types for pre-serialization and de-pre-serialization.

use thiserror::Error;

/// Error classes, each with a stable short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// P001: Type or tag has no registered deconstructor
    UnregisteredType,
    /// P002: Wire type tag fails the dotted-identifier grammar
    InvalidTypeName,
    /// P003: Attribute key cannot be escaped into a valid token
    InvalidKeyName,
    /// P004: Reference marker address does not match the reference syntax
    UnsupportedReference,
    /// P005: Data or object does not have the expected shape
    MalformedData,
    /// P006: Configured depth/size limit exceeded
    LimitExceeded,
}

impl ErrorKind {
    /// Returns the error code string (e.g., "P001").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::UnregisteredType => "P001",
            ErrorKind::InvalidTypeName => "P002",
            ErrorKind::InvalidKeyName => "P003",
            ErrorKind::UnsupportedReference => "P004",
            ErrorKind::MalformedData => "P005",
            ErrorKind::LimitExceeded => "P006",
        }
    }
}

/// Error raised while configuring a preserializer or during a single pass.
///
/// Every error aborts the whole call; there is no partial result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreserializeError {
    // === P001: Unregistered type ===
    #[error("[P001] cannot pre-serialize {type_name}")]
    UnregisteredType { type_name: String },

    #[error("[P001] cannot de-pre-serialize {tag} version: {version}")]
    UnregisteredTag { tag: String, version: String },

    #[error("[P001] mapping at {path:?} has no type tag")]
    MissingTypeTag { path: String },

    #[error("[P001] {type_name} is not a scalar and needs a deconstructor")]
    NotPassthrough { type_name: String },

    // === P002: Invalid type name ===
    #[error("[P002] cannot use {name:?} as type name")]
    InvalidTypeName { name: String },

    // === P003: Invalid key name ===
    #[error("[P003] not a valid key name: {key:?}")]
    InvalidKeyName { key: String },

    #[error("[P003] encoded key {key:?} collides with a reserved key")]
    ReservedKeyCollision { key: String },

    #[error("[P003] escape character {escape:?} is not usable (empty, or valid inside identifiers)")]
    InvalidEscapeChar { escape: String },

    // === P004: Unsupported reference ===
    #[error("[P004] unsupported reference: {reference}")]
    UnsupportedReference { reference: String },

    // === P005: Malformed data ===
    #[error("[P005] reference to {path:?} was never constructed")]
    DanglingReference { path: String },

    #[error("[P005] malformed data at {path:?}: {context}")]
    MalformedData { path: String, context: &'static str },

    #[error("[P005] float value {value} cannot be represented in the wire tree")]
    NonFiniteFloat { value: f64 },

    #[error("[P005] {type_name} has no settable attribute {key}")]
    UnsupportedAttribute { type_name: String, key: String },

    #[error("[P005] invalid positional arguments for {type_name}: {context}")]
    BadArguments { type_name: String, context: &'static str },

    #[error("[P005] deconstructor for {expected} applied to {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("[P005] {type_name} cannot be used as a mapping key")]
    UnhashableKey { type_name: String },

    #[error("[P005] cannot resolve class {module}.{name}")]
    UnknownClass { module: String, name: String },

    // === P006: Limits ===
    #[error("[P006] {limit} exceeds maximum {max}")]
    LimitExceeded { limit: &'static str, max: usize },
}

impl PreserializeError {
    /// Returns the error class for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PreserializeError::UnregisteredType { .. }
            | PreserializeError::UnregisteredTag { .. }
            | PreserializeError::MissingTypeTag { .. }
            | PreserializeError::NotPassthrough { .. } => ErrorKind::UnregisteredType,
            PreserializeError::InvalidTypeName { .. } => ErrorKind::InvalidTypeName,
            PreserializeError::InvalidKeyName { .. }
            | PreserializeError::ReservedKeyCollision { .. }
            | PreserializeError::InvalidEscapeChar { .. } => ErrorKind::InvalidKeyName,
            PreserializeError::UnsupportedReference { .. } => ErrorKind::UnsupportedReference,
            PreserializeError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            _ => ErrorKind::MalformedData,
        }
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = PreserializeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = PreserializeError::UnregisteredTag {
            tag: "parrot".to_string(),
            version: "3".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UnregisteredType);
        assert_eq!(err.code(), "P001");
        assert_eq!(err.to_string(), "[P001] cannot de-pre-serialize parrot version: 3");

        let err = PreserializeError::DanglingReference { path: "/a".to_string() };
        assert_eq!(err.code(), "P005");
    }

    #[test]
    fn test_reference_error_message() {
        let err = PreserializeError::UnsupportedReference {
            reference: "http://example.com/#/a".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedReference);
        assert!(err.to_string().contains("http://example.com/#/a"));
    }
}
