//! JSON Reference markers with JSON Pointer addresses.
//!
//! A reference is the single-key mapping `{"$ref": "#<pointer>"}` where the
//! pointer is an RFC 6901 JSON Pointer (`~` escaped as `~0`, `/` as `~1`).
//! Only same-document references (leading `#`) are supported.

use serde_json::{Map, Value};

use crate::error::{PreserializeError, Result};
use crate::link::ReferenceScheme;
use crate::model::PathKey;

/// Marker key of JSON References.
pub const REF_KEY: &str = "$ref";

/// The default, address-based reference scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReference;

impl ReferenceScheme for JsonReference {
    fn key(&self) -> &str {
        REF_KEY
    }

    fn is_ref(&self, value: &Value) -> bool {
        match value {
            Value::Object(map) => map.len() == 1 && map.contains_key(REF_KEY),
            _ => false,
        }
    }

    fn make_ref(&self, path: &[PathKey]) -> Value {
        let mut map = Map::with_capacity(1);
        map.insert(REF_KEY.to_string(), Value::String(format!("#{}", to_pointer(path))));
        Value::Object(map)
    }

    fn ref_path(&self, marker: &Value) -> Result<Vec<PathKey>> {
        let address = match marker.get(REF_KEY) {
            Some(Value::String(address)) => address,
            other => {
                return Err(PreserializeError::UnsupportedReference {
                    reference: other.map(Value::to_string).unwrap_or_default(),
                });
            }
        };
        let unsupported = || PreserializeError::UnsupportedReference {
            reference: address.clone(),
        };
        let pointer = address.strip_prefix('#').ok_or_else(unsupported)?;
        parse_pointer(pointer).ok_or_else(unsupported)
    }
}

/// Formats `path` as a JSON Pointer.
pub fn to_pointer(path: &[PathKey]) -> String {
    let mut out = String::new();
    for key in path {
        out.push('/');
        match key {
            PathKey::Key(k) => out.push_str(&k.replace('~', "~0").replace('/', "~1")),
            PathKey::Index(i) => out.push_str(&i.to_string()),
        }
    }
    out
}

/// Parses a JSON Pointer, coercing decimal segments to indices.
///
/// Returns `None` if the pointer is not empty and does not start with `/`,
/// or if it contains a `~` not followed by `0` or `1`.
pub fn parse_pointer(pointer: &str) -> Option<Vec<PathKey>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    rest.split('/')
        .map(|segment| unescape(segment).map(|s| PathKey::from_segment(&s)))
        .collect()
}

fn unescape(segment: &str) -> Option<String> {
    if !segment.contains('~') {
        return Some(segment.to_string());
    }
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}
