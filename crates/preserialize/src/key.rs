//! Bijective attribute-key encoders.
//!
//! Attribute keys are written into the same wire mapping as the reserved
//! control keys (`$type`, `$version`, and the positional-arguments key `""`).
//! [`IdentifierEscapeEncoder`] guarantees they can never collide: it accepts
//! only identifier-like keys and doubles the escape character. Other encoders
//! can be layered on top with [`KeyEncoder::compose`].

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{PreserializeError, Result};
use crate::model::ARGS_KEY;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[^\d\W]\w*$").expect("identifier pattern is valid");
    static ref WORD_CHAR: Regex = Regex::new(r"^\w$").expect("word pattern is valid");
}

/// Returns true if `s` is an identifier: a letter or `_`, then word characters.
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER.is_match(s)
}

/// A bijective string transform on attribute keys.
///
/// `decode(encode(k)) == k` must hold for every key `encode` accepts.
pub trait KeyEncoder: fmt::Debug + Send + Sync {
    /// Encodes an attribute key, or rejects it.
    fn encode(&self, key: &str) -> Result<String>;

    /// Reverses [`encode`](KeyEncoder::encode).
    fn decode(&self, key: &str) -> Result<String>;

    /// Chains `inner` before `self`: encoding applies `inner` first, decoding
    /// applies `self` first.
    fn compose<E: KeyEncoder>(self, inner: E) -> ComposedEncoder<Self, E>
    where
        Self: Sized,
    {
        ComposedEncoder { outer: self, inner }
    }
}

impl KeyEncoder for Box<dyn KeyEncoder> {
    fn encode(&self, key: &str) -> Result<String> {
        (**self).encode(key)
    }

    fn decode(&self, key: &str) -> Result<String> {
        (**self).decode(key)
    }
}

/// Leaves keys unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityEncoder;

impl KeyEncoder for IdentityEncoder {
    fn encode(&self, key: &str) -> Result<String> {
        Ok(key.to_string())
    }

    fn decode(&self, key: &str) -> Result<String> {
        Ok(key.to_string())
    }
}

/// Two encoders applied right-to-left.
#[derive(Debug, Clone)]
pub struct ComposedEncoder<A, B> {
    outer: A,
    inner: B,
}

impl<A: KeyEncoder, B: KeyEncoder> KeyEncoder for ComposedEncoder<A, B> {
    fn encode(&self, key: &str) -> Result<String> {
        self.outer.encode(&self.inner.encode(key)?)
    }

    fn decode(&self, key: &str) -> Result<String> {
        self.inner.decode(&self.outer.decode(key)?)
    }
}

/// Wraps keys in double quotes, backslash-escaping `\` and `"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleQuoteEncoder;

impl KeyEncoder for DoubleQuoteEncoder {
    fn encode(&self, key: &str) -> Result<String> {
        let mut out = String::with_capacity(key.len() + 2);
        out.push('"');
        for c in key.chars() {
            if c == '\\' || c == '"' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
        Ok(out)
    }

    fn decode(&self, key: &str) -> Result<String> {
        let inner = key
            .strip_prefix('"')
            .and_then(|k| k.strip_suffix('"'))
            .ok_or_else(|| PreserializeError::InvalidKeyName { key: key.to_string() })?;

        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(PreserializeError::InvalidKeyName { key: key.to_string() }),
                }
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }
}

/// Accepts identifier keys and escapes them with a non-word escape character.
///
/// - `""` (the positional-arguments sentinel) encodes to the escape character
/// - any other key must be an identifier; the escape character is doubled
#[derive(Debug, Clone)]
pub struct IdentifierEscapeEncoder {
    escape: char,
    single: String,
    double: String,
}

impl IdentifierEscapeEncoder {
    /// Creates an encoder. The escape character must not be a word character,
    /// otherwise escaped keys could collide with reserved keys.
    pub fn new(escape: char) -> Result<Self> {
        let single = escape.to_string();
        if WORD_CHAR.is_match(&single) {
            return Err(PreserializeError::InvalidEscapeChar { escape: single });
        }
        Ok(Self {
            escape,
            double: format!("{0}{0}", escape),
            single,
        })
    }

    /// Returns the escape character.
    pub fn escape(&self) -> char {
        self.escape
    }
}

impl KeyEncoder for IdentifierEscapeEncoder {
    fn encode(&self, key: &str) -> Result<String> {
        if key == ARGS_KEY {
            return Ok(self.single.clone());
        }
        if !is_identifier(key) {
            return Err(PreserializeError::InvalidKeyName { key: key.to_string() });
        }
        Ok(key.replace(self.escape, &self.double))
    }

    fn decode(&self, key: &str) -> Result<String> {
        if key == self.single {
            return Ok(ARGS_KEY.to_string());
        }
        Ok(key.replace(&self.double, &self.single))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("brian"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("from_egg2"));
        assert!(is_identifier("café"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("naughty boy"));
        assert!(!is_identifier("$type"));
    }

    #[test]
    fn test_escape_encoder() {
        let enc = IdentifierEscapeEncoder::new('$').unwrap();
        assert_eq!(enc.encode("brian").unwrap(), "brian");
        assert_eq!(enc.encode("").unwrap(), "$");
        assert_eq!(enc.decode("$").unwrap(), "");
        assert_eq!(enc.decode("a$$b").unwrap(), "a$b");
        assert!(matches!(
            enc.encode("not valid"),
            Err(PreserializeError::InvalidKeyName { .. })
        ));
    }

    #[test]
    fn test_escape_must_not_be_word_char() {
        assert!(matches!(
            IdentifierEscapeEncoder::new('r'),
            Err(PreserializeError::InvalidEscapeChar { .. })
        ));
        assert!(IdentifierEscapeEncoder::new('@').is_ok());
    }

    #[test]
    fn test_double_quote_encoder() {
        let enc = DoubleQuoteEncoder;
        assert_eq!(enc.encode(r#"say "Ni!""#).unwrap(), r#""say \"Ni!\"""#);
        assert_eq!(enc.encode(r"a\b").unwrap(), r#""a\\b""#);
        assert_eq!(enc.decode(r#""say \"Ni!\"""#).unwrap(), r#"say "Ni!""#);
        assert!(enc.decode("unquoted").is_err());
    }

    #[test]
    fn test_identity_encoder() {
        let enc = IdentityEncoder;
        assert_eq!(enc.encode("naughty boy").unwrap(), "naughty boy");
        assert_eq!(enc.decode("$$").unwrap(), "$$");

        // As the outer layer it leaves the escape encoder's output unchanged.
        let composed = IdentityEncoder.compose(IdentifierEscapeEncoder::new('$').unwrap());
        assert_eq!(composed.encode("").unwrap(), "$");
        assert_eq!(composed.decode("a$$b").unwrap(), "a$b");
        assert!(composed.encode("naughty boy").is_err());
    }

    #[test]
    fn test_composition_order() {
        let enc = DoubleQuoteEncoder.compose(IdentifierEscapeEncoder::new('$').unwrap());
        assert_eq!(enc.encode("brian").unwrap(), "\"brian\"");
        assert_eq!(enc.encode("").unwrap(), "\"$\"");
        assert_eq!(enc.decode("\"$\"").unwrap(), "");
        assert!(enc.encode("two words").is_err());
    }

    proptest! {
        #[test]
        fn prop_escape_inverse(key in "[a-zA-Z_][a-zA-Z0-9_]{0,16}") {
            let enc = IdentifierEscapeEncoder::new('$').unwrap();
            let encoded = enc.encode(&key).unwrap();
            prop_assert!(!encoded.starts_with('$'));
            prop_assert_eq!(enc.decode(&encoded).unwrap(), key);
        }

        #[test]
        fn prop_double_quote_inverse(key in any::<String>()) {
            let enc = DoubleQuoteEncoder;
            prop_assert_eq!(enc.decode(&enc.encode(&key).unwrap()).unwrap(), key);
        }

        #[test]
        fn prop_composed_inverse(key in "[a-z_][a-z0-9_]{0,16}") {
            let enc = DoubleQuoteEncoder.compose(IdentifierEscapeEncoder::new('$').unwrap());
            prop_assert_eq!(enc.decode(&enc.encode(&key).unwrap()).unwrap(), key);
        }
    }
}
