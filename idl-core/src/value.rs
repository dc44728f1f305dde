#![forbid(unsafe_code)]

use std::fmt;

use serde_json::Value as JsonValue;

use crate::types::Type;

/// A statically known IDL value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Bits(u128),
    Bool(bool),
    String(String),
    Array(Vec<Value>),
}

/// All-ones mask for `width` bits, or `None` past what a `u128` holds.
pub fn mask(width: u32) -> Option<u128> {
    match width {
        128 => Some(u128::MAX),
        w if w < 128 => Some((1u128 << w) - 1),
        _ => None,
    }
}

/// Number of bits needed to represent `value` (at least one).
pub fn bit_length(value: u128) -> u32 {
    (128 - value.leading_zeros()).max(1)
}

impl Value {
    /// Converts a configuration value. Negative and fractional numbers have no
    /// IDL representation.
    pub fn from_json(json: &JsonValue) -> Option<Value> {
        match json {
            JsonValue::Bool(b) => Some(Value::Bool(*b)),
            JsonValue::Number(n) => n.as_u64().map(|v| Value::Bits(v as u128)),
            JsonValue::String(s) => Some(Value::String(s.clone())),
            JsonValue::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            JsonValue::Null | JsonValue::Object(_) => None,
        }
    }

    pub fn as_bits(&self) -> Option<u128> {
        match self {
            Value::Bits(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Truncates bits to the static width of `ty` when that width is known.
    pub fn fit_to(self, ty: &Type) -> Value {
        match self {
            Value::Bits(v) => match ty.width().and_then(mask) {
                Some(m) => Value::Bits(v & m),
                None => Value::Bits(v),
            },
            Value::Array(items) => match ty.element_type() {
                Some(elem) => Value::Array(items.into_iter().map(|v| v.fit_to(elem)).collect()),
                None => Value::Array(items),
            },
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bits(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn masks_and_bit_lengths() {
        assert_eq!(mask(0), Some(0));
        assert_eq!(mask(5), Some(0x1f));
        assert_eq!(mask(128), Some(u128::MAX));
        assert_eq!(mask(129), None);
        assert_eq!(bit_length(0), 1);
        assert_eq!(bit_length(64), 7);
        assert_eq!(bit_length(63), 6);
    }

    #[test]
    fn converts_json_values() {
        assert_eq!(
            Value::from_json(&json!([1, 2])),
            Some(Value::Array(vec![Value::Bits(1), Value::Bits(2)]))
        );
        assert_eq!(Value::from_json(&json!(-1)), None);
        assert_eq!(Value::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn fit_truncates_to_known_width() {
        assert_eq!(Value::Bits(0x1ff).fit_to(&Type::bits(8)), Value::Bits(0xff));
        assert_eq!(
            Value::Bits(0x1ff).fit_to(&Type::bits_unknown()),
            Value::Bits(0x1ff)
        );
    }
}
