//! Typed tag values.
//!
//! Tag values arrive as arbitrary JSON and are persisted as two text
//! columns: the value rendered as a string, and a discriminator naming the
//! type observed on the way in. Decoding uses the discriminator, so a
//! boolean `true` never comes back as the string `"true"`.
//!
//! | Input | Stored value | `value_type` |
//! |-------|--------------|--------------|
//! | `42` | `42` | `integer` |
//! | `2.5` | `2.5` | `float` |
//! | `true` | `true` | `boolean` |
//! | `"abc"` | `abc` | `string` |
//! | `null` | `null` | `null` |
//! | `[1, 2]`, `{"a": 1}` | compact JSON text | `string` |
//!
//! The short spellings `int`, `bool`, `str` and `NoneType` are still read.
//!
//! Encoding is total: shapes outside the supported set fall back to their
//! string form. Decoding is total as well: text that does not parse as its
//! claimed type yields [`TagValue::Unrepresentable`].

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Stored spelling of the null value.
const NULL_TEXT: &str = "null";

/// Type discriminator persisted alongside every tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Float,
    Bool,
    Str,
    Null,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int => "integer",
            ValueType::Float => "float",
            ValueType::Bool => "boolean",
            ValueType::Str => "string",
            ValueType::Null => "null",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" | "integer" => Ok(ValueType::Int),
            "float" | "double" => Ok(ValueType::Float),
            "bool" | "boolean" => Ok(ValueType::Bool),
            "str" | "string" => Ok(ValueType::Str),
            "null" | "NoneType" => Ok(ValueType::Null),
            other => Err(format!("unknown value type: '{}'", other)),
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A tag value with its type made explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Null,
    /// Stored text that could not be read back as the type it claims.
    ///
    /// Never equal to a supported value and rendered as JSON `null` in
    /// typed views.
    Unrepresentable { raw: String, claimed: String },
}

impl TagValue {
    /// Lift an arbitrary JSON value into the supported set.
    ///
    /// Arrays, objects, and integers that do not fit `i64` become strings.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => TagValue::Null,
            Value::Bool(b) => TagValue::Boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    TagValue::Integer(i)
                } else if n.is_f64() {
                    n.as_f64()
                        .map(TagValue::Float)
                        .unwrap_or_else(|| TagValue::String(n.to_string()))
                } else {
                    TagValue::String(n.to_string())
                }
            }
            Value::String(s) => TagValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => TagValue::String(value.to_string()),
        }
    }

    /// Guess a type for free text, e.g. a `key=value` argument.
    ///
    /// `true`/`false` (any case) become booleans, numeric literals become
    /// integers or floats, `None`/`null` become null. Anything else stays a
    /// string.
    pub fn infer_from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return TagValue::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return TagValue::Boolean(false);
        }
        if trimmed == NULL_TEXT || trimmed == "None" {
            return TagValue::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return TagValue::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return TagValue::Float(f);
            }
        }
        TagValue::String(text.to_string())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            TagValue::Integer(_) => ValueType::Int,
            TagValue::Float(_) => ValueType::Float,
            TagValue::Boolean(_) => ValueType::Bool,
            TagValue::String(_) | TagValue::Unrepresentable { .. } => ValueType::Str,
            TagValue::Null => ValueType::Null,
        }
    }

    /// Render to the stored `(value, value_type)` pair.
    pub fn encode(&self) -> (String, ValueType) {
        let text = match self {
            TagValue::Integer(i) => i.to_string(),
            // Debug formatting is the shortest text that parses back to the same f64.
            TagValue::Float(f) => format!("{:?}", f),
            TagValue::Boolean(b) => b.to_string(),
            TagValue::String(s) => s.clone(),
            TagValue::Null => NULL_TEXT.to_string(),
            TagValue::Unrepresentable { raw, .. } => raw.clone(),
        };
        (text, self.value_type())
    }

    pub fn to_json(&self) -> Value {
        match self {
            TagValue::Integer(i) => Value::from(*i),
            TagValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TagValue::Boolean(b) => Value::Bool(*b),
            TagValue::String(s) => Value::String(s.clone()),
            TagValue::Null | TagValue::Unrepresentable { .. } => Value::Null,
        }
    }

    pub fn is_unrepresentable(&self) -> bool {
        matches!(self, TagValue::Unrepresentable { .. })
    }
}

impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Encode an arbitrary JSON value for storage.
pub fn encode(value: &Value) -> (String, ValueType) {
    TagValue::from_json(value).encode()
}

/// Decode a stored `(value, value_type)` pair.
///
/// Never fails: malformed text or an unknown discriminator produces
/// [`TagValue::Unrepresentable`].
pub fn decode(stored: &str, type_tag: &str) -> TagValue {
    let sentinel = || TagValue::Unrepresentable {
        raw: stored.to_string(),
        claimed: type_tag.to_string(),
    };

    match type_tag.parse::<ValueType>() {
        Ok(ValueType::Int) => stored
            .trim()
            .parse::<i64>()
            .map(TagValue::Integer)
            .unwrap_or_else(|_| sentinel()),
        Ok(ValueType::Float) => stored
            .trim()
            .parse::<f64>()
            .map(TagValue::Float)
            .unwrap_or_else(|_| sentinel()),
        Ok(ValueType::Bool) => {
            if stored.eq_ignore_ascii_case("true") {
                TagValue::Boolean(true)
            } else if stored.eq_ignore_ascii_case("false") {
                TagValue::Boolean(false)
            } else {
                sentinel()
            }
        }
        Ok(ValueType::Str) => TagValue::String(stored.to_string()),
        Ok(ValueType::Null) => TagValue::Null,
        Err(_) => sentinel(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(value: TagValue) {
        let (text, ty) = value.encode();
        assert_eq!(decode(&text, ty.as_str()), value, "stored as {:?}", text);
    }

    #[test]
    fn test_round_trip_supported_types() {
        round_trip(TagValue::Integer(0));
        round_trip(TagValue::Integer(-17));
        round_trip(TagValue::Integer(i64::MAX));
        round_trip(TagValue::Integer(i64::MIN));
        round_trip(TagValue::Float(2.5));
        round_trip(TagValue::Float(0.1));
        round_trip(TagValue::Float(1.0));
        round_trip(TagValue::Float(-1.0e-300));
        round_trip(TagValue::Float(f64::MAX));
        round_trip(TagValue::Boolean(true));
        round_trip(TagValue::Boolean(false));
        round_trip(TagValue::String("finance".into()));
        round_trip(TagValue::String(String::new()));
        round_trip(TagValue::String("None".into()));
        round_trip(TagValue::Null);
    }

    #[test]
    fn test_encode_records_observed_type() {
        assert_eq!(encode(&json!(42)), ("42".to_string(), ValueType::Int));
        assert_eq!(encode(&json!(2.5)), ("2.5".to_string(), ValueType::Float));
        assert_eq!(encode(&json!(true)), ("true".to_string(), ValueType::Bool));
        assert_eq!(encode(&json!("true")), ("true".to_string(), ValueType::Str));
        assert_eq!(encode(&json!(null)), ("null".to_string(), ValueType::Null));
    }

    #[test]
    fn test_boolean_does_not_decode_as_string() {
        let (text, ty) = encode(&json!(true));
        assert_eq!(decode(&text, ty.as_str()), TagValue::Boolean(true));

        let (text, ty) = encode(&json!("true"));
        assert_eq!(decode(&text, ty.as_str()), TagValue::String("true".into()));
    }

    #[test]
    fn test_unsupported_shapes_fall_back_to_string() {
        assert_eq!(
            encode(&json!([1, 2, 3])),
            ("[1,2,3]".to_string(), ValueType::Str)
        );
        assert_eq!(
            encode(&json!({"a": 1})),
            (r#"{"a":1}"#.to_string(), ValueType::Str)
        );
        assert_eq!(
            encode(&json!(u64::MAX)),
            (u64::MAX.to_string(), ValueType::Str)
        );
    }

    #[test]
    fn test_decode_malformed_yields_sentinel() {
        let v = decode("forty-two", "int");
        assert!(v.is_unrepresentable());
        assert_eq!(v.to_json(), Value::Null);

        assert!(decode("1.2.3", "float").is_unrepresentable());
        assert!(decode("yes", "bool").is_unrepresentable());
        assert!(decode("whatever", "complex").is_unrepresentable());
    }

    #[test]
    fn test_sentinel_never_equals_a_real_value() {
        let v = decode("abc", "int");
        assert_ne!(v, TagValue::String("abc".into()));
        assert_ne!(v, TagValue::Null);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ValueType::Int.as_str(), "integer");
        assert_eq!(ValueType::Float.as_str(), "float");
        assert_eq!(ValueType::Bool.as_str(), "boolean");
        assert_eq!(ValueType::Str.as_str(), "string");
        assert_eq!(ValueType::Null.as_str(), "null");
    }

    #[test]
    fn test_decode_accepts_short_type_names() {
        assert_eq!(decode("7", "int"), TagValue::Integer(7));
        assert_eq!(decode("x", "str"), TagValue::String("x".into()));
        assert_eq!(decode("TRUE", "bool"), TagValue::Boolean(true));
        assert_eq!(decode("None", "NoneType"), TagValue::Null);
    }

    #[test]
    fn test_infer_from_text() {
        assert_eq!(TagValue::infer_from_text("42"), TagValue::Integer(42));
        assert_eq!(TagValue::infer_from_text("-3.5"), TagValue::Float(-3.5));
        assert_eq!(TagValue::infer_from_text("True"), TagValue::Boolean(true));
        assert_eq!(TagValue::infer_from_text("false"), TagValue::Boolean(false));
        assert_eq!(TagValue::infer_from_text("None"), TagValue::Null);
        assert_eq!(
            TagValue::infer_from_text("finance"),
            TagValue::String("finance".into())
        );
        assert_eq!(
            TagValue::infer_from_text("inf"),
            TagValue::String("inf".into())
        );
    }

    #[test]
    fn test_serialize_as_plain_json() {
        let out = serde_json::to_value(TagValue::Float(1.5)).unwrap();
        assert_eq!(out, json!(1.5));
        let out = serde_json::to_value(ValueType::Null).unwrap();
        assert_eq!(out, json!("null"));
    }
}
