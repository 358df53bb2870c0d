//! Host values read from a simulator and their JSON normalization.
//!
//! Simulator adapters hand back loosely typed runtime state: plain scalars,
//! numeric-library wrappers, enumerations, nested containers, raw bytes. This
//! module models that state as [`HostValue`] and reduces it to JSON-safe
//! primitives with [`normalize`], which never fails.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Number, Value as Json};

/// A numeric-library scalar (a fixed-width wrapper around a native number).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericScalar {
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

/// A numeric-library array: row-major data plus its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub shape: Vec<usize>,
    pub data: Vec<NumericScalar>,
}

impl NumericArray {
    /// Creates a one-dimensional array.
    #[must_use]
    pub fn vector(data: Vec<NumericScalar>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Creates an array with an explicit shape.
    #[must_use]
    pub fn with_shape(shape: Vec<usize>, data: Vec<NumericScalar>) -> Self {
        Self { shape, data }
    }
}

/// A value read out of the simulator's object graph.
#[derive(Debug, Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Scalar(NumericScalar),
    Array(NumericArray),
    /// Enumeration-like value: reduces to `value` when present, otherwise `name`.
    Enum {
        name: String,
        value: Option<Box<HostValue>>,
    },
    Seq(Vec<HostValue>),
    /// Insertion-ordered mapping; keys need not be text.
    Map(Vec<(HostValue, HostValue)>),
    /// Anything else. Only its printable representation survives normalization.
    Opaque(Arc<dyn fmt::Debug + Send + Sync>),
}

impl HostValue {
    /// Wraps an arbitrary value that has no structured representation.
    pub fn opaque<T: fmt::Debug + Send + Sync + 'static>(value: T) -> Self {
        Self::Opaque(Arc::new(value))
    }

    /// Creates an enumeration value that reduces to its name.
    pub fn variant(name: impl Into<String>) -> Self {
        Self::Enum {
            name: name.into(),
            value: None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Scalar(_) => "scalar",
            Self::Array(_) => "array",
            Self::Enum { .. } => "enum",
            Self::Seq(_) => "seq",
            Self::Map(_) => "map",
            Self::Opaque(_) => "opaque",
        }
    }
}

impl Default for HostValue {
    fn default() -> Self {
        Self::Null
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for HostValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(v: Vec<HostValue>) -> Self {
        Self::Seq(v)
    }
}

/// Converts a host value into a JSON-safe value.
///
/// Total over every [`HostValue`]: values that have no faithful JSON form
/// (non-finite floats, opaque objects) become their printable text.
#[must_use]
pub fn normalize(value: &HostValue) -> Json {
    match value {
        HostValue::Null => Json::Null,
        HostValue::Bool(b) => Json::Bool(*b),
        HostValue::Int(i) => Json::from(*i),
        HostValue::UInt(u) => Json::from(*u),
        HostValue::Float(f) => float(*f),
        HostValue::Text(s) => Json::String(s.clone()),
        HostValue::Bytes(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
        HostValue::Scalar(s) => scalar(*s),
        HostValue::Array(array) => nested(&array.shape, &array.data),
        HostValue::Enum { name, value } => match value {
            Some(inner) => normalize(inner),
            None => Json::String(name.clone()),
        },
        HostValue::Seq(items) => Json::Array(items.iter().map(normalize).collect()),
        HostValue::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                map.insert(key_text(key), normalize(value));
            }
            Json::Object(map)
        }
        HostValue::Opaque(inner) => Json::String(format!("{inner:?}")),
    }
}

fn float(f: f64) -> Json {
    Number::from_f64(f).map_or_else(|| Json::String(f.to_string()), Json::Number)
}

fn scalar(s: NumericScalar) -> Json {
    match s {
        NumericScalar::Bool(b) => Json::Bool(b),
        NumericScalar::I64(i) => Json::from(i),
        NumericScalar::U64(u) => Json::from(u),
        NumericScalar::F32(f) => float(f64::from(f)),
        NumericScalar::F64(f) => float(f),
    }
}

fn nested(shape: &[usize], data: &[NumericScalar]) -> Json {
    let expected: Option<usize> = shape.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d));
    if shape.len() <= 1 || expected != Some(data.len()) {
        return Json::Array(data.iter().copied().map(scalar).collect());
    }

    let outer = shape[0];
    let stride = data.len() / outer.max(1);
    let rows = (0..outer)
        .map(|i| nested(&shape[1..], &data[i * stride..(i + 1) * stride]))
        .collect();
    Json::Array(rows)
}

fn key_text(key: &HostValue) -> String {
    match normalize(key) {
        Json::String(s) => s,
        other => other.to_string(),
    }
}

/// Python-style truthiness of a normalized value.
#[must_use]
pub fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(a) => !a.is_empty(),
        Json::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_normalize_primitives() {
        assert_eq!(normalize(&HostValue::Null), Json::Null);
        assert_eq!(normalize(&true.into()), json!(true));
        assert_eq!(normalize(&42i64.into()), json!(42));
        assert_eq!(normalize(&7u64.into()), json!(7));
        assert_eq!(normalize(&1.5f64.into()), json!(1.5));
        assert_eq!(normalize(&"x".into()), json!("x"));
    }

    #[test]
    fn test_normalize_bytes_replaces_invalid_utf8() {
        let value = HostValue::Bytes(vec![b'o', b'k', 0xff]);
        assert_eq!(normalize(&value), json!("ok\u{fffd}"));
    }

    #[test]
    fn test_normalize_non_finite_float_is_printable() {
        assert_eq!(normalize(&HostValue::Float(f64::NAN)), json!("NaN"));
        assert_eq!(normalize(&HostValue::Float(f64::INFINITY)), json!("inf"));
    }

    #[test]
    fn test_normalize_numeric_wrappers() {
        assert_eq!(normalize(&HostValue::Scalar(NumericScalar::Bool(true))), json!(true));
        assert_eq!(normalize(&HostValue::Scalar(NumericScalar::I64(-3))), json!(-3));
        assert_eq!(normalize(&HostValue::Scalar(NumericScalar::F32(0.5))), json!(0.5));

        let matrix = NumericArray::with_shape(
            vec![2, 2],
            vec![
                NumericScalar::I64(1),
                NumericScalar::I64(2),
                NumericScalar::I64(3),
                NumericScalar::I64(4),
            ],
        );
        assert_eq!(normalize(&HostValue::Array(matrix)), json!([[1, 2], [3, 4]]));
    }

    #[test]
    fn test_normalize_array_with_inconsistent_shape_is_flat() {
        let array = NumericArray::with_shape(vec![2, 2], vec![NumericScalar::U64(1), NumericScalar::U64(2)]);
        assert_eq!(normalize(&HostValue::Array(array)), json!([1, 2]));
    }

    #[test]
    fn test_normalize_enum_prefers_value() {
        let with_value = HostValue::Enum {
            name: "READY".to_string(),
            value: Some(Box::new(HostValue::Int(0))),
        };
        assert_eq!(normalize(&with_value), json!(0));
        assert_eq!(normalize(&HostValue::variant("READY")), json!("READY"));
    }

    #[test]
    fn test_normalize_map_preserves_insertion_order() {
        let value = HostValue::Map(vec![
            ("z".into(), 1i64.into()),
            ("a".into(), HostValue::Seq(vec![true.into(), HostValue::Null])),
            (HostValue::Int(3), "three".into()),
        ]);
        let normalized = normalize(&value);
        let keys: Vec<&String> = normalized.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "3"]);
        assert_eq!(normalized["a"], json!([true, null]));
    }

    #[test]
    fn test_normalize_opaque_falls_back_to_debug_text() {
        #[derive(Debug)]
        struct Register {
            width: u8,
        }
        let normalized = normalize(&HostValue::opaque(Register { width: 4 }));
        assert_eq!(normalized, json!("Register { width: 4 }"));
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(truthy(&json!(1)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("ready")));
        assert!(!truthy(&json!([])));
    }

    #[test]
    fn test_type_name() {
        assert_eq!(HostValue::Null.type_name(), "null");
        assert_eq!(HostValue::variant("x").type_name(), "enum");
        assert_eq!(HostValue::opaque(1u8).type_name(), "opaque");
    }
}
