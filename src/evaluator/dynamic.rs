//! Duck-typed data (JSON-like nested maps and arrays) addressable from expressions.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::types::TypeTag;
use super::value::{TypedValue, Value};

/// A dynamic object: a keyed object, an indexed array, or a scalar value
#[derive(Clone)]
pub enum DynamicValue {
    Object(Arc<IndexMap<String, DynamicValue>>),
    Array(Arc<Vec<DynamicValue>>),
    Value(Value),
}

impl DynamicValue {
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, DynamicValue)>) -> Self {
        DynamicValue::Object(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn array(items: impl IntoIterator<Item = DynamicValue>) -> Self {
        DynamicValue::Array(Arc::new(items.into_iter().collect()))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, DynamicValue::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DynamicValue::Array(_))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, DynamicValue::Value(_))
    }

    /// Keyed lookup on objects
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        match self {
            DynamicValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Indexed lookup on arrays
    pub fn index(&self, index: usize) -> Option<&DynamicValue> {
        match self {
            DynamicValue::Array(items) => items.get(index),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DynamicValue::Object(map) => map.len(),
            DynamicValue::Array(items) => items.len(),
            DynamicValue::Value(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unwrap scalars to plain typed values; objects and arrays stay dynamic
    pub fn to_typed(&self) -> TypedValue {
        match self {
            DynamicValue::Value(value) => TypedValue::new(value.clone(), TypeTag::Object),
            other => TypedValue::of(Value::Dynamic(Arc::new(other.clone()))),
        }
    }

    /// Items produced by `foreach`: array elements, or object values in key order
    pub fn items(&self) -> Vec<TypedValue> {
        match self {
            DynamicValue::Object(map) => map.values().map(DynamicValue::to_typed).collect(),
            DynamicValue::Array(items) => items.iter().map(DynamicValue::to_typed).collect(),
            DynamicValue::Value(_) => Vec::new(),
        }
    }

    pub fn equals(&self, other: &DynamicValue) -> bool {
        match (self, other) {
            (DynamicValue::Object(a), DynamicValue::Object(b)) => Arc::ptr_eq(a, b),
            (DynamicValue::Array(a), DynamicValue::Array(b)) => Arc::ptr_eq(a, b),
            (DynamicValue::Value(a), DynamicValue::Value(b)) => a.equals(b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for DynamicValue {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => DynamicValue::Value(Value::Null),
            serde_json::Value::Bool(b) => DynamicValue::Value(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                let value = if let Some(i) = n.as_i64() {
                    i32::try_from(i).map_or(Value::Long(i), Value::Int)
                } else if let Some(u) = n.as_u64() {
                    Value::ULong(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                };
                DynamicValue::Value(value)
            }
            serde_json::Value::String(s) => DynamicValue::Value(Value::String(Arc::from(s))),
            serde_json::Value::Array(items) => {
                DynamicValue::array(items.into_iter().map(DynamicValue::from))
            }
            serde_json::Value::Object(map) => {
                DynamicValue::object(map.into_iter().map(|(k, v)| (k, DynamicValue::from(v))))
            }
        }
    }
}

impl From<Value> for DynamicValue {
    fn from(value: Value) -> Self {
        DynamicValue::Value(value)
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicValue::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            DynamicValue::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            DynamicValue::Value(Value::String(s)) => write!(f, "\"{}\"", s),
            DynamicValue::Value(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_shapes() {
        let data = DynamicValue::from(json!({
            "name": "widget",
            "sizes": [1, 2, 3],
            "big": 5_000_000_000i64,
            "price": 2.5
        }));
        assert!(data.is_object());
        assert!(data.get("sizes").unwrap().is_array());
        assert_eq!(data.get("sizes").unwrap().len(), 3);
        assert!(matches!(
            data.get("big").unwrap().to_typed().value,
            Value::Long(5_000_000_000)
        ));
        assert_eq!(data.get("price").unwrap().to_typed().ty, TypeTag::Double);
        assert!(data.get("missing").is_none());
    }

    #[test]
    fn test_scalars_unwrap_and_containers_stay_dynamic() {
        let data = DynamicValue::from(json!({"inner": {"x": 1}, "label": "a"}));
        assert_eq!(data.get("label").unwrap().to_typed().ty, TypeTag::String);
        assert_eq!(data.get("inner").unwrap().to_typed().ty, TypeTag::Dynamic);
    }

    #[test]
    fn test_display() {
        let data = DynamicValue::from(json!({"a": [1, "b"]}));
        assert_eq!(data.to_string(), "{a: [1, \"b\"]}");
    }
}
