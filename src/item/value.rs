use serde::Serialize;

use super::Item;

/// Dynamically-typed field value carried by an [`Item`].
///
/// Serializes untagged, so an item renders as a plain JSON object when it is
/// forwarded to the debug broadcast sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Items(Vec<Item>),
}

impl Value {
    /// Stable name of the variant, used in type-mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Items(_) => "items",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of the value; ints widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[Item]> {
        match self {
            Value::Items(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Vec<Item>> for Value {
    fn from(v: Vec<Item>) -> Self {
        Value::Items(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Conversion out of a [`Value`] used by typed [`Field`](super::Field)
/// accessors. Returns `None` on a variant mismatch; the accessor turns that
/// into a reportable type error rather than a panic.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;

    /// Name of the expected variant, used in diagnostics.
    fn expected() -> &'static str;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn expected() -> &'static str {
        "any"
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn expected() -> &'static str {
        "bool"
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn expected() -> &'static str {
        "int"
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }

    fn expected() -> &'static str {
        "float"
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }

    fn expected() -> &'static str {
        "text"
    }
}

impl FromValue for Vec<Item> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_items().map(<[Item]>::to_vec)
    }

    fn expected() -> &'static str {
        "items"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_widens_to_float() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(f64::from_value(&Value::Int(3)), Some(3.0));
    }

    #[test]
    fn mismatched_variant_yields_none() {
        assert_eq!(i64::from_value(&Value::Text("5".into())), None);
        assert_eq!(bool::from_value(&Value::Int(1)), None);
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&Value::List(vec![
            Value::Int(1),
            Value::Text("two".into()),
            Value::Null,
        ]))
        .unwrap();
        assert_eq!(json, r#"[1,"two",null]"#);
    }
}
