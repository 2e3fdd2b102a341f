use std::fmt;

use indexmap::IndexMap;

use super::Value;

/// Ordered per-instance attribute store: field or association name to typed value.
pub type Attributes = IndexMap<String, Value>;

/// Untyped document as exchanged with a store.
pub type RawDocument = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Time,
    /// Nested value cast through the field schema of the named class.
    Object(String),
    Array(Box<DataType>),
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Date, Value::Date(_)) => true,
            (Self::Time, Value::Timestamp(_)) => true,
            (Self::Object(_), Value::Document(_)) => true,
            (Self::Array(inner), Value::Array(items)) => {
                items.iter().all(|item| inner.is_compatible(item))
            }
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Date => write!(f, "DATE"),
            Self::Time => write!(f, "TIME"),
            Self::Object(class) => write!(f, "OBJECT<{}>", class),
            Self::Array(inner) => write!(f, "ARRAY<{}>", inner),
        }
    }
}

/// A declared field: name, type and optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub default: Option<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// The value a missing or `null` input resolves to.
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_fields_accept_integers() {
        assert!(DataType::Float.is_compatible(&Value::Integer(3)));
        assert!(!DataType::Integer.is_compatible(&Value::Float(3.5)));
    }

    #[test]
    fn array_compatibility_checks_every_item() {
        let ty = DataType::Array(Box::new(DataType::Integer));
        assert!(ty.is_compatible(&Value::Array(vec![Value::Integer(1), Value::Null])));
        assert!(!ty.is_compatible(&Value::Array(vec![Value::Text("x".into())])));
    }

    #[test]
    fn missing_default_resolves_to_null() {
        let field = Field::new("title", DataType::Text);
        assert_eq!(field.default_value(), Value::Null);
        let aged = Field::new("age", DataType::Integer).with_default(100);
        assert_eq!(aged.default_value(), Value::Integer(100));
    }
}
