//! Scalar values and declared column types

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Declared type of a selector or schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Long,
    Double,
    String,
    /// Epoch milliseconds, stored in a long column.
    #[serde(rename = "datetime")]
    DateTimeMilli,
    Boolean,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::DateTimeMilli => "datetime",
            DataType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "int" | "integer" | "bigint" => Ok(DataType::Long),
            "double" | "float" => Ok(DataType::Double),
            "string" | "str" => Ok(DataType::String),
            "datetime" | "timestamp" => Ok(DataType::DateTimeMilli),
            "boolean" | "bool" => Ok(DataType::Boolean),
            other => Err(QueryError::UnsupportedType(other.to_string())),
        }
    }
}

/// A single cell value.
///
/// Equality and hashing are total: doubles compare by bit pattern (with
/// `-0.0` folded into `0.0`), so values can be used inside hash keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Long(i64),
    Double(f64),
    String(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            Value::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Long(v) => serde_json::Value::Number((*v).into()),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn double_bits(v: f64) -> u64 {
        if v == 0.0 {
            0.0f64.to_bits()
        } else {
            v.to_bits()
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => Self::double_bits(*a) == Self::double_bits(*b),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Long(v) => v.hash(state),
            Value::Double(v) => Self::double_bits(*v).hash(state),
            Value::String(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Long(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_data_type() {
        assert_eq!("LONG".parse::<DataType>().unwrap(), DataType::Long);
        assert_eq!("timestamp".parse::<DataType>().unwrap(), DataType::DateTimeMilli);
        assert!(matches!(
            "decimal".parse::<DataType>(),
            Err(QueryError::UnsupportedType(t)) if t == "decimal"
        ));
    }

    #[test]
    fn test_double_zero_hashes_equal() {
        let mut set = HashSet::new();
        set.insert(Value::Double(0.0));
        assert!(set.contains(&Value::Double(-0.0)));
        assert_ne!(Value::Long(1), Value::Double(1.0));
    }

    #[test]
    fn test_display_escapes_quotes() {
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
    }

    #[test]
    fn test_serialize_untagged() {
        let json = serde_json::to_string(&vec![Value::Long(1), Value::from("a"), Value::Null]).unwrap();
        assert_eq!(json, r#"[1,"a",null]"#);
    }
}
