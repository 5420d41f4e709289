use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::{DATE_FORMAT, Value};

/// A Rust field type that can hold one feed cell.
///
/// Empty cells take the type's default. Non-empty cells must parse.
pub trait Cell: Sized + Default {
    fn parse(raw: &str) -> Result<Self, String>;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
}

impl Cell for String {
    fn parse(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Cell for i64 {
    fn parse(raw: &str) -> Result<Self, String> {
        raw.parse()
            .map_err(|_| format!("'{raw}' is not an integer"))
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }
}

impl Cell for f64 {
    fn parse(raw: &str) -> Result<Self, String> {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| format!("'{raw}' is not a finite number"))
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f),
            Value::Integer(i) => Some(i as f64),
            _ => None,
        }
    }
}

impl Cell for Option<f64> {
    fn parse(raw: &str) -> Result<Self, String> {
        f64::parse(raw).map(Some)
    }

    fn to_value(&self) -> Value {
        self.map_or(Value::Null, Value::Float)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => f64::from_value(other).map(Some),
        }
    }
}

impl Cell for Option<NaiveDate> {
    fn parse(raw: &str) -> Result<Self, String> {
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(Some)
            .map_err(|_| format!("'{raw}' is not a YYYYMMDD date"))
    }

    fn to_value(&self) -> Value {
        self.map_or(Value::Null, Value::Date)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            Value::Date(d) => Some(Some(d)),
            _ => None,
        }
    }
}

/// Serde adapter for record fields: empty means default, anything else
/// must parse as the field's type.
pub fn deserialize_cell<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Cell,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if raw.is_empty() {
        Ok(T::default())
    } else {
        T::parse(raw).map_err(serde::de::Error::custom)
    }
}
