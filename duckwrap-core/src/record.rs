//! Row representation used at the wrapper boundary.
//!
//! A [`Record`] is an ordered list of `(column, value)` pairs. Records go in
//! when creating tables and come out of query results; internally the wrapper
//! converts them to Arrow batches exactly once in each direction.

use chrono::{DateTime, NaiveDate, TimeDelta};
use duckdb::types::{TimeUnit, Value};
use serde_json::{Map, Number, Value as JsonValue};

use crate::error::WrapperError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes fields as-is; duplicate column names from a query are kept.
    pub(crate) fn from_fields(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set `column` to `value`, replacing an existing entry in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a record from a JSON object.
    ///
    /// Nested arrays and objects are stored as their JSON text.
    pub fn from_json(json: &JsonValue) -> Result<Self, WrapperError> {
        let object = json.as_object().ok_or_else(|| {
            WrapperError::InvalidRecords(format!("expected a JSON object, got {json}"))
        })?;
        Ok(object
            .iter()
            .map(|(key, value)| (key.clone(), json_to_value(value)))
            .collect())
    }

    /// Render the record as a JSON object, preserving column order.
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            map.insert(name.clone(), value_to_json(value));
        }
        JsonValue::Object(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Parse a JSON array of objects into records.
pub fn records_from_json(json: &JsonValue) -> Result<Vec<Record>, WrapperError> {
    let rows = json.as_array().ok_or_else(|| {
        WrapperError::InvalidRecords("expected a JSON array of objects".to_string())
    })?;
    rows.iter().map(Record::from_json).collect()
}

fn json_to_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::BigInt(i)
            } else if let Some(u) = n.as_u64() {
                Value::UBigInt(u)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => Value::Text(s.clone()),
        nested => Value::Text(nested.to_string()),
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::TinyInt(v) => JsonValue::from(*v),
        Value::SmallInt(v) => JsonValue::from(*v),
        Value::Int(v) => JsonValue::from(*v),
        Value::BigInt(v) => JsonValue::from(*v),
        Value::HugeInt(v) => i64::try_from(*v)
            .map(JsonValue::from)
            .or_else(|_| u64::try_from(*v).map(JsonValue::from))
            .unwrap_or_else(|_| JsonValue::String(v.to_string())),
        Value::UTinyInt(v) => JsonValue::from(*v),
        Value::USmallInt(v) => JsonValue::from(*v),
        Value::UInt(v) => JsonValue::from(*v),
        Value::UBigInt(v) => JsonValue::from(*v),
        Value::Float(v) => float_to_json(f64::from(*v)),
        Value::Double(v) => float_to_json(*v),
        Value::Text(s) | Value::Enum(s) => JsonValue::String(s.clone()),
        Value::Blob(bytes) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
        Value::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(TimeDelta::days(i64::from(*days))))
            .map(|date| JsonValue::String(date.format("%Y-%m-%d").to_string()))
            .unwrap_or(JsonValue::Null),
        Value::Timestamp(unit, raw) => DateTime::from_timestamp_micros(to_micros(*unit, *raw))
            .map(|ts| JsonValue::String(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(JsonValue::Null),
        Value::List(items) => {
            JsonValue::Array(items.iter().map(value_to_json).collect())
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn float_to_json(v: f64) -> JsonValue {
    Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Normalize a DuckDB timestamp to microseconds since the epoch.
pub(crate) fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_replaces_in_place() {
        let mut record = Record::new()
            .with("id", 1i64)
            .with("name", "a".to_string());
        record.insert("id", 2i64);
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(record.get("id"), Some(&Value::BigInt(2)));
    }

    #[test]
    fn json_object_maps_to_values() {
        let record = Record::from_json(&json!({
            "id": 7,
            "score": 1.5,
            "name": "duck",
            "tags": ["a", "b"],
            "missing": null
        }))
        .unwrap();
        assert_eq!(record.get("id"), Some(&Value::BigInt(7)));
        assert_eq!(record.get("score"), Some(&Value::Double(1.5)));
        assert_eq!(record.get("name"), Some(&Value::Text("duck".to_string())));
        assert_eq!(record.get("tags"), Some(&Value::Text("[\"a\",\"b\"]".to_string())));
        assert_eq!(record.get("missing"), Some(&Value::Null));
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(Record::from_json(&json!([1, 2])).is_err());
        assert!(records_from_json(&json!({"id": 1})).is_err());
    }

    #[test]
    fn hugeint_renders_as_number_when_it_fits() {
        let record = Record::new()
            .with("small", Value::HugeInt(-1))
            .with("unsigned", Value::HugeInt(i128::from(u64::MAX)))
            .with("huge", Value::HugeInt(i128::MAX));
        let json = record.to_json();
        assert_eq!(json["small"], json!(-1));
        assert_eq!(json["unsigned"], json!(u64::MAX));
        assert_eq!(json["huge"], json!(i128::MAX.to_string()));
    }

    #[test]
    fn to_json_renders_dates_and_timestamps() {
        let record = Record::new()
            .with("day", Value::Date32(19_000))
            .with("at", Value::Timestamp(TimeUnit::Second, 0));
        let json = record.to_json();
        assert_eq!(json["day"], json!("2022-01-08"));
        assert_eq!(json["at"], json!("1970-01-01 00:00:00"));
    }
}
