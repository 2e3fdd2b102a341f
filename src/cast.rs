//! Type caster.
//!
//! Converts raw (JSON) values into the typed [`Value`] a field declares and
//! back into the raw form a document store keeps. Casting is pure: the only
//! input besides the raw value is the read-only field schema, consulted for
//! `OBJECT<Class>` fields.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as JsonValue};

use crate::core::{Attributes, CastError, DataType, Field, RawDocument, Value};
use crate::schema::{ClassDef, Schema};

const DATE_FORMAT: &str = "%Y-%m-%d";
const NAIVE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub type CastResult<T> = std::result::Result<T, CastError>;

/// Casts raw values against the field schema of a sealed [`Schema`].
#[derive(Clone, Copy)]
pub struct TypeCaster<'a> {
    schema: &'a Schema,
}

impl<'a> TypeCaster<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Cast `raw` to the declared type of `field`. `null` yields the field default.
    pub fn cast_in(&self, raw: &JsonValue, field: &Field) -> CastResult<Value> {
        if raw.is_null() {
            return Ok(field.default_value());
        }
        self.cast_raw(&field.name, raw, &field.data_type)
    }

    /// Cast every declared field present in `raw`, in declaration order.
    ///
    /// Keys without a declared field are skipped.
    pub fn cast_document(&self, class: &ClassDef, raw: &RawDocument) -> CastResult<Attributes> {
        let mut attrs = Attributes::with_capacity(raw.len());
        for field in class.fields() {
            if let Some(value) = raw.get(&field.name) {
                attrs.insert(field.name.clone(), self.cast_in(value, field)?);
            }
        }
        Ok(attrs)
    }

    fn cast_raw(&self, field: &str, raw: &JsonValue, data_type: &DataType) -> CastResult<Value> {
        let fail = || CastError::new(field, raw, data_type);

        match (raw, data_type) {
            (JsonValue::Null, _) => Ok(Value::Null),

            (JsonValue::String(s), DataType::Text) => Ok(Value::Text(s.clone())),
            (JsonValue::Number(n), DataType::Text) => Ok(Value::Text(n.to_string())),
            (JsonValue::Bool(b), DataType::Text) => Ok(Value::Text(b.to_string())),
            (JsonValue::Array(_) | JsonValue::Object(_), DataType::Text) => {
                Ok(Value::Text(raw.to_string()))
            }

            (JsonValue::Number(n), DataType::Integer) => {
                number_to_i64(n).map(Value::Integer).ok_or_else(fail)
            }
            (JsonValue::String(s), DataType::Integer) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_i64))
                    .map(Value::Integer)
                    .ok_or_else(fail)
            }

            (JsonValue::Number(n), DataType::Float) => {
                n.as_f64().map(Value::Float).ok_or_else(fail)
            }
            (JsonValue::String(s), DataType::Float) => {
                s.trim().parse::<f64>().map(Value::Float).map_err(|_| fail())
            }

            (JsonValue::Bool(b), DataType::Boolean) => Ok(Value::Boolean(*b)),
            (JsonValue::String(s), DataType::Boolean) => match s.trim() {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(fail()),
            },
            (JsonValue::Number(n), DataType::Boolean) => match n.as_i64() {
                Some(1) => Ok(Value::Boolean(true)),
                Some(0) => Ok(Value::Boolean(false)),
                _ => Err(fail()),
            },

            (JsonValue::String(s), DataType::Date) => {
                parse_date(s.trim()).map(Value::Date).ok_or_else(fail)
            }

            (JsonValue::String(s), DataType::Time) => {
                parse_time(s.trim()).map(Value::Timestamp).ok_or_else(fail)
            }
            (JsonValue::Number(n), DataType::Time) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(Value::Timestamp)
                .ok_or_else(fail),

            (JsonValue::Object(map), DataType::Object(class_name)) => {
                let class = self.schema.class(class_name).map_err(|_| fail())?;
                self.cast_document(&class, map).map(Value::Document)
            }

            (JsonValue::Array(items), DataType::Array(inner)) => {
                let mut values = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    values.push(self.cast_raw(&format!("{}[{}]", field, i), item, inner)?);
                }
                Ok(Value::Array(values))
            }

            _ => Err(fail()),
        }
    }
}

/// Convert a typed value into the raw form a store keeps.
pub fn cast_out(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Date(d) => JsonValue::String(d.format(DATE_FORMAT).to_string()),
        Value::Timestamp(t) => JsonValue::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Document(attrs) => JsonValue::Object(cast_out_document(attrs)),
        Value::Array(items) => JsonValue::Array(items.iter().map(cast_out).collect()),
    }
}

/// Convert a whole attribute store into a raw document, preserving order.
pub fn cast_out_document(attrs: &Attributes) -> RawDocument {
    let mut map = Map::new();
    for (name, value) in attrs {
        map.insert(name.clone(), cast_out(value));
    }
    map
}

fn number_to_i64(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| n.as_f64().and_then(float_to_i64))
}

fn float_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
