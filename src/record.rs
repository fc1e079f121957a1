//! Records, natural keys, and typed coercion of request values.

use crate::config::{ColumnInfo, FieldType, ResolvedEntity};
use crate::error::AppError;
use serde_json::{Map, Value};
use std::fmt;

/// One row of a resource: field name to scalar JSON value.
pub type Record = Map<String, Value>;

/// Natural key of a record: one value per key column, in key order.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordKey(Vec<Value>);

impl RecordKey {
    pub fn new(values: Vec<Value>) -> Self {
        RecordKey(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Extract the key of `record`. None when a key column is missing or null.
    pub fn from_record(entity: &ResolvedEntity, record: &Record) -> Option<Self> {
        let mut values = Vec::with_capacity(entity.key_columns.len());
        for k in &entity.key_columns {
            match record.get(k) {
                Some(v) if !v.is_null() => values.push(v.clone()),
                _ => return None,
            }
        }
        Some(RecordKey(values))
    }

    /// Parse path segments (one per key column) into a typed key.
    pub fn parse(entity: &ResolvedEntity, segments: &[&str]) -> Result<Self, AppError> {
        let key_cols = entity.key_column_infos();
        if segments.len() != key_cols.len() {
            return Err(AppError::InvalidInput(format!(
                "{} is identified by {} path segment(s): {}",
                entity.path_segment,
                key_cols.len(),
                entity.key_columns.join("/")
            )));
        }
        let values = key_cols
            .iter()
            .zip(segments)
            .map(|(col, seg)| parse_segment(col, seg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordKey(values))
    }

    pub fn matches(&self, entity: &ResolvedEntity, record: &Record) -> bool {
        entity
            .key_columns
            .iter()
            .zip(&self.0)
            .all(|(k, v)| record.get(k).map(|r| value_eq(r, v)).unwrap_or(false))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        f.write_str(&parts.join("/"))
    }
}

fn parse_segment(col: &ColumnInfo, s: &str) -> Result<Value, AppError> {
    coerce(col, &Value::String(s.to_string()))
}

/// Check `v` against the column type and return its canonical form.
/// Null passes through; nullability is the caller's concern.
pub fn coerce(col: &ColumnInfo, v: &Value) -> Result<Value, AppError> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let invalid = || AppError::InvalidInput(format!("{} must be {}", col.name, col.field_type.label()));
    Ok(match col.field_type {
        FieldType::Text => match v {
            Value::String(s) => Value::String(s.clone()),
            _ => return Err(invalid()),
        },
        FieldType::Int => {
            let n = integer_of(v).ok_or_else(invalid)?;
            let n = i32::try_from(n).map_err(|_| invalid())?;
            Value::Number(n.into())
        }
        FieldType::BigInt => Value::Number(integer_of(v).ok_or_else(invalid)?.into()),
        FieldType::Date => {
            let s = v.as_str().ok_or_else(invalid)?;
            let d = chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
            Value::String(d.format("%Y-%m-%d").to_string())
        }
        FieldType::Uuid => {
            let s = v.as_str().ok_or_else(invalid)?;
            let u = uuid::Uuid::parse_str(s.trim()).map_err(|_| invalid())?;
            Value::String(u.to_string())
        }
    })
}

fn integer_of(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality that treats numerically equal numbers as equal.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}
