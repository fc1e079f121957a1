//! Process-local backend. Rows keep insertion order; key and alternate-unique sets are enforced
//! under the write lock, so each call is atomic the way a single SQL statement is.

use super::Store;
use crate::config::{ResolvedEntity, SortDirection, SortSpec};
use crate::error::AppError;
use crate::record::{value_eq, Record, RecordKey};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Every uniqueness set of the entity, key first.
fn unique_sets(entity: &ResolvedEntity) -> Vec<&[String]> {
    let mut sets: Vec<&[String]> = vec![entity.key_columns.as_slice()];
    sets.extend(entity.unique.iter().map(Vec::as_slice));
    sets
}

/// Name of the first uniqueness set that `candidate` shares with a row other than `skip`.
/// Sets containing a null never collide, as in SQL.
fn find_collision(
    entity: &ResolvedEntity,
    rows: &[Record],
    candidate: &Record,
    skip: Option<usize>,
) -> Option<String> {
    for set in unique_sets(entity) {
        let values: Option<Vec<&Value>> = set
            .iter()
            .map(|c| candidate.get(c).filter(|v| !v.is_null()))
            .collect();
        let Some(values) = values else { continue };
        let clash = rows.iter().enumerate().any(|(i, row)| {
            Some(i) != skip
                && set
                    .iter()
                    .zip(&values)
                    .all(|(c, v)| row.get(c).map(|r| value_eq(r, v)).unwrap_or(false))
        });
        if clash {
            return Some(set.join(", "));
        }
    }
    None
}

/// Nulls sort last ascending (first descending), matching PostgreSQL defaults.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn project(entity: &ResolvedEntity, record: &Record) -> Record {
    entity
        .columns
        .iter()
        .map(|c| (c.name.clone(), record.get(&c.name).cloned().unwrap_or(Value::Null)))
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn list(
        &self,
        entity: &ResolvedEntity,
        sort: Option<&SortSpec>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Record>, AppError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<Record> = tables.get(&entity.table_id).cloned().unwrap_or_default();
        if let Some(s) = sort {
            let null = Value::Null;
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&s.column).unwrap_or(&null), b.get(&s.column).unwrap_or(&null));
                match s.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(skip).take(limit).collect())
    }

    async fn fetch(&self, entity: &ResolvedEntity, key: &RecordKey) -> Result<Option<Record>, AppError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(&entity.table_id)
            .and_then(|rows| rows.iter().find(|r| key.matches(entity, r)))
            .cloned())
    }

    async fn find_by(
        &self,
        entity: &ResolvedEntity,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>, AppError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(&entity.table_id)
            .and_then(|rows| {
                rows.iter()
                    .find(|r| r.get(column).map(|v| value_eq(v, value)).unwrap_or(false))
            })
            .cloned())
    }

    async fn insert(&self, entity: &ResolvedEntity, record: &Record) -> Result<Record, AppError> {
        let row = project(entity, record);
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let rows = tables.entry(entity.table_id.clone()).or_default();
        if let Some(set) = find_collision(entity, rows, &row, None) {
            return Err(AppError::Conflict(format!(
                "{} already has a record with the same ({})",
                entity.path_segment, set
            )));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        entity: &ResolvedEntity,
        key: &RecordKey,
        changes: &Record,
    ) -> Result<Option<Record>, AppError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let Some(rows) = tables.get_mut(&entity.table_id) else {
            return Ok(None);
        };
        let Some(idx) = rows.iter().position(|r| key.matches(entity, r)) else {
            return Ok(None);
        };
        let mut merged = rows[idx].clone();
        for c in &entity.columns {
            if let Some(v) = changes.get(&c.name) {
                merged.insert(c.name.clone(), v.clone());
            }
        }
        if let Some(set) = find_collision(entity, rows, &merged, Some(idx)) {
            return Err(AppError::Conflict(format!(
                "{} already has a record with the same ({})",
                entity.path_segment, set
            )));
        }
        rows[idx] = merged.clone();
        Ok(Some(merged))
    }

    async fn delete(&self, entity: &ResolvedEntity, key: &RecordKey) -> Result<Option<Record>, AppError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let Some(rows) = tables.get_mut(&entity.table_id) else {
            return Ok(None);
        };
        Ok(rows
            .iter()
            .position(|r| key.matches(entity, r))
            .map(|idx| rows.remove(idx)))
    }
}
