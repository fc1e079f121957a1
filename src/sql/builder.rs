//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a resolved entity.
//! Every placeholder carries a cast to the column's PostgreSQL type because values bind as text.

use crate::config::{ResolvedEntity, SortSpec};
use crate::record::{Record, RecordKey};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

fn entity_table(entity: &ResolvedEntity) -> String {
    qualified_table(&entity.schema_name, &entity.table_name)
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push `v` for `column` and return its cast placeholder, e.g. `$2::date`.
    fn placeholder(&mut self, entity: &ResolvedEntity, column: &str, v: Value) -> String {
        let n = self.push_param(v);
        match entity.column(column) {
            Some(c) => format!("${}::{}", n, c.field_type.pg_type()),
            None => format!("${}", n),
        }
    }

    fn key_predicate(&mut self, entity: &ResolvedEntity, key: &RecordKey) -> String {
        entity
            .key_columns
            .iter()
            .zip(key.values())
            .map(|(col, v)| {
                let ph = self.placeholder(entity, col, v.clone());
                format!("{} = {}", quoted(col), ph)
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn select_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_order(entity: &ResolvedEntity) -> Vec<String> {
    entity.key_columns.iter().map(|k| quoted(k)).collect()
}

/// SELECT page: ORDER BY sort column (then key as tie-break) or key, LIMIT/OFFSET inline.
pub fn select_list(entity: &ResolvedEntity, sort: Option<&SortSpec>, skip: u64, limit: u64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut order = Vec::new();
    if let Some(s) = sort {
        order.push(format!("{} {}", quoted(&s.column), s.direction.sql()));
    }
    order.extend(key_order(entity));
    q.sql = format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
        select_column_list(entity),
        entity_table(entity),
        order.join(", "),
        limit,
        skip
    );
    q
}

/// SELECT by natural key (single or composite).
pub fn select_by_key(entity: &ResolvedEntity, key: &RecordKey) -> QueryBuf {
    let mut q = QueryBuf::new();
    let predicate = q.key_predicate(entity, key);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(entity),
        entity_table(entity),
        predicate
    );
    q
}

/// SELECT first row where `column` equals `value`. Used for alternate-unique and reference checks.
pub fn select_by_column(entity: &ResolvedEntity, column: &str, value: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(entity, column, value.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {} ORDER BY {} LIMIT 1",
        select_column_list(entity),
        entity_table(entity),
        quoted(column),
        ph,
        key_order(entity).join(", ")
    );
    q
}

/// INSERT every entity column (absent values bind as NULL), RETURNING the stored row.
pub fn insert(entity: &ResolvedEntity, record: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let val = record.get(&c.name).cloned().unwrap_or(Value::Null);
        placeholders.push(q.placeholder(entity, &c.name, val));
        cols.push(quoted(&c.name));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        entity_table(entity),
        cols.join(", "),
        placeholders.join(", "),
        select_column_list(entity)
    );
    q
}

/// UPDATE by key: SET only the columns present in `changes` (in entity column order).
/// With no changes this degrades to a SELECT so callers still learn whether the row exists.
pub fn update(entity: &ResolvedEntity, key: &RecordKey, changes: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &entity.columns {
        let Some(v) = changes.get(&c.name) else { continue };
        let ph = q.placeholder(entity, &c.name, v.clone());
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    if sets.is_empty() {
        return select_by_key(entity, key);
    }
    let predicate = q.key_predicate(entity, key);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        entity_table(entity),
        sets.join(", "),
        predicate,
        select_column_list(entity)
    );
    q
}

/// DELETE by key, RETURNING the removed row.
pub fn delete(entity: &ResolvedEntity, key: &RecordKey) -> QueryBuf {
    let mut q = QueryBuf::new();
    let predicate = q.key_predicate(entity, key);
    q.sql = format!(
        "DELETE FROM {} WHERE {} RETURNING {}",
        entity_table(entity),
        predicate,
        select_column_list(entity)
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_config, resolve, ResolvedModel, SortDirection};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&builtin_config().unwrap()).unwrap()
    }

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn list_orders_by_sort_column_then_key() {
        let model = model();
        let spreads = model.entity_by_path("spreads").unwrap();
        let sort = SortSpec {
            column: "spread_quantity".into(),
            direction: SortDirection::Desc,
        };
        let q = select_list(spreads, Some(&sort), 20, 10);
        assert_eq!(
            q.sql,
            "SELECT \"fertilizer_id\", \"plot_number\", \"date\", \"spread_quantity\" FROM \"public\".\"spread\" \
             ORDER BY \"spread_quantity\" DESC, \"fertilizer_id\", \"plot_number\" LIMIT 10 OFFSET 20"
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn largest_window_offset_fits_a_bigint() {
        let model = model();
        let units = model.entity_by_path("units").unwrap();
        let q = select_list(units, None, crate::service::MAX_SKIP, 10);
        assert!(q.sql.ends_with("LIMIT 10 OFFSET 9223372036854775807"));
    }

    #[test]
    fn composite_key_predicate_casts_each_part() {
        let model = model();
        let spreads = model.entity_by_path("spreads").unwrap();
        let key = RecordKey::new(vec![json!("c3244185-8318-41a7-9e10-84eaa772ab4b"), json!(2)]);
        let q = select_by_key(spreads, &key);
        assert!(q
            .sql
            .ends_with("WHERE \"fertilizer_id\" = $1::uuid AND \"plot_number\" = $2::integer"));
        assert_eq!(q.params, key.values().to_vec());
    }

    #[test]
    fn insert_binds_every_column_in_entity_order() {
        let model = model();
        let productions = model.entity_by_path("productions").unwrap();
        let q = insert(productions, &record(json!({"name": "E 500KG", "code": 500, "unit": "KG"})));
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"production\" (\"code\", \"unit\", \"name\") \
             VALUES ($1::integer, $2::text, $3::text) RETURNING \"code\", \"unit\", \"name\""
        );
        assert_eq!(q.params, vec![json!(500), json!("KG"), json!("E 500KG")]);
    }

    #[test]
    fn update_sets_only_supplied_columns_and_binds_key_last() {
        let model = model();
        let productions = model.entity_by_path("productions").unwrap();
        let key = RecordKey::new(vec![json!(500)]);
        let q = update(productions, &key, &record(json!({"name": "EC 200L"})));
        assert_eq!(
            q.sql,
            "UPDATE \"public\".\"production\" SET \"name\" = $1::text WHERE \"code\" = $2::integer \
             RETURNING \"code\", \"unit\", \"name\""
        );
        assert_eq!(q.params, vec![json!("EC 200L"), json!(500)]);
    }

    #[test]
    fn empty_update_becomes_select() {
        let model = model();
        let units = model.entity_by_path("units").unwrap();
        let key = RecordKey::new(vec![json!("L")]);
        let q = update(units, &key, &Record::new());
        assert!(q.sql.starts_with("SELECT"));
        assert_eq!(q.params, vec![json!("L")]);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(qualified_table("pub\"lic", "unit"), "\"pub\"\"lic\".\"unit\"");
    }
}
