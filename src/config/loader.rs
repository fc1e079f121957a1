//! Load schema config from the embedded Demeter file or a path, and resolve it into the runtime model.

use crate::config::resolved::{
    ColumnInfo, FieldType, Reference, ResolvedEntity, ResolvedModel, SortDirection, SortSpec,
};
use crate::config::types::*;
use crate::config::{default_schema_id, validate, FullConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// The Demeter resource schema shipped with the binary.
const BUILTIN_SCHEMA: &str = include_str!("../../config/demeter.json");

pub fn builtin_config() -> Result<FullConfig, ConfigError> {
    serde_json::from_str(BUILTIN_SCHEMA).map_err(|e| ConfigError::Load(e.to_string()))
}

pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let default_sid = default_schema_id(config)?;

    let schemas_by_id: HashMap<_, _> = config.schemas.iter().map(|s| (s.id.as_str(), s)).collect();
    let tables_by_id: HashMap<_, _> = config.tables.iter().map(|t| (t.id.as_str(), t)).collect();
    let columns_by_table: HashMap<_, Vec<&ColumnConfig>> =
        config.columns.iter().fold(HashMap::new(), |mut m, c| {
            m.entry(c.table_id.as_str()).or_default().push(c);
            m
        });
    let column_id_to_name: HashMap<&str, &str> =
        config.columns.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();
    let table_id_to_path: HashMap<&str, &str> = config
        .api_entities
        .iter()
        .map(|api| (api.entity_id.as_str(), api.path_segment.as_str()))
        .collect();

    let mut entities = Vec::new();
    let mut entity_by_path = HashMap::new();

    for api in &config.api_entities {
        let table = tables_by_id
            .get(api.entity_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: api.entity_id.clone(),
            })?;
        let table_sid = table.schema_id.as_deref().unwrap_or(default_sid);
        let schema = schemas_by_id
            .get(table_sid)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "schema",
                id: table_sid.to_string(),
            })?;
        let table_columns = columns_by_table
            .get(table.id.as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        let key_columns = table.primary_key.columns();
        let columns: Vec<ColumnInfo> = table_columns
            .iter()
            .map(|c| {
                let is_key = key_columns.contains(&c.name);
                ColumnInfo {
                    name: c.name.clone(),
                    field_type: infer_field_type(&c.type_),
                    // key columns are never nullable, whatever the config says
                    nullable: c.nullable && !is_key,
                    generated: c.generated,
                    is_key,
                }
            })
            .collect();

        let default_sort = match &api.default_sort {
            Some(sort) => Some(resolve_sort(api, sort, &columns)?),
            None => None,
        };

        let references = build_references_for_table(
            &table.id,
            &config.relationships,
            &column_id_to_name,
            &table_id_to_path,
        )?;

        let entity = ResolvedEntity {
            table_id: table.id.clone(),
            schema_name: schema.name.clone(),
            table_name: table.name.clone(),
            path_segment: api.path_segment.clone(),
            key_columns,
            columns,
            operations: api.operations.clone(),
            unique: table.unique.clone(),
            references,
            default_sort,
            validation: api.validation.clone(),
        };
        entity_by_path.insert(api.path_segment.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_path,
    })
}

fn resolve_sort(
    api: &ApiEntityConfig,
    sort: &SortConfig,
    columns: &[ColumnInfo],
) -> Result<SortSpec, ConfigError> {
    if !columns.iter().any(|c| c.name == sort.column) {
        return Err(ConfigError::MissingReference {
            kind: "sort column",
            id: format!("{}.{}", api.path_segment, sort.column),
        });
    }
    let direction = match sort.direction.as_deref() {
        None => SortDirection::Asc,
        Some(d) => SortDirection::parse(d).ok_or_else(|| {
            ConfigError::Validation(format!("{}: sort direction must be asc or desc", api.path_segment))
        })?,
    };
    Ok(SortSpec {
        column: sort.column.clone(),
        direction,
    })
}

/// References from `our_table_id` to other exposed entities. A relationship whose target is not
/// exposed through the API cannot be checked at runtime and is rejected.
fn build_references_for_table(
    our_table_id: &str,
    relationships: &[RelationshipConfig],
    column_id_to_name: &HashMap<&str, &str>,
    table_id_to_path: &HashMap<&str, &str>,
) -> Result<Vec<Reference>, ConfigError> {
    let mut references = Vec::new();
    let mut seen = HashSet::new();
    for rel in relationships.iter().filter(|r| r.from_table_id == our_table_id) {
        let column = column_id_to_name
            .get(rel.from_column_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "column",
                id: rel.from_column_id.clone(),
            })?;
        let target_column = column_id_to_name
            .get(rel.to_column_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "column",
                id: rel.to_column_id.clone(),
            })?;
        let target_path = table_id_to_path
            .get(rel.to_table_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "api entity",
                id: rel.to_table_id.clone(),
            })?;
        if !seen.insert(*column) {
            return Err(ConfigError::Validation(format!(
                "column {} has more than one relationship",
                rel.from_column_id
            )));
        }
        references.push(Reference {
            column: column.to_string(),
            target_path_segment: target_path.to_string(),
            target_column: target_column.to_string(),
        });
    }
    Ok(references)
}

fn infer_field_type(ty: &ColumnTypeConfig) -> FieldType {
    let lower = ty.base_name().to_lowercase();
    if lower.contains("uuid") {
        FieldType::Uuid
    } else if lower == "date" {
        FieldType::Date
    } else if lower.contains("bigserial") || lower.contains("bigint") || lower == "int8" {
        FieldType::BigInt
    } else if lower.contains("serial") || lower.contains("int") {
        FieldType::Int
    } else {
        FieldType::Text
    }
}
