//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use std::collections::HashMap;

/// Scalar type of a field, used for path parsing, body coercion and SQL casts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Uuid,
    BigInt,
    Int,
    Text,
    Date,
}

impl FieldType {
    /// PostgreSQL type name used for placeholder casts.
    pub fn pg_type(self) -> &'static str {
        match self {
            FieldType::Uuid => "uuid",
            FieldType::BigInt => "bigint",
            FieldType::Int => "integer",
            FieldType::Text => "text",
            FieldType::Date => "date",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldType::Uuid => "a UUID",
            FieldType::BigInt | FieldType::Int => "an integer",
            FieldType::Text => "a string",
            FieldType::Date => "a date (YYYY-MM-DD)",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub generated: bool,
    pub is_key: bool,
}

/// A foreign reference from one of our columns to a column of another exposed entity.
#[derive(Clone, Debug)]
pub struct Reference {
    pub column: String,
    /// Path segment of the referenced entity (lookup key in the model).
    pub target_path_segment: String,
    pub target_column: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub table_id: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub key_columns: Vec<String>,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<String>,
    /// Alternate uniqueness sets (the key is implicitly unique and not listed here).
    pub unique: Vec<Vec<String>>,
    pub references: Vec<Reference>,
    pub default_sort: Option<SortSpec>,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.key_columns.iter().any(|k| k == name)
    }

    pub fn key_column_infos(&self) -> Vec<&ColumnInfo> {
        self.key_columns.iter().filter_map(|k| self.column(k)).collect()
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }
}
