//! Generic CRUD engine: list, get, create, replace, partial update and delete for any resolved entity.

use crate::config::{ResolvedEntity, ResolvedModel, SortDirection, SortSpec};
use crate::error::AppError;
use crate::record::{value_eq, Record, RecordKey};
use crate::service::validation::{RequestValidator, WriteMode};
use crate::store::Store;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 1000;
/// Largest offset PostgreSQL accepts (bigint).
pub const MAX_SKIP: u64 = i64::MAX as u64;

/// Raw list window as received from the client.
#[derive(Clone, Debug, Default)]
pub struct ListParams {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// One page of rows with the window that was applied.
#[derive(Clone, Debug)]
pub struct Page {
    pub rows: Vec<Record>,
    pub skip: u64,
    pub limit: u64,
}

#[derive(Clone)]
pub struct CrudService {
    store: Arc<dyn Store>,
    model: Arc<ResolvedModel>,
    enforce_references: bool,
}

impl CrudService {
    pub fn new(store: Arc<dyn Store>, model: Arc<ResolvedModel>) -> Self {
        CrudService {
            store,
            model,
            enforce_references: true,
        }
    }

    /// Whether foreign references must name an existing record on write. On by default.
    pub fn with_reference_checks(mut self, enforce: bool) -> Self {
        self.enforce_references = enforce;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn model(&self) -> &ResolvedModel {
        &self.model
    }

    pub fn entity(&self, path_segment: &str) -> Result<&ResolvedEntity, AppError> {
        self.model
            .entity_by_path(path_segment)
            .ok_or_else(|| AppError::NotFound(format!("resource {}", path_segment)))
    }

    /// Rows in `[skip, skip + limit)`. An out-of-range window yields an empty page.
    pub async fn list(&self, entity: &ResolvedEntity, params: &ListParams) -> Result<Page, AppError> {
        let skip = params.skip.unwrap_or(0).min(MAX_SKIP);
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let sort = resolve_sort(entity, params)?;
        let rows = self.store.list(entity, sort.as_ref(), skip, limit).await?;
        Ok(Page { rows, skip, limit })
    }

    pub async fn get(&self, entity: &ResolvedEntity, key: &RecordKey) -> Result<Record, AppError> {
        self.store
            .fetch(entity, key)
            .await?
            .ok_or_else(|| not_found(entity, key))
    }

    /// Insert a new record and return it as stored (its key included).
    pub async fn create(&self, entity: &ResolvedEntity, body: &Record) -> Result<Record, AppError> {
        let mut record = RequestValidator::shape(entity, body, WriteMode::Create)?;
        RequestValidator::validate(&record, &entity.validation)?;
        for col in entity.columns.iter().filter(|c| c.generated) {
            record.insert(col.name.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        let key = RecordKey::from_record(entity, &record)
            .ok_or_else(|| AppError::InvalidInput(format!("{} is required", entity.key_columns.join(", "))))?;

        if self.store.fetch(entity, &key).await?.is_some() {
            return Err(AppError::Conflict(format!("{} {} already exists", entity.path_segment, key)));
        }
        self.check_alternate_unique(entity, &record, None).await?;
        self.check_references(entity, &record).await?;

        let created = self.store.insert(entity, &record).await?;
        tracing::info!(resource = %entity.path_segment, key = %key, "created");
        Ok(created)
    }

    /// Overwrite every non-key field; omitted nullable fields become null.
    pub async fn replace(&self, entity: &ResolvedEntity, key: &RecordKey, body: &Record) -> Result<Record, AppError> {
        let changes = RequestValidator::shape(entity, body, WriteMode::Replace)?;
        self.apply(entity, key, changes, "replaced").await
    }

    /// Merge present, non-null fields into the stored record; everything else keeps its stored value.
    pub async fn partial_update(
        &self,
        entity: &ResolvedEntity,
        key: &RecordKey,
        body: &Record,
    ) -> Result<Record, AppError> {
        let changes = RequestValidator::shape(entity, body, WriteMode::Patch)?;
        self.apply(entity, key, changes, "patched").await
    }

    pub async fn delete(&self, entity: &ResolvedEntity, key: &RecordKey) -> Result<(), AppError> {
        if self.store.fetch(entity, key).await?.is_none() {
            return Err(not_found(entity, key));
        }
        self.store
            .delete(entity, key)
            .await?
            .ok_or_else(|| not_found(entity, key))?;
        tracing::info!(resource = %entity.path_segment, key = %key, "deleted");
        Ok(())
    }

    async fn apply(
        &self,
        entity: &ResolvedEntity,
        key: &RecordKey,
        mut changes: Record,
        action: &'static str,
    ) -> Result<Record, AppError> {
        RequestValidator::validate(&changes, &entity.validation)?;
        let existing = self.store.fetch(entity, key).await?.ok_or_else(|| not_found(entity, key))?;

        // key fields equal to the current key are not a re-key
        changes.retain(|name, v| {
            !(entity.is_key(name) && existing.get(name).map(|e| value_eq(e, v)).unwrap_or(false))
        });
        if changes.is_empty() {
            return Ok(existing);
        }

        let mut target = existing.clone();
        target.extend(changes.clone());
        let new_key = RecordKey::from_record(entity, &target).ok_or_else(|| not_found(entity, key))?;
        if new_key != *key && self.store.fetch(entity, &new_key).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "{} {} already exists",
                entity.path_segment, new_key
            )));
        }
        self.check_alternate_unique(entity, &changes, Some(key)).await?;
        self.check_references(entity, &changes).await?;

        let updated = self
            .store
            .update(entity, key, &changes)
            .await?
            .ok_or_else(|| not_found(entity, key))?;
        tracing::info!(resource = %entity.path_segment, key = %key, new_key = %new_key, "{}", action);
        Ok(updated)
    }

    /// Friendly pre-check for single-column alternate unique sets; the store stays authoritative.
    async fn check_alternate_unique(
        &self,
        entity: &ResolvedEntity,
        values: &Record,
        own_key: Option<&RecordKey>,
    ) -> Result<(), AppError> {
        for set in entity.unique.iter().filter(|s| s.len() == 1) {
            let column = &set[0];
            let Some(v) = values.get(column).filter(|v| !v.is_null()) else { continue };
            if let Some(other) = self.store.find_by(entity, column, v).await? {
                let other_key = RecordKey::from_record(entity, &other);
                if own_key.is_none() || other_key.as_ref() != own_key {
                    return Err(AppError::Conflict(format!(
                        "{} with {} {} already exists",
                        entity.path_segment, column, v
                    )));
                }
            }
        }
        Ok(())
    }

    async fn check_references(&self, entity: &ResolvedEntity, values: &Record) -> Result<(), AppError> {
        if !self.enforce_references {
            return Ok(());
        }
        for r in &entity.references {
            let Some(v) = values.get(&r.column).filter(|v| !v.is_null()) else { continue };
            let target = self.model.entity_by_path(&r.target_path_segment).ok_or_else(|| {
                AppError::Config(crate::error::ConfigError::MissingReference {
                    kind: "api entity",
                    id: r.target_path_segment.clone(),
                })
            })?;
            let found = if target.key_columns.len() == 1 && target.key_columns[0] == r.target_column {
                self.store.fetch(target, &RecordKey::new(vec![v.clone()])).await?
            } else {
                self.store.find_by(target, &r.target_column, v).await?
            };
            if found.is_none() {
                return Err(AppError::InvalidInput(format!(
                    "{} references unknown {} {}",
                    r.column, target.path_segment, v
                )));
            }
        }
        Ok(())
    }
}

fn not_found(entity: &ResolvedEntity, key: &RecordKey) -> AppError {
    AppError::NotFound(format!("{} {}", entity.path_segment, key))
}

/// Explicit `sort` wins; `order` alone re-directs the entity's default sort.
fn resolve_sort(entity: &ResolvedEntity, params: &ListParams) -> Result<Option<SortSpec>, AppError> {
    let direction = match params.order.as_deref() {
        None => None,
        Some(o) => Some(
            SortDirection::parse(o)
                .ok_or_else(|| AppError::InvalidInput("order must be asc or desc".into()))?,
        ),
    };
    match (&params.sort, &entity.default_sort) {
        (Some(column), _) => {
            if entity.column(column).is_none() {
                return Err(AppError::InvalidInput(format!(
                    "cannot sort {} by unknown field '{}'",
                    entity.path_segment, column
                )));
            }
            Ok(Some(SortSpec {
                column: column.clone(),
                direction: direction.unwrap_or(SortDirection::Asc),
            }))
        }
        (None, Some(default)) => Ok(Some(SortSpec {
            column: default.column.clone(),
            direction: direction.unwrap_or(default.direction),
        })),
        (None, None) if direction.is_some() => {
            Err(AppError::InvalidInput("order requires a sort field".into()))
        }
        (None, None) => Ok(None),
    }
}
