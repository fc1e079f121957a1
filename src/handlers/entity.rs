//! Resource CRUD handlers: list, create, read, replace, patch, delete.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::record::{Record, RecordKey};
use crate::response::{success_created, success_many, success_one};
use crate::service::ListParams;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;
use std::collections::HashMap;

fn resolve<'a>(state: &'a AppState, path_segment: &str, operation: &str) -> Result<&'a ResolvedEntity, AppError> {
    let entity = state.crud.entity(path_segment)?;
    if !entity.allows(operation) {
        return Err(AppError::InvalidInput(format!(
            "{} not allowed on {}",
            operation, path_segment
        )));
    }
    Ok(entity)
}

/// A single-column key is the whole (decoded) remainder, so text keys may contain `/`.
/// Composite keys take one segment per key column.
fn parse_key(entity: &ResolvedEntity, raw: &str) -> Result<RecordKey, AppError> {
    if entity.key_columns.len() == 1 {
        return RecordKey::parse(entity, &[raw]);
    }
    let segments: Vec<&str> = raw.trim_matches('/').split('/').collect();
    RecordKey::parse(entity, &segments)
}

fn body_to_record(body: &Bytes) -> Result<Record, AppError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("malformed JSON body: {}", e)))?;
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::InvalidInput("body must be a JSON object".into())),
    }
}

fn parse_window(params: &HashMap<String, String>, name: &str) -> Result<Option<u64>, AppError> {
    params
        .get(name)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| AppError::InvalidInput(format!("{} must be a non-negative integer", name)))
        })
        .transpose()
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = resolve(&state, &path_segment, "read")?;
    let params = ListParams {
        skip: parse_window(&params, "skip")?,
        limit: parse_window(&params, "limit")?,
        sort: params.get("sort").cloned(),
        order: params.get("order").cloned(),
    };
    let page = state.crud.list(entity, &params).await?;
    Ok(success_many(page.rows, page.skip, page.limit))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = resolve(&state, &path_segment, "create")?;
    let body = body_to_record(&body)?;
    let row = state.crud.create(entity, &body).await?;
    Ok(success_created(row))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = resolve(&state, &path_segment, "read")?;
    let key = parse_key(entity, &key)?;
    let row = state.crud.get(entity, &key).await?;
    Ok(success_one(row))
}

/// PUT: full replacement of the non-key fields.
pub async fn replace(
    State(state): State<AppState>,
    Path((path_segment, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = resolve(&state, &path_segment, "update")?;
    let key = parse_key(entity, &key)?;
    let body = body_to_record(&body)?;
    state.crud.replace(entity, &key, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn patch(
    State(state): State<AppState>,
    Path((path_segment, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = resolve(&state, &path_segment, "update")?;
    let key = parse_key(entity, &key)?;
    let body = body_to_record(&body)?;
    state.crud.partial_update(entity, &key, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = resolve(&state, &path_segment, "delete")?;
    let key = parse_key(entity, &key)?;
    state.crud.delete(entity, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
